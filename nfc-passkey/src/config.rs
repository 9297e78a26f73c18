//! Client configuration
//!
//! Loadable from JSON; every field has a default so a partial document works:
//!
//! ```json
//! { "origin": "https://login.example.com", "timeout_ms": 30000 }
//! ```

use serde::Deserialize;

use std::time::Duration;

/// WebAuthn `userVerification`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl UserVerificationRequirement {
    /// Unknown strings fall back to `Preferred`
    pub fn parse(value: &str) -> Self {
        match value {
            "required" => Self::Required,
            "discouraged" => Self::Discouraged,
            _ => Self::Preferred,
        }
    }
}

/// WebAuthn `residentKey`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Required,
    Preferred,
    #[default]
    Discouraged,
}

impl ResidentKeyRequirement {
    /// Unknown strings fall back to `Discouraged`
    pub fn parse(value: &str) -> Self {
        match value {
            "required" => Self::Required,
            "preferred" => Self::Preferred,
            _ => Self::Discouraged,
        }
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_millis(600_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin placed in client data; `https://{rp_id_host}` when unset
    pub origin: Option<String>,
    #[serde(rename = "timeout_ms", deserialize_with = "millis::deserialize")]
    pub timeout: Duration,
    #[serde(rename = "max_timeout_ms", deserialize_with = "millis::deserialize")]
    pub max_timeout: Duration,
    pub create_user_verification: UserVerificationRequirement,
    pub get_user_verification: UserVerificationRequirement,
    pub resident_key: ResidentKeyRequirement,
    /// PIN/UV auth protocol to use when the authenticator offers several
    pub preferred_pin_protocol: u8,
    #[serde(rename = "poll_interval_ms", deserialize_with = "millis::deserialize")]
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: None,
            timeout: DEFAULT_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            create_user_verification: UserVerificationRequirement::Preferred,
            get_user_verification: UserVerificationRequirement::Preferred,
            resident_key: ResidentKeyRequirement::Discouraged,
            preferred_pin_protocol: 2,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    pub fn with_create_user_verification(mut self, uv: UserVerificationRequirement) -> Self {
        self.create_user_verification = uv;
        self
    }

    pub fn with_get_user_verification(mut self, uv: UserVerificationRequirement) -> Self {
        self.get_user_verification = uv;
        self
    }

    pub fn with_resident_key(mut self, rk: ResidentKeyRequirement) -> Self {
        self.resident_key = rk;
        self
    }

    pub fn with_preferred_pin_protocol(mut self, protocol: u8) -> Self {
        self.preferred_pin_protocol = protocol;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Origin for an operation against `rp_id_host`
    pub fn origin_for(&self, rp_id_host: &str) -> String {
        match &self.origin {
            Some(origin) => origin.clone(),
            None => format!("https://{rp_id_host}"),
        }
    }

    /// Clamp a requested timeout to `[1 ms, max_timeout]`
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let requested = requested_ms
            .map(Duration::from_millis)
            .unwrap_or(self.timeout);
        requested.clamp(Duration::from_millis(1), self.max_timeout.max(Duration::from_millis(1)))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
