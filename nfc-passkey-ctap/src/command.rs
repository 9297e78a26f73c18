//! CTAP2 command bytes, clientPin subcommands and token permissions

use core::fmt;
use core::ops::BitOr;

/// Authenticator API command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CtapCommand {
    MakeCredential = 0x01,
    GetAssertion = 0x02,
    GetInfo = 0x04,
    ClientPin = 0x06,
    GetNextAssertion = 0x08,
    Selection = 0x0B,
    LargeBlobs = 0x0C,
}

impl CtapCommand {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MakeCredential),
            0x02 => Some(Self::GetAssertion),
            0x04 => Some(Self::GetInfo),
            0x06 => Some(Self::ClientPin),
            0x08 => Some(Self::GetNextAssertion),
            0x0B => Some(Self::Selection),
            0x0C => Some(Self::LargeBlobs),
            _ => None,
        }
    }
}

impl fmt::Display for CtapCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MakeCredential => "authenticatorMakeCredential",
            Self::GetAssertion => "authenticatorGetAssertion",
            Self::GetInfo => "authenticatorGetInfo",
            Self::ClientPin => "authenticatorClientPIN",
            Self::GetNextAssertion => "authenticatorGetNextAssertion",
            Self::Selection => "authenticatorSelection",
            Self::LargeBlobs => "authenticatorLargeBlobs",
        };
        f.write_str(name)
    }
}

/// `authenticatorClientPIN` subcommands used by a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientPinSubCommand {
    GetPinRetries = 0x01,
    GetKeyAgreement = 0x02,
    /// CTAP 2.0 token without permissions
    GetPinToken = 0x05,
    GetPinUvAuthTokenUsingUvWithPermissions = 0x06,
    GetUvRetries = 0x07,
    GetPinUvAuthTokenUsingPinWithPermissions = 0x09,
}

impl ClientPinSubCommand {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// authenticatorClientPIN parameter keys
pub mod client_pin_keys {
    pub const PIN_UV_AUTH_PROTOCOL: i32 = 0x01;
    pub const SUB_COMMAND: i32 = 0x02;
    pub const KEY_AGREEMENT: i32 = 0x03;
    pub const PIN_HASH_ENC: i32 = 0x06;
    pub const PERMISSIONS: i32 = 0x09;
    pub const RP_ID: i32 = 0x0A;

    pub const RESP_KEY_AGREEMENT: i64 = 0x01;
    pub const RESP_PIN_UV_AUTH_TOKEN: i64 = 0x02;
    pub const RESP_PIN_RETRIES: i64 = 0x03;
    pub const RESP_POWER_CYCLE_STATE: i64 = 0x04;
}

/// Permission bits requested with a pinUvAuthToken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(u8);

impl Permissions {
    pub const MAKE_CREDENTIAL: Self = Self(0x01);
    pub const GET_ASSERTION: Self = Self(0x02);
    pub const CREDENTIAL_MANAGEMENT: Self = Self(0x04);
    pub const BIO_ENROLLMENT: Self = Self(0x08);
    pub const LARGE_BLOB_WRITE: Self = Self(0x10);
    pub const AUTHENTICATOR_CONFIG: Self = Self(0x20);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        assert_eq!(CtapCommand::MakeCredential.as_u8(), 0x01);
        assert_eq!(CtapCommand::from_u8(0x0C), Some(CtapCommand::LargeBlobs));
        assert_eq!(CtapCommand::from_u8(0x03), None);
        assert_eq!(CtapCommand::GetInfo.to_string(), "authenticatorGetInfo");
    }

    #[test]
    fn test_permissions() {
        let perms = Permissions::GET_ASSERTION | Permissions::LARGE_BLOB_WRITE;
        assert_eq!(perms.bits(), 0x12);
        assert!(perms.contains(Permissions::GET_ASSERTION));
        assert!(!perms.contains(Permissions::MAKE_CREDENTIAL));
    }
}
