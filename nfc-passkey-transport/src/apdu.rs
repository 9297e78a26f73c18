//! ISO 7816-4 short APDUs
//!
//! ```text
//! Command:  CLA | INS | P1 | P2 | [Lc | data] | [Le]
//! Response: data | SW1 | SW2
//! ```

use crate::error::{Error, Result};

/// Largest data field of a short command APDU
pub const MAX_SHORT_DATA: usize = 255;

/// Status words
pub mod sw {
    pub const OK: u16 = 0x9000;
    /// NFCCTAP: authenticator still processing, poll with NFCCTAP_GETRESPONSE
    pub const STATUS_UPDATE: u16 = 0x9100;
    /// High byte of "more response bytes available"
    pub const MORE_DATA: u8 = 0x61;
}

/// Command bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const GET_RESPONSE: u8 = 0xC0;
    pub const NFCCTAP_MSG: u8 = 0x10;
    pub const NFCCTAP_GETRESPONSE: u8 = 0x11;
}

pub const CLA_ISO: u8 = 0x00;
pub const CLA_PROPRIETARY: u8 = 0x80;
/// Command chaining bit, set on every block but the last
pub const CLA_CHAIN: u8 = 0x10;

/// A command APDU in short encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length; `Some(0)` means up to 256 bytes
    pub le: Option<u8>,
}

impl CommandApdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.data.len() > MAX_SHORT_DATA {
            return Err(Error::MessageTooLarge);
        }

        let mut out = Vec::with_capacity(6 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(le);
        }
        Ok(out)
    }
}

/// A response APDU split into body and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub sw: u16,
}

impl ResponseApdu {
    pub fn from_bytes(mut raw: Vec<u8>) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::InvalidResponse);
        }
        let sw2 = raw.pop().ok_or(Error::InvalidResponse)?;
        let sw1 = raw.pop().ok_or(Error::InvalidResponse)?;
        Ok(Self {
            data: raw,
            sw: u16::from_be_bytes([sw1, sw2]),
        })
    }

    pub fn sw1(&self) -> u8 {
        (self.sw >> 8) as u8
    }

    pub fn sw2(&self) -> u8 {
        self.sw as u8
    }

    pub fn is_ok(&self) -> bool {
        self.sw == sw::OK
    }
}
