//! Large-blob array access over authenticatorLargeBlobs
//!
//! The authenticator stores one serialized CBOR array followed by
//! `LEFT(SHA-256(array), 16)`. Each credential's entry is sealed under its
//! `largeBlobKey`, so the client reads the whole array and tries every
//! entry with the key it holds.

use crate::error::{Error, Result};
use crate::pin::PinUvAuthToken;
use crate::session::Session;

use nfc_passkey_crypto::large_blob::{self, NONCE_LEN, SealedBlob};
use nfc_passkey_ctap::cbor::{self, Value, encode_array, encode_value};
use nfc_passkey_ctap::{CtapCommand, MapBuilder, MapParser};

use sha2::{Digest, Sha256};

const HASH_LEN: usize = 16;
/// Room left in each message for the command wrapper and pinUvAuthParam
const FRAGMENT_OVERHEAD: usize = 64;
/// CTAP2_ERR_LARGE_BLOB_STORAGE_FULL
const STORAGE_FULL: u8 = 0x18;

mod keys {
    pub const GET: i32 = 0x01;
    pub const SET: i32 = 0x02;
    pub const OFFSET: i32 = 0x03;
    pub const LENGTH: i32 = 0x04;
    pub const PIN_UV_AUTH_PARAM: i32 = 0x05;
    pub const PIN_UV_AUTH_PROTOCOL: i32 = 0x06;

    pub const RESP_CONFIG: i64 = 0x01;

    pub const ENTRY_CIPHERTEXT: i32 = 0x01;
    pub const ENTRY_NONCE: i32 = 0x02;
    pub const ENTRY_ORIG_SIZE: i32 = 0x03;
}

/// Serialized array plus its truncated hash
pub fn serialize_array(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut data = encode_array(entries);
    let hash = Sha256::digest(&data);
    data.extend_from_slice(&hash[..HASH_LEN]);
    data
}

/// Verify the trailing hash and decode the array
///
/// `None` when the integrity check fails; callers treat that as an empty array.
pub fn parse_array(data: &[u8]) -> Option<Vec<Value>> {
    if data.len() < HASH_LEN + 1 {
        return None;
    }
    let (array, hash) = data.split_at(data.len() - HASH_LEN);
    if Sha256::digest(array)[..HASH_LEN] != *hash {
        return None;
    }
    match cbor::decode::<Value>(array).ok()? {
        Value::Array(entries) => Some(entries),
        _ => None,
    }
}

fn sealed_entry(entry: &Value) -> Option<SealedBlob> {
    let parser = MapParser::from_value(entry.clone()).ok()?;
    let ciphertext = parser.get_bytes(keys::ENTRY_CIPHERTEXT as i64).ok()?;
    let nonce: [u8; NONCE_LEN] = parser
        .get_bytes(keys::ENTRY_NONCE as i64)
        .ok()?
        .try_into()
        .ok()?;
    let orig_size = u64::try_from(parser.get_int(keys::ENTRY_ORIG_SIZE as i64).ok()?).ok()?;
    Some(SealedBlob {
        ciphertext,
        nonce,
        orig_size,
    })
}

/// First entry that opens under `key`
pub fn find_blob(entries: &[Value], key: &[u8]) -> Option<Vec<u8>> {
    entries
        .iter()
        .filter_map(sealed_entry)
        .find_map(|sealed| large_blob::open(key, &sealed).ok())
}

fn encode_entry(sealed: &SealedBlob) -> Result<Vec<u8>> {
    MapBuilder::new()
        .insert_bytes(keys::ENTRY_CIPHERTEXT, &sealed.ciphertext)
        .and_then(|b| b.insert_bytes(keys::ENTRY_NONCE, &sealed.nonce))
        .and_then(|b| b.insert(keys::ENTRY_ORIG_SIZE, sealed.orig_size))
        .and_then(MapBuilder::build)
        .map_err(Error::encoding)
}

fn max_fragment(session: &Session<'_>) -> usize {
    session
        .info()
        .max_msg_size()
        .saturating_sub(FRAGMENT_OVERHEAD)
        .max(1)
}

/// Read the complete serialized array
pub(crate) fn read_array(session: &mut Session<'_>) -> Result<Vec<Value>> {
    let fragment_len = max_fragment(session);
    let mut data = Vec::new();

    loop {
        let request = MapBuilder::new()
            .insert(keys::GET, fragment_len)
            .and_then(|b| b.insert(keys::OFFSET, data.len()))
            .and_then(MapBuilder::build)
            .map_err(Error::encoding)?;
        let body = session.command(CtapCommand::LargeBlobs, &request)?;
        let fragment = MapParser::from_bytes(&body)
            .and_then(|parser| parser.get_bytes(keys::RESP_CONFIG))
            .map_err(|_| Error::MalformedResponse("largeBlobs"))?;

        let done = fragment.len() < fragment_len;
        data.extend_from_slice(&fragment);
        if done {
            break;
        }
    }

    tracing::trace!(len = data.len(), "Large-blob array read");
    Ok(parse_array(&data).unwrap_or_else(|| {
        tracing::warn!("Large-blob array failed its integrity check; treating as empty");
        Vec::new()
    }))
}

/// Replace this credential's entry with `blob`
pub(crate) fn write_blob(
    session: &mut Session<'_>,
    token: &PinUvAuthToken,
    key: &[u8],
    blob: &[u8],
) -> Result<()> {
    let entries = read_array(session)?;

    let mut kept = Vec::with_capacity(entries.len() + 1);
    for entry in &entries {
        let ours = sealed_entry(entry).is_some_and(|sealed| large_blob::open(key, &sealed).is_ok());
        if !ours {
            kept.push(encode_value(entry).map_err(Error::encoding)?);
        }
    }
    kept.push(encode_entry(&large_blob::seal(key, blob)?)?);

    let data = serialize_array(&kept);
    if session
        .info()
        .max_serialized_large_blob_array
        .is_some_and(|max| data.len() > max)
    {
        return Err(Error::from_ctap_status(STORAGE_FULL));
    }

    let fragment_len = max_fragment(session);
    for (index, fragment) in data.chunks(fragment_len).enumerate() {
        let offset = index * fragment_len;
        let offset_u32 = u32::try_from(offset).map_err(|_| Error::from_ctap_status(STORAGE_FULL))?;

        let mut message = vec![0xff; 32];
        message.extend_from_slice(&[0x0c, 0x00]);
        message.extend_from_slice(&offset_u32.to_le_bytes());
        message.extend_from_slice(&Sha256::digest(fragment));
        let param = token.authenticate(&message)?;

        let request = MapBuilder::new()
            .insert_bytes(keys::SET, fragment)
            .and_then(|b| b.insert(keys::OFFSET, offset))
            .and_then(|b| b.insert_opt(keys::LENGTH, (offset == 0).then_some(data.len())))
            .and_then(|b| b.insert_bytes(keys::PIN_UV_AUTH_PARAM, &param))
            .and_then(|b| b.insert(keys::PIN_UV_AUTH_PROTOCOL, token.protocol().as_u8()))
            .and_then(MapBuilder::build)
            .map_err(Error::encoding)?;
        session.command(CtapCommand::LargeBlobs, &request)?;
    }

    tracing::debug!(entries = kept.len(), len = data.len(), "Large-blob array written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_array() {
        let data = serialize_array(&[]);
        assert_eq!(hex::encode(&data), "8076be8b528d0075f7aae98d6fa57a6d3c");
        assert_eq!(parse_array(&data), Some(Vec::new()));
    }

    #[test]
    fn test_corrupted_hash() {
        let mut data = serialize_array(&[]);
        let last = data.len() - 1;
        data[last] ^= 0x01;
        assert!(parse_array(&data).is_none());
        assert!(parse_array(&[0x80]).is_none());
    }

    #[test]
    fn test_find_blob_by_key() {
        let mine = [0x01u8; 32];
        let theirs = [0x02u8; 32];
        let entries = vec![
            encode_entry(&large_blob::seal(&theirs, b"not mine").unwrap()).unwrap(),
            encode_entry(&large_blob::seal(&mine, b"hello blob").unwrap()).unwrap(),
        ];
        let parsed = parse_array(&serialize_array(&entries)).unwrap();

        assert_eq!(find_blob(&parsed, &mine).unwrap(), b"hello blob");
        assert_eq!(find_blob(&parsed, &theirs).unwrap(), b"not mine");
        assert!(find_blob(&parsed, &[0x03; 32]).is_none());
    }
}
