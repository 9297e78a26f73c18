//! CBOR encoding and decoding for CTAP2 using cbor4ii
//!
//! Requests must use the CTAP2 canonical form: definite lengths, shortest
//! integer encodings and map keys sorted by their encoded bytes. Integer-keyed
//! maps ([`MapBuilder`]) and text-keyed maps ([`TextMapBuilder`]) write their
//! own headers so that key order never depends on insertion order.
//!
//! Responses are decoded into [`Value`] trees and read through [`MapParser`].
//!
//! ```rust,ignore
//! let rp = TextMapBuilder::new()
//!     .insert("id", "example.com")?
//!     .insert("name", "Example RP")?
//!     .build()?;
//! let request = MapBuilder::new()
//!     .insert_bytes(1, &client_data_hash)?
//!     .insert_raw(2, rp)
//!     .build()?;
//! ```

use crate::status::{Result, StatusCode};

use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};

pub type Value = cbor4ii::core::Value;

const MAX_NESTING: usize = 16;

/// Encode a serde value to CBOR bytes
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    cbor4ii::serde::to_writer(&mut out, value).map_err(|_| StatusCode::InvalidCbor)?;
    Ok(out)
}

/// Decode CBOR bytes to a serde value
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    cbor4ii::serde::from_slice(data).map_err(|_| StatusCode::InvalidCbor)
}

/// Encode a byte string (major type 2)
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    write_header(&mut out, 2, bytes.len() as u64);
    out.extend_from_slice(bytes);
    out
}

/// Encode a text string (major type 3)
pub fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 9);
    write_header(&mut out, 3, text.len() as u64);
    out.extend_from_slice(text.as_bytes());
    out
}

/// Encode an integer with the shortest head
pub fn encode_int(value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    if value >= 0 {
        write_header(&mut out, 0, value as u64);
    } else {
        write_header(&mut out, 1, (-1 - value) as u64);
    }
    out
}

/// Wrap already-encoded items in a definite-length array
pub fn encode_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    write_header(&mut out, 4, items.len() as u64);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn write_header(out: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    if arg < 24 {
        out.push(major | arg as u8);
    } else if arg <= u8::MAX as u64 {
        out.extend_from_slice(&[major | 24, arg as u8]);
    } else if arg <= u16::MAX as u64 {
        out.push(major | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= u32::MAX as u64 {
        out.push(major | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}

/// Wrapper for i32 that sorts by CBOR encoding order
///
/// Unsigned keys (major type 0) sort before negative keys (major type 1);
/// within the negatives, -1 encodes as 0x20 and sorts before -2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CborOrderedI32(i32);

impl PartialOrd for CborOrderedI32 {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CborOrderedI32 {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        match (self.0 >= 0, other.0 >= 0) {
            (true, true) => self.0.cmp(&other.0),
            (false, false) => other.0.cmp(&self.0),
            (true, false) => core::cmp::Ordering::Less,
            (false, true) => core::cmp::Ordering::Greater,
        }
    }
}

/// Canonical order for text keys: shorter first, then bytewise
#[derive(Debug, Clone, PartialEq, Eq)]
struct CborOrderedText(String);

impl PartialOrd for CborOrderedText {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CborOrderedText {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

/// Build a CBOR map with integer keys (CTAP command parameters, COSE keys)
#[derive(Debug, Default)]
pub struct MapBuilder {
    entries: BTreeMap<CborOrderedI32, Vec<u8>>,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a serde value under `key`
    pub fn insert<T: Serialize>(self, key: i32, value: T) -> Result<Self> {
        let encoded = encode(&value)?;
        Ok(self.insert_raw(key, encoded))
    }

    /// Insert only when `value` is `Some`
    pub fn insert_opt<T: Serialize>(self, key: i32, value: Option<T>) -> Result<Self> {
        match value {
            Some(v) => self.insert(key, v),
            None => Ok(self),
        }
    }

    /// Insert a CBOR byte string
    pub fn insert_bytes(self, key: i32, bytes: &[u8]) -> Result<Self> {
        Ok(self.insert_raw(key, encode_bytes(bytes)))
    }

    /// Insert an item that is already CBOR encoded (nested maps, arrays)
    pub fn insert_raw(mut self, key: i32, encoded: Vec<u8>) -> Self {
        self.entries.insert(CborOrderedI32(key), encoded);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the map with keys in canonical order
    pub fn build(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_header(&mut out, 5, self.entries.len() as u64);
        for (key, value) in self.entries {
            out.extend_from_slice(&encode_int(key.0 as i64));
            out.extend_from_slice(&value);
        }
        Ok(out)
    }
}

/// Build a CBOR map with text keys (WebAuthn entities, options, extensions)
#[derive(Debug, Default)]
pub struct TextMapBuilder {
    entries: BTreeMap<CborOrderedText, Vec<u8>>,
}

impl TextMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(self, key: &str, value: T) -> Result<Self> {
        let encoded = encode(&value)?;
        Ok(self.insert_raw(key, encoded))
    }

    pub fn insert_opt<T: Serialize>(self, key: &str, value: Option<T>) -> Result<Self> {
        match value {
            Some(v) => self.insert(key, v),
            None => Ok(self),
        }
    }

    pub fn insert_bytes(self, key: &str, bytes: &[u8]) -> Result<Self> {
        Ok(self.insert_raw(key, encode_bytes(bytes)))
    }

    pub fn insert_raw(mut self, key: &str, encoded: Vec<u8>) -> Self {
        self.entries
            .insert(CborOrderedText(key.to_string()), encoded);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_header(&mut out, 5, self.entries.len() as u64);
        for (key, value) in self.entries {
            out.extend_from_slice(&encode_text(&key.0));
            out.extend_from_slice(&value);
        }
        Ok(out)
    }
}

/// Re-encode a decoded value canonically
///
/// Used when a response item (an `attStmt`, an extension output) has to be
/// embedded in a structure the platform produces.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    encode_value_at(value, 0)
}

fn encode_value_at(value: &Value, depth: usize) -> Result<Vec<u8>> {
    if depth > MAX_NESTING {
        return Err(StatusCode::InvalidCbor);
    }
    let out = match value {
        Value::Integer(i) => {
            let i = i64::try_from(*i).map_err(|_| StatusCode::InvalidCbor)?;
            encode_int(i)
        }
        Value::Bytes(b) => encode_bytes(b),
        Value::Text(t) => encode_text(t),
        Value::Array(items) => {
            let encoded = items
                .iter()
                .map(|item| encode_value_at(item, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            encode_array(&encoded)
        }
        Value::Map(entries) => {
            let mut sorted = entries
                .iter()
                .map(|(k, v)| Ok((encode_value_at(k, depth + 1)?, encode_value_at(v, depth + 1)?)))
                .collect::<Result<Vec<_>>>()?;
            // Bytewise order of the encoded keys; equals length-first for
            // definite-length text and integer keys.
            sorted.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
            let mut out = Vec::new();
            write_header(&mut out, 5, sorted.len() as u64);
            for (k, v) in sorted {
                out.extend_from_slice(&k);
                out.extend_from_slice(&v);
            }
            out
        }
        Value::Bool(false) => vec![0xf4],
        Value::Bool(true) => vec![0xf5],
        Value::Null => vec![0xf6],
        Value::Float(f) => encode(f)?,
        Value::Tag(tag, inner) => {
            let mut out = Vec::new();
            write_header(&mut out, 6, *tag);
            out.extend_from_slice(&encode_value_at(inner, depth + 1)?);
            out
        }
        _ => return Err(StatusCode::CborUnexpectedType),
    };
    Ok(out)
}

/// Length in bytes of the first complete CBOR data item in `data`
///
/// Authenticator data embeds the credential public key without a length
/// prefix, followed optionally by the extensions map; this finds the split.
pub fn item_len(data: &[u8]) -> Result<usize> {
    item_len_at(data, 0, 0)
}

fn read_arg(data: &[u8], pos: usize, info: u8) -> Result<(u64, usize)> {
    let take = |n: usize| -> Result<u64> {
        let bytes = data
            .get(pos + 1..pos + 1 + n)
            .ok_or(StatusCode::InvalidLength)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    };
    match info {
        0..=23 => Ok((info as u64, 1)),
        24 => Ok((take(1)?, 2)),
        25 => Ok((take(2)?, 3)),
        26 => Ok((take(4)?, 5)),
        27 => Ok((take(8)?, 9)),
        _ => Err(StatusCode::InvalidCbor),
    }
}

fn item_len_at(data: &[u8], pos: usize, depth: usize) -> Result<usize> {
    if depth > MAX_NESTING {
        return Err(StatusCode::InvalidCbor);
    }
    let initial = *data.get(pos).ok_or(StatusCode::InvalidLength)?;
    let major = initial >> 5;
    let info = initial & 0x1f;

    if info == 31 {
        return indefinite_len_at(data, pos, major, depth);
    }

    let (arg, head) = read_arg(data, pos, info)?;
    let end = match major {
        0 | 1 => pos + head,
        2 | 3 => {
            let len = usize::try_from(arg).map_err(|_| StatusCode::InvalidLength)?;
            head.checked_add(len)
                .and_then(|n| pos.checked_add(n))
                .ok_or(StatusCode::InvalidLength)?
        }
        4 | 5 => {
            let items = if major == 5 { arg.saturating_mul(2) } else { arg };
            let mut cursor = pos + head;
            for _ in 0..items {
                cursor += item_len_at(data, cursor, depth + 1)?;
            }
            cursor
        }
        6 => {
            let inner = pos + head;
            inner + item_len_at(data, inner, depth + 1)?
        }
        _ => {
            if info >= 28 {
                return Err(StatusCode::InvalidCbor);
            }
            pos + head
        }
    };

    if end > data.len() {
        return Err(StatusCode::InvalidLength);
    }
    Ok(end - pos)
}

fn indefinite_len_at(data: &[u8], pos: usize, major: u8, depth: usize) -> Result<usize> {
    if !matches!(major, 2..=5) {
        return Err(StatusCode::InvalidCbor);
    }
    let mut cursor = pos + 1;
    loop {
        match data.get(cursor) {
            None => return Err(StatusCode::InvalidLength),
            Some(0xff) => return Ok(cursor + 1 - pos),
            Some(_) => {
                let count = if major == 5 { 2 } else { 1 };
                for _ in 0..count {
                    cursor += item_len_at(data, cursor, depth + 1)?;
                }
            }
        }
    }
}

/// Read-side view of a CBOR map with integer keys
#[derive(Debug, Clone, Default)]
pub struct MapParser {
    map: BTreeMap<i64, Value>,
}

impl MapParser {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let value: Value = decode(data)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(StatusCode::CborUnexpectedType);
        };
        let mut map = BTreeMap::new();
        for (k, v) in entries {
            // CTAP structures occasionally carry text keys next to integer
            // ones; only the integer keys are addressable here.
            if let Value::Integer(k) = k {
                let k = i64::try_from(k).map_err(|_| StatusCode::InvalidCbor)?;
                map.insert(k, v);
            }
        }
        Ok(Self { map })
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.map.contains_key(&key)
    }

    pub fn get_value(&self, key: i64) -> Option<&Value> {
        self.map.get(&key)
    }

    pub fn take_value(&mut self, key: i64) -> Option<Value> {
        self.map.remove(&key)
    }

    fn required(&self, key: i64) -> Result<&Value> {
        self.get_value(key).ok_or(StatusCode::MissingParameter)
    }

    pub fn get_bytes(&self, key: i64) -> Result<Vec<u8>> {
        as_bytes(self.required(key)?).map(<[u8]>::to_vec)
    }

    pub fn get_bytes_opt(&self, key: i64) -> Result<Option<Vec<u8>>> {
        self.get_value(key)
            .map(|v| as_bytes(v).map(<[u8]>::to_vec))
            .transpose()
    }

    pub fn get_text(&self, key: i64) -> Result<String> {
        as_text(self.required(key)?).map(str::to_string)
    }

    pub fn get_text_opt(&self, key: i64) -> Result<Option<String>> {
        self.get_value(key)
            .map(|v| as_text(v).map(str::to_string))
            .transpose()
    }

    pub fn get_int(&self, key: i64) -> Result<i64> {
        as_int(self.required(key)?)
    }

    pub fn get_int_opt(&self, key: i64) -> Result<Option<i64>> {
        self.get_value(key).map(as_int).transpose()
    }

    pub fn get_bool_opt(&self, key: i64) -> Result<Option<bool>> {
        self.get_value(key).map(as_bool).transpose()
    }

    /// Nested integer-keyed map
    pub fn get_map(&self, key: i64) -> Result<MapParser> {
        MapParser::from_value(self.required(key)?.clone())
    }
}

pub fn as_bytes(value: &Value) -> Result<&[u8]> {
    match value {
        Value::Bytes(b) => Ok(b),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

pub fn as_text(value: &Value) -> Result<&str> {
    match value {
        Value::Text(t) => Ok(t),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

pub fn as_int(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => i64::try_from(*i).map_err(|_| StatusCode::InvalidCbor),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

pub fn as_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

pub fn as_array(value: &Value) -> Result<&[Value]> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

/// Look up a text key in a decoded map
pub fn text_entry<'a>(map: &'a Value, key: &str) -> Option<&'a Value> {
    match map {
        Value::Map(entries) => entries.iter().find_map(|(k, v)| match k {
            Value::Text(t) if t == key => Some(v),
            _ => None,
        }),
        _ => None,
    }
}
