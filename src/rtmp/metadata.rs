//! AMF0 metadata parsing and construction
//!
//! Only the data-message subset of AMF0 is needed here: the `onMetaData`
//! payload and its `@setDataFrame` wrapper. Objects are modeled as an
//! ordered sequence of key/value pairs rather than a map, so a parse/build
//! round trip preserves key order and numeric precision.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_LONG_STRING: u8 = 0x0C;

/// The AMF0 string that wraps republished metadata
pub const SET_DATA_FRAME: &str = "@setDataFrame";
/// The metadata event name
pub const ON_META_DATA: &str = "onMetaData";

/// An AMF0 value, with objects kept in document order
#[derive(Debug, Clone, PartialEq)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    String(String),
    /// Anonymous object; ordered key/value pairs
    Object(Vec<(String, Amf0Value)>),
    /// ECMA array; ordered key/value pairs (the count is advisory)
    EcmaArray(Vec<(String, Amf0Value)>),
    /// Dense array
    StrictArray(Vec<Amf0Value>),
    Null,
    Undefined,
}

impl Amf0Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Amf0Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Amf0Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Ordered pairs of an object or ECMA array
    pub fn as_pairs(&self) -> Option<&[(String, Amf0Value)]> {
        match self {
            Amf0Value::Object(p) | Amf0Value::EcmaArray(p) => Some(p),
            _ => None,
        }
    }
}

fn need(data: &Bytes, n: usize) -> Result<()> {
    if data.len() < n {
        Err(Error::MalformedBitstream("amf0 truncated"))
    } else {
        Ok(())
    }
}

fn decode_utf8(data: &mut Bytes, len: usize) -> Result<String> {
    need(data, len)?;
    let raw = data.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::MalformedBitstream("amf0 bad utf8"))
}

fn decode_key(data: &mut Bytes) -> Result<String> {
    need(data, 2)?;
    let len = data.get_u16() as usize;
    decode_utf8(data, len)
}

fn decode_pairs(data: &mut Bytes) -> Result<Vec<(String, Amf0Value)>> {
    let mut pairs = Vec::new();
    loop {
        let key = decode_key(data)?;
        need(data, 1)?;
        if key.is_empty() && data[0] == MARKER_OBJECT_END {
            data.advance(1);
            return Ok(pairs);
        }
        let value = decode_value(data)?;
        pairs.push((key, value));
    }
}

/// Decode one AMF0 value.
pub fn decode_value(data: &mut Bytes) -> Result<Amf0Value> {
    need(data, 1)?;
    let marker = data.get_u8();
    match marker {
        MARKER_NUMBER => {
            need(data, 8)?;
            Ok(Amf0Value::Number(f64::from_bits(data.get_u64())))
        }
        MARKER_BOOLEAN => {
            need(data, 1)?;
            Ok(Amf0Value::Boolean(data.get_u8() != 0))
        }
        MARKER_STRING => {
            need(data, 2)?;
            let len = data.get_u16() as usize;
            Ok(Amf0Value::String(decode_utf8(data, len)?))
        }
        MARKER_LONG_STRING => {
            need(data, 4)?;
            let len = data.get_u32() as usize;
            Ok(Amf0Value::String(decode_utf8(data, len)?))
        }
        MARKER_OBJECT => Ok(Amf0Value::Object(decode_pairs(data)?)),
        MARKER_ECMA_ARRAY => {
            need(data, 4)?;
            let _count = data.get_u32();
            Ok(Amf0Value::EcmaArray(decode_pairs(data)?))
        }
        MARKER_STRICT_ARRAY => {
            need(data, 4)?;
            let count = data.get_u32() as usize;
            let mut items = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                items.push(decode_value(data)?);
            }
            Ok(Amf0Value::StrictArray(items))
        }
        MARKER_NULL => Ok(Amf0Value::Null),
        MARKER_UNDEFINED => Ok(Amf0Value::Undefined),
        _ => Err(Error::MalformedBitstream("amf0 unsupported marker")),
    }
}

fn encode_key(out: &mut BytesMut, key: &str) {
    out.put_u16(key.len() as u16);
    out.put_slice(key.as_bytes());
}

/// Encode one AMF0 value.
pub fn encode_value(out: &mut BytesMut, value: &Amf0Value) {
    match value {
        Amf0Value::Number(n) => {
            out.put_u8(MARKER_NUMBER);
            out.put_u64(n.to_bits());
        }
        Amf0Value::Boolean(b) => {
            out.put_u8(MARKER_BOOLEAN);
            out.put_u8(u8::from(*b));
        }
        Amf0Value::String(s) => {
            if s.len() > u16::MAX as usize {
                out.put_u8(MARKER_LONG_STRING);
                out.put_u32(s.len() as u32);
            } else {
                out.put_u8(MARKER_STRING);
                out.put_u16(s.len() as u16);
            }
            out.put_slice(s.as_bytes());
        }
        Amf0Value::Object(pairs) => {
            out.put_u8(MARKER_OBJECT);
            for (k, v) in pairs {
                encode_key(out, k);
                encode_value(out, v);
            }
            out.put_u16(0);
            out.put_u8(MARKER_OBJECT_END);
        }
        Amf0Value::EcmaArray(pairs) => {
            out.put_u8(MARKER_ECMA_ARRAY);
            out.put_u32(pairs.len() as u32);
            for (k, v) in pairs {
                encode_key(out, k);
                encode_value(out, v);
            }
            out.put_u16(0);
            out.put_u8(MARKER_OBJECT_END);
        }
        Amf0Value::StrictArray(items) => {
            out.put_u8(MARKER_STRICT_ARRAY);
            out.put_u32(items.len() as u32);
            for v in items {
                encode_value(out, v);
            }
        }
        Amf0Value::Null => out.put_u8(MARKER_NULL),
        Amf0Value::Undefined => out.put_u8(MARKER_UNDEFINED),
    }
}

/// Parse an `onMetaData` message body into ordered key/value pairs.
///
/// Accepts both the publisher form (`@setDataFrame` + `onMetaData` + object)
/// and the bare form (`onMetaData` + object). The object may be an anonymous
/// object or an ECMA array.
pub fn parse_metadata(body: &Bytes) -> Result<Vec<(String, Amf0Value)>> {
    let mut data = body.clone();
    let mut value = decode_value(&mut data)?;
    if value.as_str() == Some(SET_DATA_FRAME) {
        value = decode_value(&mut data)?;
    }
    if value.as_str() != Some(ON_META_DATA) {
        return Err(Error::ProtocolViolation("metadata missing onMetaData"));
    }
    let object = decode_value(&mut data)?;
    match object {
        Amf0Value::Object(pairs) | Amf0Value::EcmaArray(pairs) => Ok(pairs),
        _ => Err(Error::ProtocolViolation("metadata body not an object")),
    }
}

/// Build an `onMetaData` body. Arguments below zero are omitted.
pub fn build_metadata(
    width: i32,
    height: i32,
    audio_codec_id: i32,
    video_codec_id: i32,
) -> Bytes {
    let mut pairs = Vec::with_capacity(4);
    if width >= 0 {
        pairs.push(("width".to_string(), Amf0Value::Number(f64::from(width))));
    }
    if height >= 0 {
        pairs.push(("height".to_string(), Amf0Value::Number(f64::from(height))));
    }
    if audio_codec_id >= 0 {
        pairs.push((
            "audiocodecid".to_string(),
            Amf0Value::Number(f64::from(audio_codec_id)),
        ));
    }
    if video_codec_id >= 0 {
        pairs.push((
            "videocodecid".to_string(),
            Amf0Value::Number(f64::from(video_codec_id)),
        ));
    }

    let mut out = BytesMut::with_capacity(64);
    encode_value(&mut out, &Amf0Value::String(ON_META_DATA.to_string()));
    encode_value(&mut out, &Amf0Value::Object(pairs));
    out.freeze()
}

/// Prepend the `@setDataFrame` wrapper to a bare metadata body.
pub fn wrap_set_data_frame(body: &Bytes) -> Bytes {
    let mut out = BytesMut::with_capacity(3 + SET_DATA_FRAME.len() + body.len());
    encode_value(&mut out, &Amf0Value::String(SET_DATA_FRAME.to_string()));
    out.put_slice(body);
    out.freeze()
}

/// Remove a leading `@setDataFrame` wrapper if present.
pub fn strip_set_data_frame(body: &Bytes) -> Bytes {
    let mut data = body.clone();
    if let Ok(v) = decode_value(&mut data) {
        if v.as_str() == Some(SET_DATA_FRAME) {
            return data;
        }
    }
    body.clone()
}
