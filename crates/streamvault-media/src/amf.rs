//! AMF0 value encoding and decoding.
//!
//! Only the subset that appears in FLV script tags is supported. References,
//! XML documents and typed objects are rejected as [`Error::Unsupported`].

use bytes::{Buf, BufMut, BytesMut};

use crate::{Error, Result};

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;

/// Nesting limit for objects and arrays, guarding against hostile input.
const MAX_DEPTH: usize = 64;

/// A decoded AMF0 value.
///
/// Object and ECMA array properties keep their wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Vec<(String, AmfValue)>),
    Null,
    Undefined,
    EcmaArray(Vec<(String, AmfValue)>),
    StrictArray(Vec<AmfValue>),
    Date { millis: f64, timezone: i16 },
}

impl AmfValue {
    /// Build a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Properties of an object or ECMA array.
    pub fn properties(&self) -> Option<&[(String, AmfValue)]> {
        match self {
            Self::Object(props) | Self::EcmaArray(props) => Some(props),
            _ => None,
        }
    }

    /// Look up a property of an object or ECMA array by key.
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.properties()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Append the AMF0 encoding of this value to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Number(n) => {
                buf.put_u8(MARKER_NUMBER);
                buf.put_f64(*n);
            }
            Self::Boolean(b) => {
                buf.put_u8(MARKER_BOOLEAN);
                buf.put_u8(u8::from(*b));
            }
            Self::String(s) => {
                if s.len() > u16::MAX as usize {
                    buf.put_u8(MARKER_LONG_STRING);
                    buf.put_u32(s.len() as u32);
                    buf.put_slice(s.as_bytes());
                } else {
                    buf.put_u8(MARKER_STRING);
                    put_short_string(buf, s);
                }
            }
            Self::Object(props) => {
                buf.put_u8(MARKER_OBJECT);
                put_properties(buf, props);
            }
            Self::Null => buf.put_u8(MARKER_NULL),
            Self::Undefined => buf.put_u8(MARKER_UNDEFINED),
            Self::EcmaArray(props) => {
                buf.put_u8(MARKER_ECMA_ARRAY);
                buf.put_u32(props.len() as u32);
                put_properties(buf, props);
            }
            Self::StrictArray(items) => {
                buf.put_u8(MARKER_STRICT_ARRAY);
                buf.put_u32(items.len() as u32);
                for item in items {
                    item.encode(buf);
                }
            }
            Self::Date { millis, timezone } => {
                buf.put_u8(MARKER_DATE);
                buf.put_f64(*millis);
                buf.put_i16(*timezone);
            }
        }
    }

    /// Decode one value from the front of `buf`, advancing it.
    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        decode_value(buf, 0)
    }
}

impl From<f64> for AmfValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for AmfValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for AmfValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AmfValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Encode a sequence of values back to back, as in a script tag body.
pub fn encode_all(values: &[AmfValue]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);
    for value in values {
        value.encode(&mut buf);
    }
    buf
}

/// Decode values until `data` is exhausted.
pub fn decode_all(mut data: &[u8]) -> Result<Vec<AmfValue>> {
    let mut values = Vec::new();
    while data.has_remaining() {
        values.push(AmfValue::decode(&mut data)?);
    }
    Ok(values)
}

fn put_short_string(buf: &mut BytesMut, s: &str) {
    // Property keys longer than u16::MAX cannot be represented; truncate on
    // a char boundary so the key stays valid UTF-8.
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let bytes = &s.as_bytes()[..end];
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

fn put_properties(buf: &mut BytesMut, props: &[(String, AmfValue)]) {
    for (key, value) in props {
        put_short_string(buf, key);
        value.encode(buf);
    }
    buf.put_u16(0);
    buf.put_u8(MARKER_OBJECT_END);
}

fn ensure(buf: &[u8], need: usize) -> Result<()> {
    if buf.len() < need {
        return Err(Error::BufferUnderflow {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

fn read_utf8(buf: &mut &[u8], len: usize) -> Result<String> {
    ensure(buf, len)?;
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|e| Error::invalid_amf(format!("string is not UTF-8: {e}")))?
        .to_string();
    buf.advance(len);
    Ok(s)
}

fn read_short_string(buf: &mut &[u8]) -> Result<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    read_utf8(buf, len)
}

fn decode_properties(buf: &mut &[u8], depth: usize) -> Result<Vec<(String, AmfValue)>> {
    let mut props = Vec::new();
    loop {
        let key = read_short_string(buf)?;
        if key.is_empty() {
            ensure(buf, 1)?;
            if buf[0] == MARKER_OBJECT_END {
                buf.advance(1);
                return Ok(props);
            }
        }
        let value = decode_value(buf, depth + 1)?;
        props.push((key, value));
    }
}

fn decode_value(buf: &mut &[u8], depth: usize) -> Result<AmfValue> {
    if depth > MAX_DEPTH {
        return Err(Error::invalid_amf("nesting too deep"));
    }
    ensure(buf, 1)?;
    let marker = buf.get_u8();
    match marker {
        MARKER_NUMBER => {
            ensure(buf, 8)?;
            Ok(AmfValue::Number(buf.get_f64()))
        }
        MARKER_BOOLEAN => {
            ensure(buf, 1)?;
            Ok(AmfValue::Boolean(buf.get_u8() != 0))
        }
        MARKER_STRING => Ok(AmfValue::String(read_short_string(buf)?)),
        MARKER_OBJECT => Ok(AmfValue::Object(decode_properties(buf, depth)?)),
        MARKER_NULL => Ok(AmfValue::Null),
        MARKER_UNDEFINED => Ok(AmfValue::Undefined),
        MARKER_ECMA_ARRAY => {
            // The count is advisory; encoders are known to write 0.
            ensure(buf, 4)?;
            let _count = buf.get_u32();
            Ok(AmfValue::EcmaArray(decode_properties(buf, depth)?))
        }
        MARKER_STRICT_ARRAY => {
            ensure(buf, 4)?;
            let count = buf.get_u32() as usize;
            // Every element takes at least one byte.
            ensure(buf, count)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value(buf, depth + 1)?);
            }
            Ok(AmfValue::StrictArray(items))
        }
        MARKER_DATE => {
            ensure(buf, 10)?;
            let millis = buf.get_f64();
            let timezone = buf.get_i16();
            Ok(AmfValue::Date { millis, timezone })
        }
        MARKER_LONG_STRING => {
            ensure(buf, 4)?;
            let len = buf.get_u32() as usize;
            Ok(AmfValue::String(read_utf8(buf, len)?))
        }
        MARKER_OBJECT_END => Err(Error::invalid_amf("unexpected object end marker")),
        other => Err(Error::unsupported(format!("AMF0 marker 0x{other:02x}"))),
    }
}

#[cfg(feature = "serialize")]
impl serde::Serialize for AmfValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::{SerializeMap, SerializeSeq};

        match self {
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::String(s) => serializer.serialize_str(s),
            Self::Null | Self::Undefined => serializer.serialize_unit(),
            Self::Object(props) | Self::EcmaArray(props) => {
                let mut map = serializer.serialize_map(Some(props.len()))?;
                for (k, v) in props {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::StrictArray(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Date { millis, .. } => serializer.serialize_f64(*millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: AmfValue) -> AmfValue {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        let mut slice = &buf[..];
        let decoded = AmfValue::decode(&mut slice).unwrap();
        assert!(slice.is_empty(), "trailing bytes after decode");
        decoded
    }

    #[test]
    fn test_number_wire_format() {
        let mut buf = BytesMut::new();
        AmfValue::Number(1.5).encode(&mut buf);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], MARKER_NUMBER);
        assert_eq!(&buf[1..], &1.5f64.to_be_bytes());
    }

    #[test]
    fn test_nested_metadata_roundtrip() {
        let value = AmfValue::EcmaArray(vec![
            ("duration".into(), AmfValue::Number(12.5)),
            ("encoder".into(), AmfValue::string("obs")),
            ("stereo".into(), AmfValue::Boolean(true)),
            (
                "keyframes".into(),
                AmfValue::Object(vec![
                    (
                        "times".into(),
                        AmfValue::StrictArray(vec![0.0.into(), 2.0.into()]),
                    ),
                    (
                        "filepositions".into(),
                        AmfValue::StrictArray(vec![13.0.into(), 4096.0.into()]),
                    ),
                ]),
            ),
            ("nothing".into(), AmfValue::Null),
        ]);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_get_property() {
        let value = AmfValue::Object(vec![("width".into(), AmfValue::Number(1280.0))]);
        assert_eq!(value.get("width").and_then(AmfValue::as_number), Some(1280.0));
        assert!(value.get("height").is_none());
        assert!(AmfValue::Null.get("width").is_none());
    }

    #[test]
    fn test_oversized_key_truncated_on_char_boundary() {
        let key = "é".repeat(40_000);
        let value = AmfValue::Object(vec![(key, AmfValue::Number(1.0))]);
        let decoded = roundtrip(value);
        let props = decoded.properties().unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].0.len(), u16::MAX as usize - 1);
        assert!(props[0].0.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_long_string_roundtrip() {
        let long = "x".repeat(70_000);
        let mut buf = BytesMut::new();
        AmfValue::string(long.clone()).encode(&mut buf);
        assert_eq!(buf[0], MARKER_LONG_STRING);
        assert_eq!(roundtrip(AmfValue::String(long.clone())), AmfValue::String(long));
    }

    #[test]
    fn test_date_roundtrip() {
        let date = AmfValue::Date {
            millis: 1_700_000_000_000.0,
            timezone: 0,
        };
        assert_eq!(roundtrip(date.clone()), date);
    }

    #[test]
    fn test_decode_all_script_body() {
        let body = encode_all(&[
            AmfValue::string("onMetaData"),
            AmfValue::EcmaArray(vec![("fps".into(), AmfValue::Number(30.0))]),
        ]);
        let values = decode_all(&body).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_str(), Some("onMetaData"));
        assert_eq!(values[1].get("fps").and_then(AmfValue::as_number), Some(30.0));
    }

    #[test]
    fn test_truncated_input_is_error() {
        let mut buf = BytesMut::new();
        AmfValue::string("hello").encode(&mut buf);
        let mut slice = &buf[..buf.len() - 2];
        assert!(matches!(
            AmfValue::decode(&mut slice),
            Err(Error::BufferUnderflow { .. })
        ));
    }

    #[test]
    fn test_unsupported_marker() {
        // 0x07 is an AMF0 reference.
        let mut slice: &[u8] = &[0x07, 0x00, 0x01];
        assert!(matches!(AmfValue::decode(&mut slice), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_depth_limit() {
        let mut value = AmfValue::Null;
        for _ in 0..(MAX_DEPTH + 2) {
            value = AmfValue::StrictArray(vec![value]);
        }
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        let mut slice = &buf[..];
        assert!(matches!(AmfValue::decode(&mut slice), Err(Error::InvalidAmf(_))));
    }

    #[test]
    fn test_empty_key_inside_object() {
        // An empty key that is not followed by the end marker is a real property.
        let value = AmfValue::Object(vec![("".into(), AmfValue::Number(1.0))]);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn test_serialize_to_json() {
        let value = AmfValue::EcmaArray(vec![
            ("duration".into(), AmfValue::Number(2.0)),
            ("codec".into(), AmfValue::string("avc1")),
        ]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["duration"], 2.0);
        assert_eq!(json["codec"], "avc1");
    }
}
