//! Entry codec: one typed column value ⇄ byte payload plus a type tag.
//!
//! Fixed-width numerics are big-endian, floats travel as their IEEE-754 bit
//! pattern, strings and bytes are stored verbatim. Numbers whose static type
//! is not known (machine-parsed JSON) keep their literal decimal text under
//! [`TypeTag::Number`].
//!
//! The tag bytes are part of the persisted format and must never change.

use crate::error::{TkvError, TkvResult};
use std::fmt;
use std::str::FromStr;

/// One-byte marker telling the decoder how to read a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Bool = 1,
    I16 = 4,
    I32 = 5,
    I64 = 6,
    U8 = 8,
    U16 = 9,
    U32 = 10,
    U64 = 11,
    F32 = 13,
    F64 = 14,
    Bytes = 23,
    String = 24,
    Number = 99,
}

impl TypeTag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a persisted tag byte.
    pub fn from_byte(byte: u8) -> TkvResult<Self> {
        let tag = match byte {
            1 => TypeTag::Bool,
            4 => TypeTag::I16,
            5 => TypeTag::I32,
            6 => TypeTag::I64,
            8 => TypeTag::U8,
            9 => TypeTag::U16,
            10 => TypeTag::U32,
            11 => TypeTag::U64,
            13 => TypeTag::F32,
            14 => TypeTag::F64,
            23 => TypeTag::Bytes,
            24 => TypeTag::String,
            99 => TypeTag::Number,
            other => {
                return Err(TkvError::UnsupportedType(format!("unknown type tag {other}")));
            }
        };
        Ok(tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::I16 => "i16",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::U8 => "u8",
            TypeTag::U16 => "u16",
            TypeTag::U32 => "u32",
            TypeTag::U64 => "u64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Bytes => "bytes",
            TypeTag::String => "string",
            TypeTag::Number => "number",
        }
    }

    /// Encoded width in bytes, `None` for variable-length payloads.
    pub fn width(self) -> Option<usize> {
        match self {
            TypeTag::Bool | TypeTag::U8 => Some(1),
            TypeTag::I16 | TypeTag::U16 => Some(2),
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 => Some(4),
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 => Some(8),
            TypeTag::Bytes | TypeTag::String | TypeTag::Number => None,
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = TkvError;

    fn try_from(byte: u8) -> TkvResult<Self> {
        TypeTag::from_byte(byte)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric literal whose origin type is unknown.
///
/// Holds the exact decimal text it was built from so that values such as
/// `18446744073709551615` or `0.1` survive storage without a trip through f64.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Number(String);

impl Number {
    /// Validate `text` as a JSON-style decimal literal.
    pub fn parse(text: &str) -> TkvResult<Self> {
        if text.is_empty() || text.trim() != text {
            return Err(TkvError::UnsupportedType(format!(
                "invalid numeric literal {text:?}"
            )));
        }
        serde_json::from_str::<serde_json::Number>(text).map_err(|_| {
            TkvError::UnsupportedType(format!("invalid numeric literal {text:?}"))
        })?;
        Ok(Number(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Integer view, `None` for fractional or out-of-range literals.
    pub fn as_i128(&self) -> Option<i128> {
        self.0.parse().ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }

    pub(crate) fn to_json(&self) -> TkvResult<serde_json::Number> {
        Ok(serde_json::from_str(&self.0)?)
    }
}

impl FromStr for Number {
    type Err = TkvError;

    fn from_str(s: &str) -> TkvResult<Self> {
        Number::parse(s)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<serde_json::Number> for Number {
    fn from(n: serde_json::Number) -> Self {
        Number(n.to_string())
    }
}

macro_rules! number_from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for Number {
            fn from(v: $t) -> Self {
                Number(v.to_string())
            }
        })*
    };
}

number_from_integer!(i16, i32, i64, u8, u16, u32, u64);

/// A single decoded column value. The variant set is closed: every variant
/// has exactly one [`TypeTag`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    String(String),
    Number(Number),
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Bool(_) => TypeTag::Bool,
            Value::I16(_) => TypeTag::I16,
            Value::I32(_) => TypeTag::I32,
            Value::I64(_) => TypeTag::I64,
            Value::U8(_) => TypeTag::U8,
            Value::U16(_) => TypeTag::U16,
            Value::U32(_) => TypeTag::U32,
            Value::U64(_) => TypeTag::U64,
            Value::F32(_) => TypeTag::F32,
            Value::F64(_) => TypeTag::F64,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::String(_) => TypeTag::String,
            Value::Number(_) => TypeTag::Number,
        }
    }

    /// Integer view across all integer widths and integral literals.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::I16(v) => Some(i128::from(*v)),
            Value::I32(v) => Some(i128::from(*v)),
            Value::I64(v) => Some(i128::from(*v)),
            Value::U8(v) => Some(i128::from(*v)),
            Value::U16(v) => Some(i128::from(*v)),
            Value::U32(v) => Some(i128::from(*v)),
            Value::U64(v) => Some(i128::from(*v)),
            Value::Number(n) => n.as_i128(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            Value::Number(n) => n.as_f64(),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Equality used by query filters.
    ///
    /// Same-variant values compare directly. Integers compare exactly across
    /// widths; any other pair of numeric values, literals included, compares
    /// as f64, so `I32(1)` matches `F64(1.0)`.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        if self.tag() == other.tag() {
            return self == other;
        }
        if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
            return a == b;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Convert to JSON for untyped fetches. Bytes render as base64 text and
    /// non-finite floats as strings.
    pub fn to_json(&self) -> TkvResult<serde_json::Value> {
        use base64::Engine;
        use serde_json::Value as Json;

        let json = match self {
            Value::Bool(v) => Json::Bool(*v),
            Value::I16(v) => Json::from(*v),
            Value::I32(v) => Json::from(*v),
            Value::I64(v) => Json::from(*v),
            Value::U8(v) => Json::from(*v),
            Value::U16(v) => Json::from(*v),
            Value::U32(v) => Json::from(*v),
            Value::U64(v) => Json::from(*v),
            Value::F32(v) => float_json(f64::from(*v), v.to_string())?,
            Value::F64(v) => float_json(*v, v.to_string())?,
            Value::Bytes(v) => Json::String(base64::engine::general_purpose::STANDARD.encode(v)),
            Value::String(v) => Json::String(v.clone()),
            Value::Number(n) => Json::Number(n.to_json()?),
        };
        Ok(json)
    }

    /// Convert a JSON scalar. Numbers keep their literal text.
    pub fn from_json(json: &serde_json::Value) -> TkvResult<Self> {
        use serde_json::Value as Json;

        match json {
            Json::Bool(v) => Ok(Value::Bool(*v)),
            Json::Number(n) => Ok(Value::Number(Number::from(n.clone()))),
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Null => Err(TkvError::UnsupportedType("null".to_string())),
            Json::Array(_) => Err(TkvError::UnsupportedType("array".to_string())),
            Json::Object(_) => Err(TkvError::UnsupportedType("object".to_string())),
        }
    }
}

/// JSON has no NaN or infinity; those render as the strings `"NaN"`,
/// `"Infinity"` and `"-Infinity"`.
fn float_json(v: f64, text: String) -> TkvResult<serde_json::Value> {
    use serde_json::Value as Json;

    if v.is_nan() {
        return Ok(Json::String("NaN".to_string()));
    }
    if v.is_infinite() {
        let text = if v > 0.0 { "Infinity" } else { "-Infinity" };
        return Ok(Json::String(text.to_string()));
    }
    Ok(Json::Number(Number::parse(&text)?.to_json()?))
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from!(
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Vec<u8> => Bytes,
    String => String,
    Number => Number
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// Serialize a value into its payload and tag.
pub fn encode(value: &Value) -> (Vec<u8>, TypeTag) {
    let bytes = match value {
        Value::Bool(v) => vec![u8::from(*v)],
        Value::I16(v) => v.to_be_bytes().to_vec(),
        Value::I32(v) => v.to_be_bytes().to_vec(),
        Value::I64(v) => v.to_be_bytes().to_vec(),
        Value::U8(v) => vec![*v],
        Value::U16(v) => v.to_be_bytes().to_vec(),
        Value::U32(v) => v.to_be_bytes().to_vec(),
        Value::U64(v) => v.to_be_bytes().to_vec(),
        Value::F32(v) => v.to_bits().to_be_bytes().to_vec(),
        Value::F64(v) => v.to_bits().to_be_bytes().to_vec(),
        Value::Bytes(v) => v.clone(),
        Value::String(v) => v.as_bytes().to_vec(),
        Value::Number(n) => n.as_str().as_bytes().to_vec(),
    };
    (bytes, value.tag())
}

/// Read the leading `N` bytes; shorter payloads are a hard error.
fn fixed<const N: usize>(bytes: &[u8], tag: TypeTag) -> TkvResult<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|head| <[u8; N]>::try_from(head).ok())
        .ok_or(TkvError::InsufficientData {
            tag: tag.name(),
            expected: N,
            actual: bytes.len(),
        })
}

fn utf8(bytes: &[u8], tag: TypeTag) -> TkvResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| TkvError::Serialization(format!("invalid utf-8 in {tag} payload: {e}")))
}

/// Deserialize a payload according to its tag.
pub fn decode(bytes: &[u8], tag: TypeTag) -> TkvResult<Value> {
    let value = match tag {
        TypeTag::Bool => Value::Bool(fixed::<1>(bytes, tag)?[0] != 0),
        TypeTag::I16 => Value::I16(i16::from_be_bytes(fixed(bytes, tag)?)),
        TypeTag::I32 => Value::I32(i32::from_be_bytes(fixed(bytes, tag)?)),
        TypeTag::I64 => Value::I64(i64::from_be_bytes(fixed(bytes, tag)?)),
        TypeTag::U8 => Value::U8(fixed::<1>(bytes, tag)?[0]),
        TypeTag::U16 => Value::U16(u16::from_be_bytes(fixed(bytes, tag)?)),
        TypeTag::U32 => Value::U32(u32::from_be_bytes(fixed(bytes, tag)?)),
        TypeTag::U64 => Value::U64(u64::from_be_bytes(fixed(bytes, tag)?)),
        TypeTag::F32 => Value::F32(f32::from_bits(u32::from_be_bytes(fixed(bytes, tag)?))),
        TypeTag::F64 => Value::F64(f64::from_bits(u64::from_be_bytes(fixed(bytes, tag)?))),
        TypeTag::Bytes => Value::Bytes(bytes.to_vec()),
        TypeTag::String => Value::String(utf8(bytes, tag)?),
        TypeTag::Number => Value::Number(Number::parse(&utf8(bytes, tag)?)?),
    };
    Ok(value)
}

/// Rust types usable as record fields.
///
/// `TAG` is the tag written for the field; [`ColumnValue::from_value`] accepts
/// the matching variant and, for numeric fields, decimal literals that fit.
pub trait ColumnValue: Sized {
    const TAG: TypeTag;

    fn to_value(&self) -> Value;

    fn from_value(value: Value, column: &str) -> TkvResult<Self>;
}

fn mismatch<T>(column: &str, expected: TypeTag, actual: &Value) -> TkvResult<T> {
    Err(TkvError::DestinationMismatch {
        column: column.to_string(),
        expected: expected.name(),
        actual: actual.tag().name(),
    })
}

macro_rules! numeric_column {
    ($($t:ty => $variant:ident),*) => {
        $(impl ColumnValue for $t {
            const TAG: TypeTag = TypeTag::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }

            fn from_value(value: Value, column: &str) -> TkvResult<Self> {
                let parsed = match &value {
                    Value::$variant(v) => Some(*v),
                    Value::Number(n) => n.as_str().parse::<$t>().ok(),
                    _ => None,
                };
                match parsed {
                    Some(v) => Ok(v),
                    None => mismatch(column, Self::TAG, &value),
                }
            }
        })*
    };
}

numeric_column!(
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64
);

impl ColumnValue for bool {
    const TAG: TypeTag = TypeTag::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value, column: &str) -> TkvResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            other => mismatch(column, Self::TAG, &other),
        }
    }
}

impl ColumnValue for String {
    const TAG: TypeTag = TypeTag::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value, column: &str) -> TkvResult<Self> {
        match value {
            Value::String(v) => Ok(v),
            other => mismatch(column, Self::TAG, &other),
        }
    }
}

impl ColumnValue for Vec<u8> {
    const TAG: TypeTag = TypeTag::Bytes;

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value, column: &str) -> TkvResult<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::String(v) => Ok(v.into_bytes()),
            other => mismatch(column, Self::TAG, &other),
        }
    }
}

impl ColumnValue for Number {
    const TAG: TypeTag = TypeTag::Number;

    fn to_value(&self) -> Value {
        Value::Number(self.clone())
    }

    fn from_value(value: Value, column: &str) -> TkvResult<Self> {
        match value {
            Value::Number(n) => Ok(n),
            Value::F32(v) => Number::parse(&v.to_string()),
            Value::F64(v) => Number::parse(&v.to_string()),
            ref other => match other.as_i128() {
                Some(v) => Number::parse(&v.to_string()),
                None => mismatch(column, Self::TAG, other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(value: Value) {
        let (bytes, tag) = encode(&value);
        assert_eq!(tag, value.tag());
        assert_eq!(decode(&bytes, tag).unwrap(), value);
    }

    #[test]
    fn round_trip_boundaries() {
        round_trip(Value::Bool(false));
        round_trip(Value::Bool(true));
        round_trip(Value::I16(i16::MIN));
        round_trip(Value::I16(0));
        round_trip(Value::I32(-38));
        round_trip(Value::I32(i32::MAX));
        round_trip(Value::I64(i64::MIN));
        round_trip(Value::U8(u8::MAX));
        round_trip(Value::U16(0));
        round_trip(Value::U32(u32::MAX));
        round_trip(Value::U64(u64::MAX));
        round_trip(Value::F32(f32::MIN_POSITIVE));
        round_trip(Value::F32(f32::MAX));
        round_trip(Value::F64(-0.0));
        round_trip(Value::F64(99.48));
        round_trip(Value::Bytes(vec![]));
        round_trip(Value::Bytes(vec![0, 255, 7]));
        round_trip(Value::String(String::new()));
        round_trip(Value::String("strawberry".into()));
        round_trip(Value::Number(Number::parse("18446744073709551617").unwrap()));
        round_trip(Value::Number(Number::parse("0.1").unwrap()));
    }

    #[test]
    fn big_endian_layout() {
        assert_eq!(encode(&Value::U32(1)).0, vec![0, 0, 0, 1]);
        assert_eq!(encode(&Value::I16(-2)).0, vec![0xff, 0xfe]);
        assert_eq!(encode(&Value::F64(1.0)).0, 1.0f64.to_bits().to_be_bytes().to_vec());
    }

    #[test]
    fn short_payload_is_insufficient_data() {
        let err = decode(&[0, 1], TypeTag::U32).unwrap_err();
        assert!(matches!(
            err,
            TkvError::InsufficientData {
                expected: 4,
                actual: 2,
                ..
            }
        ));
        assert!(matches!(
            decode(&[], TypeTag::Bool),
            Err(TkvError::InsufficientData { .. })
        ));
    }

    #[test]
    fn nonzero_byte_is_true() {
        assert_eq!(decode(&[7], TypeTag::Bool).unwrap(), Value::Bool(true));
        assert_eq!(decode(&[0], TypeTag::Bool).unwrap(), Value::Bool(false));
    }

    #[test]
    fn unknown_tag_byte_is_unsupported() {
        assert!(matches!(
            TypeTag::from_byte(2),
            Err(TkvError::UnsupportedType(_))
        ));
        assert_eq!(TypeTag::try_from(99).unwrap(), TypeTag::Number);
    }

    #[test]
    fn number_rejects_garbage() {
        assert!(Number::parse("n/a").is_err());
        assert!(Number::parse(" 1").is_err());
        assert!(Number::parse("").is_err());
        assert!(decode(b"12a", TypeTag::Number).is_err());
    }

    #[test]
    fn number_keeps_literal_text() {
        let n = Number::parse("1.10").unwrap();
        assert_eq!(n.to_string(), "1.10");
        let json = Value::Number(n).to_json().unwrap();
        assert_eq!(json.to_string(), "1.10");
    }

    #[test]
    fn column_value_accepts_literals() {
        let n = Value::Number(Number::parse("366").unwrap());
        assert_eq!(i32::from_value(n.clone(), "size").unwrap(), 366);
        assert_eq!(u64::from_value(n.clone(), "size").unwrap(), 366);
        assert!(matches!(
            String::from_value(n, "size"),
            Err(TkvError::DestinationMismatch { .. })
        ));
        let neg = Value::Number(Number::parse("-1").unwrap());
        assert!(u32::from_value(neg, "size").is_err());
    }

    #[test]
    fn loose_equality() {
        assert!(Value::I32(366).loosely_eq(&Value::I64(366)));
        assert!(Value::U8(3).loosely_eq(&Value::Number(Number::parse("3").unwrap())));
        assert!(Value::F64(1.5).loosely_eq(&Value::Number(Number::parse("1.5").unwrap())));
        assert!(!Value::I32(1).loosely_eq(&Value::String("1".into())));
        assert!(Value::I32(1).loosely_eq(&Value::F64(1.0)));
        assert!(Value::F32(2.5).loosely_eq(&Value::F64(2.5)));
        assert!(!Value::I32(1).loosely_eq(&Value::F64(1.5)));
        assert!(!Value::F64(f64::NAN).loosely_eq(&Value::F64(f64::NAN)));
        assert!(!Value::Bool(true).loosely_eq(&Value::I32(1)));
        assert!(Value::String("a".into()).loosely_eq(&Value::String("a".into())));
    }

    #[test]
    fn json_conversion() {
        let v = Value::from_json(&serde_json::json!("mango")).unwrap();
        assert_eq!(v, Value::String("mango".into()));
        assert!(Value::from_json(&serde_json::Value::Null).is_err());
        assert_eq!(Value::F64(15.0).to_json().unwrap().to_string(), "15");
        assert_eq!(Value::F64(99.48).to_json().unwrap().to_string(), "99.48");
        assert_eq!(Value::Bytes(vec![1, 2]).to_json().unwrap(), serde_json::json!("AQI="));
        assert_eq!(Value::F64(f64::NAN).to_json().unwrap(), serde_json::json!("NaN"));
        assert_eq!(Value::F32(f32::INFINITY).to_json().unwrap(), serde_json::json!("Infinity"));
        assert_eq!(
            Value::F64(f64::NEG_INFINITY).to_json().unwrap(),
            serde_json::json!("-Infinity")
        );
    }

    proptest! {
        #[test]
        fn prop_i64_round_trip(v in any::<i64>()) {
            let (bytes, tag) = encode(&Value::I64(v));
            prop_assert_eq!(decode(&bytes, tag).unwrap(), Value::I64(v));
        }

        #[test]
        fn prop_f64_bits_round_trip(bits in any::<u64>()) {
            let v = f64::from_bits(bits);
            let (bytes, tag) = encode(&Value::F64(v));
            match decode(&bytes, tag).unwrap() {
                Value::F64(out) => prop_assert_eq!(out.to_bits(), bits),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn prop_string_round_trip(s in ".*") {
            let (bytes, tag) = encode(&Value::String(s.clone()));
            prop_assert_eq!(decode(&bytes, tag).unwrap(), Value::String(s));
        }
    }
}
