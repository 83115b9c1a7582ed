use crate::{BridgeError, Result};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Backend type descriptor. Carried separately from values so that absent
/// optionals and empty lists still advertise a concrete type on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Decimal,
    Uuid,
    Json,
    Timestamp,
    Date,
    Bytes,
    Text,
    List(Box<ValueType>),
    Optional(Box<ValueType>),
}

/// Backend typed-value wire representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Decimal(String), // Precision preserving string representation
    Uuid(Uuid),
    Json(serde_json::Value),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Bytes(Bytes),
    Text(String),
    List {
        item: ValueType,
        items: Vec<TypedValue>,
    },
    /// `value: None` is "no value", distinct from a present null-like value
    /// of the base type.
    Optional {
        item: ValueType,
        value: Option<Box<TypedValue>>,
    },
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::Bool(_) => ValueType::Bool,
            TypedValue::Int8(_) => ValueType::Int8,
            TypedValue::Int16(_) => ValueType::Int16,
            TypedValue::Int32(_) => ValueType::Int32,
            TypedValue::Int64(_) => ValueType::Int64,
            TypedValue::Uint8(_) => ValueType::Uint8,
            TypedValue::Uint16(_) => ValueType::Uint16,
            TypedValue::Uint32(_) => ValueType::Uint32,
            TypedValue::Uint64(_) => ValueType::Uint64,
            TypedValue::Float32(_) => ValueType::Float32,
            TypedValue::Float64(_) => ValueType::Float64,
            TypedValue::Decimal(_) => ValueType::Decimal,
            TypedValue::Uuid(_) => ValueType::Uuid,
            TypedValue::Json(_) => ValueType::Json,
            TypedValue::Timestamp(_) => ValueType::Timestamp,
            TypedValue::Date(_) => ValueType::Date,
            TypedValue::Bytes(_) => ValueType::Bytes,
            TypedValue::Text(_) => ValueType::Text,
            TypedValue::List { item, .. } => ValueType::List(Box::new(item.clone())),
            TypedValue::Optional { item, .. } => ValueType::Optional(Box::new(item.clone())),
        }
    }
}

/// Engine-facing column type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Uuid,
    Json,
    Timestamp,
    Date,
    Bytes,
    Text,
    List,
}

impl ColumnType {
    /// Map a backend type descriptor to the engine column type. Optionality
    /// is transparent to callers.
    pub fn from_value_type(ty: &ValueType) -> ColumnType {
        match ty {
            ValueType::Bool => ColumnType::Bool,
            ValueType::Int8 | ValueType::Int16 | ValueType::Int32 => ColumnType::Integer,
            ValueType::Uint8 | ValueType::Uint16 => ColumnType::Integer,
            // Uint32 does not fit the engine's 32-bit signed integer range
            ValueType::Uint32 | ValueType::Int64 | ValueType::Uint64 => ColumnType::BigInt,
            ValueType::Float32 => ColumnType::Float,
            ValueType::Float64 => ColumnType::Double,
            ValueType::Decimal => ColumnType::Decimal,
            ValueType::Uuid => ColumnType::Uuid,
            ValueType::Json => ColumnType::Json,
            ValueType::Timestamp => ColumnType::Timestamp,
            ValueType::Date => ColumnType::Date,
            ValueType::Bytes => ColumnType::Bytes,
            ValueType::Text => ColumnType::Text,
            ValueType::List(_) => ColumnType::List,
            ValueType::Optional(inner) => ColumnType::from_value_type(inner),
        }
    }
}

/// Unified engine-agnostic value, produced on the way out and accepted as
/// caller arguments on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Decimal(String),
    Text(String),
    Bytes(Bytes),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
    Json(serde_json::Value),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "0x{}", v.iter().fold(String::new(), |mut s, b| {
                use fmt::Write;
                let _ = write!(s, "{:02x}", b);
                s
            })),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Decode a backend typed value into the engine representation.
///
/// Narrow integer widths widen to `Int64` losslessly. `Uint64` beyond
/// `i64::MAX` cannot round-trip through the engine's signed integer and is
/// kept as a decimal string instead.
pub fn decode(value: &TypedValue) -> Value {
    match value {
        TypedValue::Bool(v) => Value::Bool(*v),
        TypedValue::Int8(v) => Value::Int64(*v as i64),
        TypedValue::Int16(v) => Value::Int64(*v as i64),
        TypedValue::Int32(v) => Value::Int64(*v as i64),
        TypedValue::Int64(v) => Value::Int64(*v),
        TypedValue::Uint8(v) => Value::Int64(*v as i64),
        TypedValue::Uint16(v) => Value::Int64(*v as i64),
        TypedValue::Uint32(v) => Value::Int64(*v as i64),
        TypedValue::Uint64(v) => {
            if *v > i64::MAX as u64 {
                Value::Decimal(v.to_string())
            } else {
                Value::Int64(*v as i64)
            }
        }
        TypedValue::Float32(v) => Value::Float64(*v as f64),
        TypedValue::Float64(v) => Value::Float64(*v),
        TypedValue::Decimal(v) => Value::Decimal(v.clone()),
        TypedValue::Uuid(v) => Value::Uuid(*v),
        TypedValue::Json(v) => Value::Json(v.clone()),
        TypedValue::Timestamp(v) => Value::Timestamp(*v),
        TypedValue::Date(v) => Value::Date(*v),
        TypedValue::Bytes(v) => Value::Bytes(v.clone()),
        TypedValue::Text(v) => Value::Text(v.clone()),
        TypedValue::List { items, .. } => Value::List(items.iter().map(decode).collect()),
        TypedValue::Optional { value, .. } => match value {
            Some(inner) => decode(inner),
            None => Value::Null,
        },
    }
}

/// Encode an engine value as a backend typed value of the given target type.
///
/// `Value::Null` encodes as a typed empty `Optional`, never as an untyped
/// null. Coercions: matching representations pass through, strings are
/// parsed; anything out of range or unparseable fails with
/// `InvalidParameterValue`.
pub fn encode(value: &Value, target: &ValueType) -> Result<TypedValue> {
    if let ValueType::Optional(inner) = target {
        return match value {
            Value::Null => Ok(TypedValue::Optional {
                item: (**inner).clone(),
                value: None,
            }),
            present => Ok(TypedValue::Optional {
                item: (**inner).clone(),
                value: Some(Box::new(encode(present, inner)?)),
            }),
        };
    }
    if matches!(value, Value::Null) {
        return Ok(TypedValue::Optional {
            item: target.clone(),
            value: None,
        });
    }
    match target {
        ValueType::Bool => match value {
            Value::Bool(v) => Ok(TypedValue::Bool(*v)),
            other => Err(invalid(other, "bool")),
        },
        ValueType::Int8 => encode_signed(value, i8::MIN as i64, i8::MAX as i64, "int8")
            .map(|v| TypedValue::Int8(v as i8)),
        ValueType::Int16 => encode_signed(value, i16::MIN as i64, i16::MAX as i64, "int16")
            .map(|v| TypedValue::Int16(v as i16)),
        ValueType::Int32 => encode_signed(value, i32::MIN as i64, i32::MAX as i64, "int32")
            .map(|v| TypedValue::Int32(v as i32)),
        ValueType::Int64 => {
            encode_signed(value, i64::MIN, i64::MAX, "int64").map(TypedValue::Int64)
        }
        ValueType::Uint8 => {
            encode_unsigned(value, u8::MAX as u64, "uint8").map(|v| TypedValue::Uint8(v as u8))
        }
        ValueType::Uint16 => {
            encode_unsigned(value, u16::MAX as u64, "uint16").map(|v| TypedValue::Uint16(v as u16))
        }
        ValueType::Uint32 => {
            encode_unsigned(value, u32::MAX as u64, "uint32").map(|v| TypedValue::Uint32(v as u32))
        }
        ValueType::Uint64 => encode_unsigned(value, u64::MAX, "uint64").map(TypedValue::Uint64),
        ValueType::Float32 => encode_float(value, "float32").map(|v| TypedValue::Float32(v as f32)),
        ValueType::Float64 => encode_float(value, "float64").map(TypedValue::Float64),
        ValueType::Decimal => match value {
            Value::Decimal(v) => Ok(TypedValue::Decimal(v.clone())),
            Value::Int64(v) => Ok(TypedValue::Decimal(v.to_string())),
            Value::Float64(v) => Ok(TypedValue::Decimal(v.to_string())),
            Value::Text(v) => {
                if v.parse::<f64>().is_ok() {
                    Ok(TypedValue::Decimal(v.clone()))
                } else {
                    Err(invalid(value, "decimal"))
                }
            }
            other => Err(invalid(other, "decimal")),
        },
        ValueType::Uuid => match value {
            Value::Uuid(v) => Ok(TypedValue::Uuid(*v)),
            Value::Text(v) => Uuid::parse_str(v)
                .map(TypedValue::Uuid)
                .map_err(|_| invalid(value, "uuid")),
            other => Err(invalid(other, "uuid")),
        },
        ValueType::Json => match value {
            Value::Json(v) => Ok(TypedValue::Json(v.clone())),
            Value::Text(v) => serde_json::from_str(v)
                .map(TypedValue::Json)
                .map_err(|_| invalid(value, "json")),
            other => Err(invalid(other, "json")),
        },
        ValueType::Timestamp => match value {
            Value::Timestamp(v) => Ok(TypedValue::Timestamp(*v)),
            Value::Text(v) => DateTime::parse_from_rfc3339(v)
                .map(|dt| TypedValue::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|_| invalid(value, "timestamp")),
            other => Err(invalid(other, "timestamp")),
        },
        ValueType::Date => match value {
            Value::Date(v) => Ok(TypedValue::Date(*v)),
            Value::Text(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map(TypedValue::Date)
                .map_err(|_| invalid(value, "date")),
            other => Err(invalid(other, "date")),
        },
        ValueType::Bytes => encode_bytes(value),
        ValueType::Text => match value {
            Value::Text(v) => Ok(TypedValue::Text(v.clone())),
            other => Err(invalid(other, "text")),
        },
        ValueType::List(item) => match value {
            Value::List(items) => {
                let mut encoded = Vec::with_capacity(items.len());
                for entry in items {
                    encoded.push(encode(entry, item)?);
                }
                // Empty input still carries the item type so downstream
                // inference never sees an untyped collection.
                Ok(TypedValue::List {
                    item: (**item).clone(),
                    items: encoded,
                })
            }
            single => Ok(TypedValue::List {
                item: (**item).clone(),
                items: vec![encode(single, item)?],
            }),
        },
        ValueType::Optional(_) => unreachable!("optional handled above"),
    }
}

fn invalid(value: &Value, target: &str) -> BridgeError {
    BridgeError::InvalidParameterValue(format!("cannot encode {:?} as {}", value, target))
}

fn encode_signed(value: &Value, min: i64, max: i64, target: &str) -> Result<i64> {
    let v = match value {
        Value::Int64(v) => *v,
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(value, target))?,
        other => return Err(invalid(other, target)),
    };
    if v < min || v > max {
        return Err(BridgeError::InvalidParameterValue(format!(
            "{} out of range for {}",
            v, target
        )));
    }
    Ok(v)
}

fn encode_unsigned(value: &Value, max: u64, target: &str) -> Result<u64> {
    let v = match value {
        Value::Int64(v) => u64::try_from(*v).map_err(|_| invalid(value, target))?,
        Value::Decimal(s) | Value::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(value, target))?,
        other => return Err(invalid(other, target)),
    };
    if v > max {
        return Err(BridgeError::InvalidParameterValue(format!(
            "{} out of range for {}",
            v, target
        )));
    }
    Ok(v)
}

fn encode_float(value: &Value, target: &str) -> Result<f64> {
    match value {
        Value::Float64(v) => Ok(*v),
        Value::Int64(v) => Ok(*v as f64),
        Value::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid(value, target)),
        other => Err(invalid(other, target)),
    }
}

fn encode_bytes(value: &Value) -> Result<TypedValue> {
    match value {
        Value::Bytes(v) => Ok(TypedValue::Bytes(v.clone())),
        // Array-of-byte-like input
        Value::List(items) => {
            let mut buf = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Int64(b) if (0..=255).contains(b) => buf.push(*b as u8),
                    other => {
                        return Err(BridgeError::UnsupportedParameterType(format!(
                            "byte array element {:?} is not a byte",
                            other
                        )))
                    }
                }
            }
            Ok(TypedValue::Bytes(Bytes::from(buf)))
        }
        other => Err(BridgeError::UnsupportedParameterType(format!(
            "cannot encode {:?} as bytes",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_widens_integers() {
        assert_eq!(decode(&TypedValue::Int8(-5)), Value::Int64(-5));
        assert_eq!(decode(&TypedValue::Uint32(7)), Value::Int64(7));
        assert_eq!(decode(&TypedValue::Uint64(42)), Value::Int64(42));
    }

    #[test]
    fn test_decode_oversized_uint64_keeps_precision() {
        let v = i64::MAX as u64 + 1;
        assert_eq!(decode(&TypedValue::Uint64(v)), Value::Decimal(v.to_string()));
    }

    #[test]
    fn test_decode_optional_absent_is_null() {
        let tv = TypedValue::Optional {
            item: ValueType::Text,
            value: None,
        };
        assert_eq!(decode(&tv), Value::Null);
    }

    #[test]
    fn test_encode_null_is_typed_optional() {
        let tv = encode(&Value::Null, &ValueType::Int32).unwrap();
        assert_eq!(
            tv,
            TypedValue::Optional {
                item: ValueType::Int32,
                value: None
            }
        );
    }

    #[test]
    fn test_encode_nullable_wraps_present_value() {
        let tv = encode(
            &Value::Int64(9),
            &ValueType::Optional(Box::new(ValueType::Int32)),
        )
        .unwrap();
        assert_eq!(
            tv,
            TypedValue::Optional {
                item: ValueType::Int32,
                value: Some(Box::new(TypedValue::Int32(9)))
            }
        );
    }

    #[test]
    fn test_encode_string_coercion() {
        assert_eq!(
            encode(&Value::Text("123".into()), &ValueType::Int64).unwrap(),
            TypedValue::Int64(123)
        );
        assert!(matches!(
            encode(&Value::Text("abc".into()), &ValueType::Int32),
            Err(BridgeError::InvalidParameterValue(_))
        ));
    }

    #[test]
    fn test_encode_out_of_range_fails() {
        assert!(matches!(
            encode(&Value::Int64(300), &ValueType::Int8),
            Err(BridgeError::InvalidParameterValue(_))
        ));
        assert!(matches!(
            encode(&Value::Int64(-1), &ValueType::Uint32),
            Err(BridgeError::InvalidParameterValue(_))
        ));
    }

    #[test]
    fn test_encode_empty_list_keeps_item_type() {
        let tv = encode(&Value::List(vec![]), &ValueType::List(Box::new(ValueType::Int32)))
            .unwrap();
        assert_eq!(
            tv,
            TypedValue::List {
                item: ValueType::Int32,
                items: vec![]
            }
        );
    }

    #[test]
    fn test_encode_bytes_shapes() {
        let direct = encode(&Value::Bytes(Bytes::from_static(b"ab")), &ValueType::Bytes).unwrap();
        assert_eq!(direct, TypedValue::Bytes(Bytes::from_static(b"ab")));

        let from_list = encode(
            &Value::List(vec![Value::Int64(97), Value::Int64(98)]),
            &ValueType::Bytes,
        )
        .unwrap();
        assert_eq!(from_list, TypedValue::Bytes(Bytes::from_static(b"ab")));

        assert!(matches!(
            encode(&Value::Int64(1), &ValueType::Bytes),
            Err(BridgeError::UnsupportedParameterType(_))
        ));
    }

    #[test]
    fn test_column_type_mapping_sees_through_optional() {
        let ty = ValueType::Optional(Box::new(ValueType::Uint64));
        assert_eq!(ColumnType::from_value_type(&ty), ColumnType::BigInt);
        assert_eq!(
            ColumnType::from_value_type(&ValueType::List(Box::new(ValueType::Text))),
            ColumnType::List
        );
    }

    #[test]
    fn test_null_round_trips_for_every_scalar_kind() {
        let kinds = [
            ValueType::Bool,
            ValueType::Int8,
            ValueType::Int16,
            ValueType::Int32,
            ValueType::Int64,
            ValueType::Uint8,
            ValueType::Uint16,
            ValueType::Uint32,
            ValueType::Uint64,
            ValueType::Float32,
            ValueType::Float64,
            ValueType::Decimal,
            ValueType::Uuid,
            ValueType::Json,
            ValueType::Timestamp,
            ValueType::Date,
            ValueType::Bytes,
            ValueType::Text,
        ];
        for ty in kinds {
            let encoded = encode(&Value::Null, &ty).unwrap();
            assert_eq!(
                encoded.value_type(),
                ValueType::Optional(Box::new(ty.clone())),
                "null must stay typed for {:?}",
                ty
            );
            assert_eq!(decode(&encoded), Value::Null, "null must decode for {:?}", ty);
        }
    }

    #[test]
    fn test_display_renders_iso8601() {
        let ts = Value::Timestamp(
            DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert_eq!(ts.to_string(), "2024-03-01T12:00:00.000Z");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).to_string(),
            "2024-03-01"
        );
    }
}
