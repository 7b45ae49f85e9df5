//! Indexed key values
//!
//! A LOV key is the tuple of indexed attribute values for one distinct
//! value of the index, NULLs included. Keys order deterministically:
//! NULL < Bool < Int < Float < Text per attribute, then lexicographically
//! across attributes.

use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::errors::{BitmapError, BitmapResult, ErrorContext};

/// Single attribute value.
///
/// Floats are stored as order-preserving bits with -0.0 folded into 0.0
/// and every NaN folded into one canonical NaN.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl IndexKey {
    pub fn from_bool(v: bool) -> Self {
        IndexKey::Bool(v)
    }

    pub fn from_int(v: i64) -> Self {
        IndexKey::Int(v)
    }

    pub fn from_float(v: f64) -> Self {
        let v = if v == 0.0 {
            0.0
        } else if v.is_nan() {
            f64::NAN
        } else {
            v
        };
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Float(ordered)
    }

    pub fn from_text(v: impl Into<String>) -> Self {
        IndexKey::Text(v.into())
    }

    /// Recovers the float value from its ordered representation.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            IndexKey::Float(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Converts a JSON scalar. Arrays and objects are not indexable.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(IndexKey::from_bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(IndexKey::from_int(i))
                } else {
                    n.as_f64().map(IndexKey::from_float)
                }
            }
            serde_json::Value::String(s) => Some(IndexKey::from_text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            IndexKey::Bool(b) => serde_json::Value::Bool(*b),
            IndexKey::Int(i) => serde_json::Value::from(*i),
            IndexKey::Float(_) => self
                .as_float()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            IndexKey::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn attribute_type(&self) -> AttributeType {
        match self {
            IndexKey::Bool(_) => AttributeType::Bool,
            IndexKey::Int(_) => AttributeType::Int,
            IndexKey::Float(_) => AttributeType::Float,
            IndexKey::Text(_) => AttributeType::Text,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Bool(b) => write!(f, "{}", b),
            IndexKey::Int(i) => write!(f, "{}", i),
            IndexKey::Float(_) => write!(f, "{}", self.as_float().unwrap_or(f64::NAN)),
            IndexKey::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Type of one indexed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Bool,
    Int,
    Float,
    Text,
}

impl AttributeType {
    /// Whether equal values always have equal raw bytes.
    ///
    /// Float equality is not bitwise (0.0 = -0.0, NaN semantics), so float
    /// attributes go through the ordered lookup instead of the hash.
    pub fn is_hashable(self) -> bool {
        !matches!(self, AttributeType::Float)
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AttributeType::Bool => 1,
            AttributeType::Int => 2,
            AttributeType::Float => 3,
            AttributeType::Text => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AttributeType::Bool),
            2 => Some(AttributeType::Int),
            3 => Some(AttributeType::Float),
            4 => Some(AttributeType::Text),
            _ => None,
        }
    }
}

/// Attribute types of the indexed key, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub attributes: Vec<AttributeType>,
}

impl IndexSchema {
    pub fn new(attributes: Vec<AttributeType>) -> BitmapResult<Self> {
        if attributes.is_empty() {
            return Err(BitmapError::invalid_argument(
                "an index needs at least one attribute",
                ErrorContext::none(),
            ));
        }
        if attributes.len() > u8::MAX as usize {
            return Err(BitmapError::invalid_argument(
                format!("{} attributes exceed the limit of 255", attributes.len()),
                ErrorContext::none(),
            ));
        }
        Ok(Self { attributes })
    }

    /// True when every attribute can be hashed by its raw bytes
    pub fn is_hashable(&self) -> bool {
        self.attributes.iter().all(|a| a.is_hashable())
    }

    /// Widens integer values in float attributes, as JSON input loses the
    /// distinction for whole numbers.
    pub fn coerce_key(&self, key: LovKey) -> LovKey {
        LovKey(
            key.0
                .into_iter()
                .zip(self.attributes.iter().map(Some).chain(std::iter::repeat(None)))
                .map(|(value, expected)| match (value, expected) {
                    (Some(IndexKey::Int(i)), Some(AttributeType::Float)) => {
                        Some(IndexKey::from_float(i as f64))
                    }
                    (value, _) => value,
                })
                .collect(),
        )
    }

    /// Checks arity and per-attribute types of a key.
    pub fn check_key(&self, key: &LovKey) -> BitmapResult<()> {
        if key.arity() != self.attributes.len() {
            return Err(BitmapError::invalid_argument(
                format!(
                    "key has {} attributes, index has {}",
                    key.arity(),
                    self.attributes.len()
                ),
                ErrorContext::none().with_key(key.to_string()),
            ));
        }
        for (n, (value, expected)) in key.values().iter().zip(&self.attributes).enumerate() {
            if let Some(value) = value {
                if value.attribute_type() != *expected {
                    return Err(BitmapError::invalid_argument(
                        format!(
                            "attribute {} expects {:?}, got {:?}",
                            n,
                            expected,
                            value.attribute_type()
                        ),
                        ErrorContext::none().with_key(key.to_string()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One distinct indexed value: attribute values with NULLs as `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LovKey(Vec<Option<IndexKey>>);

impl LovKey {
    pub fn new(values: Vec<Option<IndexKey>>) -> Self {
        Self(values)
    }

    /// Builds a key from parallel value / null-flag arrays.
    pub fn from_parts(values: Vec<IndexKey>, is_null: &[bool]) -> BitmapResult<Self> {
        if values.len() != is_null.len() {
            return Err(BitmapError::invalid_argument(
                format!(
                    "{} values but {} null flags",
                    values.len(),
                    is_null.len()
                ),
                ErrorContext::none(),
            ));
        }
        Ok(Self(
            values
                .into_iter()
                .zip(is_null)
                .map(|(v, &null)| if null { None } else { Some(v) })
                .collect(),
        ))
    }

    pub fn single(value: IndexKey) -> Self {
        Self(vec![Some(value)])
    }

    pub fn text(value: &str) -> Self {
        Self::single(IndexKey::from_text(value))
    }

    pub fn int(value: i64) -> Self {
        Self::single(IndexKey::from_int(value))
    }

    pub fn nulls(arity: usize) -> Self {
        Self(vec![None; arity])
    }

    pub fn values(&self) -> &[Option<IndexKey>] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn is_all_null(&self) -> bool {
        self.0.iter().all(|v| v.is_none())
    }

    /// Parses a JSON array (or a lone scalar) into a key.
    pub fn from_json(value: &serde_json::Value) -> BitmapResult<Self> {
        let items: Vec<&serde_json::Value> = match value {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if item.is_null() {
                values.push(None);
                continue;
            }
            let key = IndexKey::from_json(item).ok_or_else(|| {
                BitmapError::invalid_argument(
                    format!("unindexable key value: {}", item),
                    ErrorContext::none(),
                )
            })?;
            values.push(Some(key));
        }
        Ok(Self(values))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|v| v.as_ref().map(|k| k.to_json()).unwrap_or(serde_json::Value::Null))
                .collect(),
        )
    }

    /// Binary form used on LOV pages and in WAL records.
    ///
    /// Format:
    /// - arity (u8)
    /// - per attribute: tag (u8, 0 = NULL) then value
    ///   (bool u8 / int i64 LE / float u64 LE / text u32 LE length + bytes)
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[self.0.len() as u8])?;
        for value in &self.0 {
            match value {
                None => writer.write_all(&[0])?,
                Some(IndexKey::Bool(b)) => writer.write_all(&[1, *b as u8])?,
                Some(IndexKey::Int(i)) => {
                    writer.write_all(&[2])?;
                    writer.write_all(&i.to_le_bytes())?;
                }
                Some(IndexKey::Float(bits)) => {
                    writer.write_all(&[3])?;
                    writer.write_all(&bits.to_le_bytes())?;
                }
                Some(IndexKey::Text(s)) => {
                    writer.write_all(&[4])?;
                    writer.write_all(&(s.len() as u32).to_le_bytes())?;
                    writer.write_all(s.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let arity = byte[0] as usize;
        let mut values = Vec::with_capacity(arity);
        for _ in 0..arity {
            reader.read_exact(&mut byte)?;
            let value = match byte[0] {
                0 => None,
                1 => {
                    reader.read_exact(&mut byte)?;
                    Some(IndexKey::Bool(byte[0] != 0))
                }
                2 => {
                    let mut buf = [0u8; 8];
                    reader.read_exact(&mut buf)?;
                    Some(IndexKey::Int(i64::from_le_bytes(buf)))
                }
                3 => {
                    let mut buf = [0u8; 8];
                    reader.read_exact(&mut buf)?;
                    Some(IndexKey::Float(u64::from_le_bytes(buf)))
                }
                4 => {
                    let mut len_buf = [0u8; 4];
                    reader.read_exact(&mut len_buf)?;
                    let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
                    reader.read_exact(&mut buf)?;
                    let s = String::from_utf8(buf).map_err(|e| {
                        io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
                    })?;
                    Some(IndexKey::Text(s))
                }
                tag => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Invalid key tag: {}", tag),
                    ))
                }
            };
            values.push(value);
        }
        Ok(Self(values))
    }

    pub fn encoded_len(&self) -> usize {
        1 + self
            .0
            .iter()
            .map(|v| match v {
                None => 1,
                Some(IndexKey::Bool(_)) => 2,
                Some(IndexKey::Int(_)) | Some(IndexKey::Float(_)) => 9,
                Some(IndexKey::Text(s)) => 5 + s.len(),
            })
            .sum::<usize>()
    }
}

impl fmt::Display for LovKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| match v {
                Some(k) => k.to_string(),
                None => "NULL".to_string(),
            })
            .collect();
        if parts.len() == 1 {
            write!(f, "{}", parts[0])
        } else {
            write!(f, "({})", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        let keys = vec![
            IndexKey::from_bool(false),
            IndexKey::from_bool(true),
            IndexKey::from_int(-100),
            IndexKey::from_int(100),
            IndexKey::from_float(-1.5),
            IndexKey::from_float(0.0),
            IndexKey::from_float(2.25),
            IndexKey::from_text("aaa"),
            IndexKey::from_text("zzz"),
        ];
        for i in 1..keys.len() {
            assert!(keys[i - 1] < keys[i], "keys should be ordered");
        }
    }

    #[test]
    fn test_float_canonicalization() {
        assert_eq!(IndexKey::from_float(-0.0), IndexKey::from_float(0.0));
        assert_eq!(IndexKey::from_float(f64::NAN), IndexKey::from_float(-f64::NAN));
        assert_eq!(IndexKey::from_float(3.5).as_float(), Some(3.5));
        assert_eq!(IndexKey::from_float(-7.25).as_float(), Some(-7.25));
    }

    #[test]
    fn test_null_sorts_first() {
        let null = LovKey::nulls(1);
        let a = LovKey::text("a");
        assert!(null < a);
        assert!(null.is_all_null());
    }

    #[test]
    fn test_from_parts() {
        let key = LovKey::from_parts(
            vec![IndexKey::from_int(1), IndexKey::from_int(2)],
            &[false, true],
        )
        .unwrap();
        assert_eq!(key.values(), &[Some(IndexKey::Int(1)), None]);
        assert!(LovKey::from_parts(vec![IndexKey::from_int(1)], &[]).is_err());
    }

    #[test]
    fn test_binary_encoding() {
        let key = LovKey::new(vec![
            Some(IndexKey::from_text("héllo")),
            None,
            Some(IndexKey::from_int(-9)),
            Some(IndexKey::from_float(1.25)),
            Some(IndexKey::from_bool(true)),
        ]);
        let mut buf = Vec::new();
        key.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), key.encoded_len());
        let decoded = LovKey::read_from(&mut io::Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_json_keys() {
        let key = LovKey::from_json(&serde_json::json!(["A", null, 3])).unwrap();
        assert_eq!(key.arity(), 3);
        assert_eq!(key.to_json(), serde_json::json!(["A", null, 3]));
        assert_eq!(LovKey::from_json(&serde_json::json!("X")).unwrap(), LovKey::text("X"));
        assert!(LovKey::from_json(&serde_json::json!([[1]])).is_err());
    }

    #[test]
    fn test_schema_checks() {
        let schema = IndexSchema::new(vec![AttributeType::Text, AttributeType::Int]).unwrap();
        assert!(schema.is_hashable());
        let ok = LovKey::new(vec![Some(IndexKey::from_text("a")), None]);
        assert!(schema.check_key(&ok).is_ok());
        let wrong_type = LovKey::new(vec![Some(IndexKey::from_int(1)), None]);
        assert!(schema.check_key(&wrong_type).is_err());
        assert!(schema.check_key(&LovKey::text("a")).is_err());

        let floats = IndexSchema::new(vec![AttributeType::Float]).unwrap();
        assert!(!floats.is_hashable());
        assert!(IndexSchema::new(vec![]).is_err());
    }

    #[test]
    fn test_coerce_widens_ints_for_float_attributes() {
        let schema = IndexSchema::new(vec![AttributeType::Float, AttributeType::Int]).unwrap();
        let key = LovKey::from_json(&serde_json::json!([2, 2])).unwrap();
        let coerced = schema.coerce_key(key);
        assert!(schema.check_key(&coerced).is_ok());
        assert_eq!(coerced.values()[0], Some(IndexKey::from_float(2.0)));
        assert_eq!(coerced.values()[1], Some(IndexKey::from_int(2)));
    }
}
