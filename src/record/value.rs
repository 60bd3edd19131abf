use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::{LENGTH_PREFIX_SIZE, is_null, null_bitmap_size, set_null};
use super::error::{RecordError, RecordResult};
use crate::file::ByteReader;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Int,     // 4 bytes, i32
    Real,    // 4 bytes, f32
    VarChar, // 4 byte length + bytes
}

impl AttrType {
    /// Type code used by catalogs that persist attribute descriptors
    pub fn code(&self) -> u32 {
        match self {
            AttrType::Int => 0,
            AttrType::Real => 1,
            AttrType::VarChar => 2,
        }
    }
}

impl TryFrom<u32> for AttrType {
    type Error = RecordError;

    fn try_from(code: u32) -> RecordResult<Self> {
        match code {
            0 => Ok(AttrType::Int),
            1 => Ok(AttrType::Real),
            2 => Ok(AttrType::VarChar),
            other => Err(RecordError::UnknownType(other)),
        }
    }
}

/// Field descriptor supplied by the caller's schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttrType,
    /// Declared length in bytes; the maximum content length for VarChar
    pub length: u32,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attr_type: AttrType, length: u32) -> Self {
        Self {
            name: name.into(),
            attr_type,
            length,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Int, 4)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Real, 4)
    }

    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, AttrType::VarChar, length)
    }
}

/// Find an attribute's position by name
pub fn find_attribute(attrs: &[Attribute], name: &str) -> RecordResult<usize> {
    attrs
        .iter()
        .position(|a| a.name == name)
        .ok_or_else(|| RecordError::AttributeNotFound(name.to_string()))
}

/// A single typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Real(f32),
    VarChar(String),
    Null,
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Real(_) => "Real",
            Value::VarChar(_) => "VarChar",
            Value::Null => "Null",
        }
    }

    /// Append this value in tuple-buffer field format
    pub fn write_to(&self, attr: &Attribute, out: &mut Vec<u8>) -> RecordResult<()> {
        match (self, attr.attr_type) {
            (Value::Int(i), AttrType::Int) => out.extend_from_slice(&i.to_le_bytes()),
            (Value::Real(r), AttrType::Real) => out.extend_from_slice(&r.to_le_bytes()),
            (Value::VarChar(s), AttrType::VarChar) => {
                let bytes = s.as_bytes();
                if bytes.len() > attr.length as usize {
                    return Err(RecordError::MalformedTuple(format!(
                        "String length {} exceeds max length {} of '{}'",
                        bytes.len(),
                        attr.length,
                        attr.name
                    )));
                }
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            (Value::Null, _) => {}
            (value, dt) => {
                return Err(RecordError::TypeMismatch {
                    expected: format!("{:?}", dt),
                    actual: value.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Read one non-null field in tuple-buffer format, advancing `cursor`
    pub fn read_from(attr_type: AttrType, bytes: &[u8], cursor: &mut usize) -> RecordResult<Self> {
        let truncated = |_| RecordError::MalformedTuple(format!("Truncated {:?} field", attr_type));
        let value = match attr_type {
            AttrType::Int => {
                let i = bytes.i32_at(*cursor).map_err(truncated)?;
                *cursor += 4;
                Value::Int(i)
            }
            AttrType::Real => {
                let r = bytes.f32_at(*cursor).map_err(truncated)?;
                *cursor += 4;
                Value::Real(r)
            }
            AttrType::VarChar => {
                let len = bytes.u32_at(*cursor).map_err(truncated)? as usize;
                let raw = bytes
                    .bytes_at(*cursor + LENGTH_PREFIX_SIZE, len)
                    .map_err(truncated)?;
                let s = String::from_utf8(raw.to_vec())
                    .map_err(|e| RecordError::MalformedTuple(format!("Invalid UTF-8: {}", e)))?;
                *cursor += LENGTH_PREFIX_SIZE + len;
                Value::VarChar(s)
            }
        };
        Ok(value)
    }

    /// Encode as a key buffer (a single field with no null bitmap)
    pub fn to_key_bytes(&self, attr: &Attribute) -> RecordResult<Vec<u8>> {
        if self.is_null() {
            return Err(RecordError::MalformedTuple(
                "NULL has no key encoding".to_string(),
            ));
        }
        let mut out = Vec::new();
        self.write_to(attr, &mut out)?;
        Ok(out)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::VarChar(s) => write!(f, "{}", s),
            Value::Null => write!(f, "NULL"),
        }
    }
}

/// Build a tuple buffer from typed values
pub fn encode_values(attrs: &[Attribute], values: &[Value]) -> RecordResult<Vec<u8>> {
    if values.len() != attrs.len() {
        return Err(RecordError::MalformedTuple(format!(
            "Expected {} values, got {}",
            attrs.len(),
            values.len()
        )));
    }

    let bitmap_size = null_bitmap_size(attrs.len());
    let mut out = vec![0u8; bitmap_size];
    for (index, (value, attr)) in values.iter().zip(attrs).enumerate() {
        if value.is_null() {
            set_null(&mut out[..bitmap_size], index);
        } else {
            value.write_to(attr, &mut out)?;
        }
    }
    Ok(out)
}

/// Parse a tuple buffer into typed values
pub fn decode_values(attrs: &[Attribute], tuple: &[u8]) -> RecordResult<Vec<Value>> {
    let bitmap_size = null_bitmap_size(attrs.len());
    let bitmap = tuple
        .bytes_at(0, bitmap_size)
        .map_err(|_| RecordError::MalformedTuple("Truncated null bitmap".to_string()))?;

    let mut cursor = bitmap_size;
    let mut values = Vec::with_capacity(attrs.len());
    for (index, attr) in attrs.iter().enumerate() {
        if is_null(bitmap, index) {
            values.push(Value::Null);
        } else {
            values.push(Value::read_from(attr.attr_type, tuple, &mut cursor)?);
        }
    }

    if cursor != tuple.len() {
        return Err(RecordError::MalformedTuple(format!(
            "{} trailing bytes after last field",
            tuple.len() - cursor
        )));
    }
    Ok(values)
}
