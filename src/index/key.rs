use std::cmp::Ordering;
use std::fmt;

use super::error::{IndexError, IndexResult};
use crate::file::{ByteReader, ByteWriter, FileResult};
use crate::record::codec::{self, LENGTH_PREFIX_SIZE};
use crate::record::{AttrType, Attribute};

/// Index key decoded from a key buffer
///
/// Keys of one index always share the indexed attribute's type. Reals
/// order by IEEE comparison, falling back to the total order for NaN.
#[derive(Debug, Clone)]
pub enum Key {
    Int(i32),
    Real(f32),
    VarChar(Vec<u8>),
}

impl Key {
    /// Parse a key buffer for `attr`
    pub fn from_key_bytes(attr: &Attribute, bytes: &[u8]) -> IndexResult<Self> {
        let value = codec::key_value(attr.attr_type, bytes)
            .map_err(|e| IndexError::MalformedKey(e.to_string()))?;
        Ok(match attr.attr_type {
            AttrType::Int => Key::Int(value.i32_at(0)?),
            AttrType::Real => Key::Real(value.f32_at(0)?),
            AttrType::VarChar => {
                if value.len() > attr.length as usize {
                    return Err(IndexError::MalformedKey(format!(
                        "{} bytes exceed declared length {} of '{}'",
                        value.len(),
                        attr.length,
                        attr.name
                    )));
                }
                Key::VarChar(value.to_vec())
            }
        })
    }

    /// Encode back into key-buffer format
    pub fn to_key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        match self {
            Key::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
            Key::Real(r) => out.extend_from_slice(&r.to_le_bytes()),
            Key::VarChar(bytes) => {
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    /// Bytes taken on a node page
    pub fn encoded_len(&self) -> usize {
        match self {
            Key::Int(_) | Key::Real(_) => 4,
            Key::VarChar(bytes) => LENGTH_PREFIX_SIZE + bytes.len(),
        }
    }

    pub(crate) fn write_at(&self, buf: &mut [u8], offset: usize) -> FileResult<usize> {
        buf.put_bytes(offset, &self.to_key_bytes())?;
        Ok(self.encoded_len())
    }

    /// Decode a key at `offset`, returning it with its encoded length
    pub(crate) fn read_at(attr_type: AttrType, buf: &[u8], offset: usize) -> FileResult<(Self, usize)> {
        let key = match attr_type {
            AttrType::Int => Key::Int(buf.i32_at(offset)?),
            AttrType::Real => Key::Real(buf.f32_at(offset)?),
            AttrType::VarChar => {
                let len = buf.u32_at(offset)? as usize;
                Key::VarChar(buf.bytes_at(offset + LENGTH_PREFIX_SIZE, len)?.to_vec())
            }
        };
        let len = key.encoded_len();
        Ok((key, len))
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Int(_) => 0,
            Key::Real(_) => 1,
            Key::VarChar(_) => 2,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Real(a), Key::Real(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::VarChar(a), Key::VarChar(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Real(r) => write!(f, "{}", r),
            Key::VarChar(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}
