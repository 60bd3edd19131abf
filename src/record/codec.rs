//! Conversion between tuple buffers and the packed on-page record format.
//!
//! A tuple buffer is `[null bitmap][non-null field values]` where each
//! VarChar carries a 4-byte length prefix. A packed record is
//! `[null bitmap][u16 end offset per field][field values]`: the offset
//! directory gives O(1) access to any field and VarChar lengths fall out
//! of neighbouring offsets, so the prefix is dropped.

use std::cmp::Ordering;

use super::error::{RecordError, RecordResult};
use super::page::MAX_RECORD_SIZE;
use super::value::{AttrType, Attribute};
use crate::file::{ByteReader, ByteWriter};

pub const FIELD_OFFSET_SIZE: usize = 2;
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bytes needed for a null bitmap covering `field_count` fields
pub fn null_bitmap_size(field_count: usize) -> usize {
    field_count.div_ceil(8)
}

/// Bit `index` MSB-first within byte `index / 8`
pub fn is_null(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
}

pub fn set_null(bitmap: &mut [u8], index: usize) {
    if let Some(byte) = bitmap.get_mut(index / 8) {
        *byte |= 0x80 >> (index % 8);
    }
}

/// Type-directed comparison of two stored field values (VarChar without prefix)
///
/// Reals fall back to the IEEE total order when either side is NaN.
pub fn compare_field(attr_type: AttrType, a: &[u8], b: &[u8]) -> Ordering {
    match attr_type {
        AttrType::Int => match (a.i32_at(0), b.i32_at(0)) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        },
        AttrType::Real => match (a.f32_at(0), b.f32_at(0)) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y)),
            _ => a.cmp(b),
        },
        AttrType::VarChar => a.cmp(b),
    }
}

/// Strip a key buffer down to its stored bytes (VarChar loses its prefix)
pub fn key_value(attr_type: AttrType, key: &[u8]) -> RecordResult<&[u8]> {
    let malformed = || {
        RecordError::MalformedTuple(format!("{} byte key is not a valid {:?}", key.len(), attr_type))
    };
    match attr_type {
        AttrType::Int | AttrType::Real if key.len() == 4 => Ok(key),
        AttrType::VarChar => {
            let len = key.u32_at(0).map_err(|_| malformed())? as usize;
            if key.len() != LENGTH_PREFIX_SIZE + len {
                return Err(malformed());
            }
            Ok(&key[LENGTH_PREFIX_SIZE..])
        }
        _ => Err(malformed()),
    }
}

/// Split one non-null tuple-buffer field into its stored bytes, advancing `cursor`
pub(crate) fn take_tuple_field<'a>(
    attr: &Attribute,
    tuple: &'a [u8],
    cursor: &mut usize,
) -> RecordResult<&'a [u8]> {
    let truncated = |_| RecordError::MalformedTuple(format!("Field '{}' is truncated", attr.name));
    let value = match attr.attr_type {
        AttrType::Int | AttrType::Real => {
            let value = tuple.bytes_at(*cursor, 4).map_err(truncated)?;
            *cursor += 4;
            value
        }
        AttrType::VarChar => {
            let len = tuple.u32_at(*cursor).map_err(truncated)? as usize;
            if len > attr.length as usize {
                return Err(RecordError::MalformedTuple(format!(
                    "Field '{}' has {} bytes, declared length is {}",
                    attr.name, len, attr.length
                )));
            }
            let value = tuple
                .bytes_at(*cursor + LENGTH_PREFIX_SIZE, len)
                .map_err(truncated)?;
            *cursor += LENGTH_PREFIX_SIZE + len;
            value
        }
    };
    Ok(value)
}

/// Append a stored field value to a tuple buffer, restoring the VarChar prefix
pub(crate) fn push_tuple_field(attr_type: AttrType, value: &[u8], out: &mut Vec<u8>) {
    if attr_type == AttrType::VarChar {
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(value);
}

/// Pack a tuple buffer into the on-page record format
pub fn encode(attrs: &[Attribute], tuple: &[u8]) -> RecordResult<Vec<u8>> {
    let bitmap_size = null_bitmap_size(attrs.len());
    let bitmap = tuple
        .bytes_at(0, bitmap_size)
        .map_err(|_| RecordError::MalformedTuple("Truncated null bitmap".to_string()))?;

    let values_start = bitmap_size + attrs.len() * FIELD_OFFSET_SIZE;
    let mut packed = Vec::with_capacity(values_start + tuple.len());
    packed.extend_from_slice(bitmap);
    packed.resize(values_start, 0);

    let mut cursor = bitmap_size;
    for (index, attr) in attrs.iter().enumerate() {
        if !is_null(bitmap, index) {
            let value = take_tuple_field(attr, tuple, &mut cursor)?;
            packed.extend_from_slice(value);
        }
        let end = u16::try_from(packed.len() - values_start).map_err(|_| {
            RecordError::RecordTooLarge {
                size: packed.len(),
                capacity: MAX_RECORD_SIZE,
            }
        })?;
        packed.put_u16(bitmap_size + index * FIELD_OFFSET_SIZE, end)?;
    }

    if cursor != tuple.len() {
        return Err(RecordError::MalformedTuple(format!(
            "{} trailing bytes after last field",
            tuple.len() - cursor
        )));
    }
    if packed.len() > MAX_RECORD_SIZE {
        return Err(RecordError::RecordTooLarge {
            size: packed.len(),
            capacity: MAX_RECORD_SIZE,
        });
    }
    Ok(packed)
}

/// Stored bytes of field `index`, or `None` when the field is null
pub fn field<'a>(attrs: &[Attribute], packed: &'a [u8], index: usize) -> RecordResult<Option<&'a [u8]>> {
    let attr = attrs.get(index).ok_or_else(|| {
        RecordError::MalformedTuple(format!("Field {} of {} does not exist", index, attrs.len()))
    })?;
    let corrupt = |_| RecordError::CorruptRecord(format!("Field {} lies outside the record", index));
    let bitmap_size = null_bitmap_size(attrs.len());
    let bitmap = packed.bytes_at(0, bitmap_size).map_err(corrupt)?;
    if is_null(bitmap, index) {
        return Ok(None);
    }

    let start = match index {
        0 => 0,
        _ => packed
            .u16_at(bitmap_size + (index - 1) * FIELD_OFFSET_SIZE)
            .map_err(corrupt)? as usize,
    };
    let end = packed
        .u16_at(bitmap_size + index * FIELD_OFFSET_SIZE)
        .map_err(corrupt)? as usize;
    if end < start {
        return Err(RecordError::CorruptRecord(format!(
            "Field {} ends at {} before it starts at {}",
            index, end, start
        )));
    }

    let values_start = bitmap_size + attrs.len() * FIELD_OFFSET_SIZE;
    let value = packed
        .bytes_at(values_start + start, end - start)
        .map_err(corrupt)?;
    let fixed = matches!(attr.attr_type, AttrType::Int | AttrType::Real);
    if fixed && value.len() != 4 {
        return Err(RecordError::CorruptRecord(format!(
            "Field {} has {} bytes, expected 4",
            index,
            value.len()
        )));
    }
    Ok(Some(value))
}

/// Unpack a stored record back into a tuple buffer
pub fn decode(attrs: &[Attribute], packed: &[u8]) -> RecordResult<Vec<u8>> {
    let all: Vec<usize> = (0..attrs.len()).collect();
    project(attrs, packed, &all)
}

/// Build a tuple buffer holding only the fields at `indices`, in that order
pub fn project(attrs: &[Attribute], packed: &[u8], indices: &[usize]) -> RecordResult<Vec<u8>> {
    let bitmap_size = null_bitmap_size(indices.len());
    let mut tuple = vec![0u8; bitmap_size];
    for (position, &index) in indices.iter().enumerate() {
        match field(attrs, packed, index)? {
            Some(value) => push_tuple_field(attrs[index].attr_type, value, &mut tuple),
            None => set_null(&mut tuple[..bitmap_size], position),
        }
    }
    Ok(tuple)
}
