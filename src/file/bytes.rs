//! Bounds-checked little-endian access to page buffers.
//!
//! Every page layout in the crate (slot directories, trailers, B+ tree
//! nodes) goes through these helpers, so a corrupt offset surfaces as
//! [`FileError::OutOfBounds`] instead of a panic.

use std::ops::Range;

use super::error::{FileError, FileResult};

fn check(offset: usize, len: usize, size: usize) -> FileResult<Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(FileError::OutOfBounds { offset, len, size }),
    }
}

/// Checked reads from a byte buffer
pub trait ByteReader {
    fn bytes_at(&self, offset: usize, len: usize) -> FileResult<&[u8]>;

    fn array_at<const N: usize>(&self, offset: usize) -> FileResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes_at(offset, N)?);
        Ok(out)
    }

    fn u8_at(&self, offset: usize) -> FileResult<u8> {
        Ok(self.array_at::<1>(offset)?[0])
    }

    fn u16_at(&self, offset: usize) -> FileResult<u16> {
        self.array_at(offset).map(u16::from_le_bytes)
    }

    fn u32_at(&self, offset: usize) -> FileResult<u32> {
        self.array_at(offset).map(u32::from_le_bytes)
    }

    fn i32_at(&self, offset: usize) -> FileResult<i32> {
        self.array_at(offset).map(i32::from_le_bytes)
    }

    fn f32_at(&self, offset: usize) -> FileResult<f32> {
        self.array_at(offset).map(f32::from_le_bytes)
    }
}

/// Checked writes into a byte buffer
pub trait ByteWriter {
    fn bytes_at_mut(&mut self, offset: usize, len: usize) -> FileResult<&mut [u8]>;

    /// `memmove` of `src` to start at `dest`; both ranges must lie in the buffer
    fn move_bytes(&mut self, src: Range<usize>, dest: usize) -> FileResult<()>;

    fn put_bytes(&mut self, offset: usize, bytes: &[u8]) -> FileResult<()> {
        self.bytes_at_mut(offset, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    fn put_u8(&mut self, offset: usize, value: u8) -> FileResult<()> {
        self.put_bytes(offset, &[value])
    }

    fn put_u16(&mut self, offset: usize, value: u16) -> FileResult<()> {
        self.put_bytes(offset, &value.to_le_bytes())
    }

    fn put_u32(&mut self, offset: usize, value: u32) -> FileResult<()> {
        self.put_bytes(offset, &value.to_le_bytes())
    }

    fn put_i32(&mut self, offset: usize, value: i32) -> FileResult<()> {
        self.put_bytes(offset, &value.to_le_bytes())
    }

    fn put_f32(&mut self, offset: usize, value: f32) -> FileResult<()> {
        self.put_bytes(offset, &value.to_le_bytes())
    }
}

impl ByteReader for [u8] {
    fn bytes_at(&self, offset: usize, len: usize) -> FileResult<&[u8]> {
        let range = check(offset, len, self.len())?;
        Ok(&self[range])
    }
}

impl ByteWriter for [u8] {
    fn bytes_at_mut(&mut self, offset: usize, len: usize) -> FileResult<&mut [u8]> {
        let range = check(offset, len, self.len())?;
        Ok(&mut self[range])
    }

    fn move_bytes(&mut self, src: Range<usize>, dest: usize) -> FileResult<()> {
        let len = src.end.saturating_sub(src.start);
        if src.start > src.end {
            return Err(FileError::OutOfBounds {
                offset: src.start,
                len: 0,
                size: self.len(),
            });
        }
        check(src.start, len, self.len())?;
        check(dest, len, self.len())?;
        self.copy_within(src, dest);
        Ok(())
    }
}
