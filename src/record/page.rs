use tracing::trace;

use super::error::{RecordError, RecordResult};
use super::record::{RecordId, SlotNum};
use crate::file::{ByteReader, ByteWriter, PAGE_SIZE, PageNum};

/// Size of one slot directory entry
pub const SLOT_SIZE: usize = 8;
/// free-slot head (2) + slot count (2) + free-space boundary (2)
pub const TRAILER_SIZE: usize = 6;
/// Largest packed record an empty page can take
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - TRAILER_SIZE - SLOT_SIZE;

const NO_FREE_SLOT: u16 = u16::MAX;

const TAG_OCCUPIED: u8 = 1;
const TAG_DELETED: u8 = 2;
const TAG_FORWARDED: u8 = 3;
const TAG_MOVED: u8 = 4;

/// One slot directory entry
///
/// Layout: `[tag u8][pad u8][u16][u32]`. Bodies store offset and length,
/// a forwarder stores the target slot and page, a deleted slot stores the
/// next entry of the free-slot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Live record addressed through this slot
    Occupied { offset: u16, length: u16 },
    /// On the free-slot list
    Deleted { next_free: SlotNum },
    /// The record's bytes live at another slot
    Forwarded(RecordId),
    /// Bytes stored on behalf of a `Forwarded` slot elsewhere
    Moved { offset: u16, length: u16 },
}

impl Slot {
    fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let (tag, short, long) = match self {
            Slot::Occupied { offset, length } => (TAG_OCCUPIED, offset, length as u32),
            Slot::Deleted { next_free } => (TAG_DELETED, next_free, 0),
            Slot::Forwarded(rid) => (TAG_FORWARDED, rid.slot_num, rid.page_num),
            Slot::Moved { offset, length } => (TAG_MOVED, offset, length as u32),
        };
        let mut bytes = [0u8; SLOT_SIZE];
        bytes[0] = tag;
        bytes[2..4].copy_from_slice(&short.to_le_bytes());
        bytes[4..8].copy_from_slice(&long.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8], page_num: PageNum) -> RecordResult<Self> {
        let tag = bytes.u8_at(0)?;
        let short = bytes.u16_at(2)?;
        let long = bytes.u32_at(4)?;
        let length = || {
            u16::try_from(long)
                .map_err(|_| RecordError::corruption(page_num, format!("slot length {}", long)))
        };
        match tag {
            TAG_OCCUPIED => Ok(Slot::Occupied {
                offset: short,
                length: length()?,
            }),
            TAG_DELETED => Ok(Slot::Deleted { next_free: short }),
            TAG_FORWARDED => Ok(Slot::Forwarded(RecordId::new(long, short))),
            TAG_MOVED => Ok(Slot::Moved {
                offset: short,
                length: length()?,
            }),
            other => Err(RecordError::corruption(
                page_num,
                format!("unknown slot tag {}", other),
            )),
        }
    }

    /// Offset and length of the bytes this slot owns on its page
    pub fn body(&self) -> Option<(u16, u16)> {
        match *self {
            Slot::Occupied { offset, length } | Slot::Moved { offset, length } => {
                Some((offset, length))
            }
            _ => None,
        }
    }

    fn with_body(self, offset: u16, length: u16) -> Self {
        match self {
            Slot::Moved { .. } => Slot::Moved { offset, length },
            _ => Slot::Occupied { offset, length },
        }
    }
}

/// Page trailer stored in the last bytes of each page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub free_head: SlotNum,
    pub slot_count: u16,
    pub boundary: u16,
}

impl Trailer {
    const OFFSET: usize = PAGE_SIZE - TRAILER_SIZE;

    fn read(buffer: &[u8]) -> RecordResult<Self> {
        Ok(Self {
            free_head: buffer.u16_at(Self::OFFSET)?,
            slot_count: buffer.u16_at(Self::OFFSET + 2)?,
            boundary: buffer.u16_at(Self::OFFSET + 4)?,
        })
    }

    fn write(&self, buffer: &mut [u8]) -> RecordResult<()> {
        buffer.put_u16(Self::OFFSET, self.free_head)?;
        buffer.put_u16(Self::OFFSET + 2, self.slot_count)?;
        buffer.put_u16(Self::OFFSET + 4, self.boundary)?;
        Ok(())
    }

    fn directory_size(&self) -> usize {
        TRAILER_SIZE + self.slot_count as usize * SLOT_SIZE
    }
}

/// Per-variant slot tallies for one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub occupied: usize,
    pub deleted: usize,
    pub forwarded: usize,
    pub moved: usize,
}

/// Slotted page view over a page buffer
///
/// Record bytes grow up from offset 0, the slot directory grows down from
/// the trailer. Bytes below the boundary are always densely packed.
pub struct SlottedPage<'a> {
    buffer: &'a mut [u8],
    page_num: PageNum,
    trailer: Trailer,
}

impl<'a> SlottedPage<'a> {
    /// Format the buffer as an empty page
    pub fn init(buffer: &'a mut [u8], page_num: PageNum) -> RecordResult<Self> {
        check_size(buffer)?;
        buffer.fill(0);
        let trailer = Trailer {
            free_head: NO_FREE_SLOT,
            slot_count: 0,
            boundary: 0,
        };
        trailer.write(buffer)?;
        Ok(Self {
            buffer,
            page_num,
            trailer,
        })
    }

    /// Wrap a page read from disk
    pub fn from_buffer(buffer: &'a mut [u8], page_num: PageNum) -> RecordResult<Self> {
        check_size(buffer)?;
        let trailer = Trailer::read(buffer)?;
        if trailer.boundary as usize + trailer.directory_size() > PAGE_SIZE {
            return Err(RecordError::corruption(
                page_num,
                format!(
                    "boundary {} overlaps a directory of {} slots",
                    trailer.boundary, trailer.slot_count
                ),
            ));
        }
        Ok(Self {
            buffer,
            page_num,
            trailer,
        })
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    pub fn slot_count(&self) -> u16 {
        self.trailer.slot_count
    }

    /// Bytes between the boundary and the slot directory
    pub fn free_space(&self) -> usize {
        PAGE_SIZE - self.trailer.directory_size() - self.trailer.boundary as usize
    }

    pub fn has_free_slot(&self) -> bool {
        self.trailer.free_head != NO_FREE_SLOT
    }

    /// Whether a new slot holding `len` bytes fits
    pub fn can_hold(&self, len: usize) -> bool {
        let slot_cost = if self.has_free_slot() { 0 } else { SLOT_SIZE };
        len + slot_cost <= self.free_space()
    }

    fn slot_offset(slot_num: SlotNum) -> usize {
        PAGE_SIZE - TRAILER_SIZE - (slot_num as usize + 1) * SLOT_SIZE
    }

    /// Read slot `slot_num`; out-of-range slots are not found
    pub fn slot(&self, slot_num: SlotNum) -> RecordResult<Slot> {
        if slot_num >= self.trailer.slot_count {
            return Err(RecordError::RecordNotFound(RecordId::new(
                self.page_num,
                slot_num,
            )));
        }
        let bytes = self.buffer.bytes_at(Self::slot_offset(slot_num), SLOT_SIZE)?;
        Slot::from_bytes(bytes, self.page_num)
    }

    fn set_slot(&mut self, slot_num: SlotNum, slot: Slot) -> RecordResult<()> {
        self.buffer
            .put_bytes(Self::slot_offset(slot_num), &slot.to_bytes())?;
        Ok(())
    }

    fn write_trailer(&mut self) -> RecordResult<()> {
        self.trailer.write(self.buffer)
    }

    /// Bytes owned by a body slot
    pub fn body(&self, offset: u16, length: u16) -> RecordResult<&[u8]> {
        if offset as usize + length as usize > self.trailer.boundary as usize {
            return Err(RecordError::corruption(
                self.page_num,
                format!(
                    "body {}+{} crosses boundary {}",
                    offset, length, self.trailer.boundary
                ),
            ));
        }
        Ok(self.buffer.bytes_at(offset as usize, length as usize)?)
    }

    /// Count slots by variant
    pub fn stats(&self) -> RecordResult<SlotStats> {
        let mut stats = SlotStats::default();
        for slot_num in 0..self.trailer.slot_count {
            match self.slot(slot_num)? {
                Slot::Occupied { .. } => stats.occupied += 1,
                Slot::Deleted { .. } => stats.deleted += 1,
                Slot::Forwarded(_) => stats.forwarded += 1,
                Slot::Moved { .. } => stats.moved += 1,
            }
        }
        Ok(stats)
    }

    /// Store `record` at the boundary under a fresh or recycled slot
    ///
    /// `moved` marks bytes held for a forwarder on another page.
    pub fn insert(&mut self, record: &[u8], moved: bool) -> RecordResult<SlotNum> {
        if !self.can_hold(record.len()) {
            return Err(RecordError::RecordTooLarge {
                size: record.len(),
                capacity: self.free_space(),
            });
        }

        let offset = self.trailer.boundary;
        let length = record.len() as u16;
        self.buffer.put_bytes(offset as usize, record)?;

        let slot_num = if self.has_free_slot() {
            let head = self.trailer.free_head;
            match self.slot(head)? {
                Slot::Deleted { next_free } => self.trailer.free_head = next_free,
                other => {
                    return Err(RecordError::corruption(
                        self.page_num,
                        format!("free-list slot {} is {:?}", head, other),
                    ));
                }
            }
            head
        } else {
            let next = self.trailer.slot_count;
            self.trailer.slot_count += 1;
            next
        };

        let slot = if moved {
            Slot::Moved { offset, length }
        } else {
            Slot::Occupied { offset, length }
        };
        self.set_slot(slot_num, slot)?;
        self.trailer.boundary += length;
        self.write_trailer()?;
        Ok(slot_num)
    }

    /// Shift every other body starting at or past `from` by `delta` bytes
    fn shift_bodies(&mut self, skip: SlotNum, from: u16, delta: isize) -> RecordResult<()> {
        for slot_num in 0..self.trailer.slot_count {
            if slot_num == skip {
                continue;
            }
            let slot = self.slot(slot_num)?;
            if let Some((offset, length)) = slot.body()
                && offset >= from
            {
                let shifted = (offset as isize + delta) as u16;
                self.set_slot(slot_num, slot.with_body(shifted, length))?;
            }
        }
        Ok(())
    }

    /// Close the hole left by a body and pull later bodies down
    fn compact(&mut self, skip: SlotNum, offset: u16, length: u16) -> RecordResult<()> {
        let end = offset + length;
        self.buffer.move_bytes(
            end as usize..self.trailer.boundary as usize,
            offset as usize,
        )?;
        self.shift_bodies(skip, end, -(length as isize))?;
        self.trailer.boundary -= length;
        Ok(())
    }

    /// Release a slot and push it on the free-slot list
    ///
    /// Body slots give their bytes back; a forwarder only frees its entry.
    pub fn remove(&mut self, slot_num: SlotNum) -> RecordResult<()> {
        match self.slot(slot_num)? {
            Slot::Occupied { offset, length } | Slot::Moved { offset, length } => {
                self.compact(slot_num, offset, length)?;
            }
            Slot::Forwarded(_) => {}
            Slot::Deleted { .. } => {
                return Err(RecordError::RecordNotFound(RecordId::new(
                    self.page_num,
                    slot_num,
                )));
            }
        }
        self.set_slot(
            slot_num,
            Slot::Deleted {
                next_free: self.trailer.free_head,
            },
        )?;
        self.trailer.free_head = slot_num;
        self.write_trailer()
    }

    /// Replace a body in place; `Ok(false)` when the page lacks room
    pub fn resize(&mut self, slot_num: SlotNum, record: &[u8]) -> RecordResult<bool> {
        let slot = self.slot(slot_num)?;
        let Some((offset, length)) = slot.body() else {
            return Err(RecordError::corruption(
                self.page_num,
                format!("slot {} has no body to resize", slot_num),
            ));
        };
        if self.free_space() + (length as usize) < record.len() {
            return Ok(false);
        }

        let new_length = record.len() as u16;
        let old_end = offset + length;
        self.buffer.move_bytes(
            old_end as usize..self.trailer.boundary as usize,
            (offset + new_length) as usize,
        )?;
        let delta = new_length as isize - length as isize;
        self.shift_bodies(slot_num, old_end, delta)?;
        self.buffer.put_bytes(offset as usize, record)?;
        self.set_slot(slot_num, slot.with_body(offset, new_length))?;
        self.trailer.boundary = (self.trailer.boundary as isize + delta) as u16;
        self.write_trailer()?;
        Ok(true)
    }

    /// Point a home slot at `target`, releasing any body it held
    pub fn forward(&mut self, slot_num: SlotNum, target: RecordId) -> RecordResult<()> {
        match self.slot(slot_num)? {
            Slot::Occupied { offset, length } => self.compact(slot_num, offset, length)?,
            Slot::Forwarded(_) => {}
            other => {
                return Err(RecordError::corruption(
                    self.page_num,
                    format!("cannot forward slot {} in state {:?}", slot_num, other),
                ));
            }
        }
        trace!(page = self.page_num, slot = slot_num, %target, "forward slot");
        self.set_slot(slot_num, Slot::Forwarded(target))?;
        self.write_trailer()
    }

    /// Bring a forwarded record back into its home slot; `Ok(false)` if it does not fit
    pub fn restore(&mut self, slot_num: SlotNum, record: &[u8]) -> RecordResult<bool> {
        if !matches!(self.slot(slot_num)?, Slot::Forwarded(_)) {
            return Err(RecordError::corruption(
                self.page_num,
                format!("slot {} is not forwarded", slot_num),
            ));
        }
        if record.len() > self.free_space() {
            return Ok(false);
        }

        let offset = self.trailer.boundary;
        let length = record.len() as u16;
        self.buffer.put_bytes(offset as usize, record)?;
        self.set_slot(slot_num, Slot::Occupied { offset, length })?;
        self.trailer.boundary += length;
        self.write_trailer()?;
        Ok(true)
    }
}

fn check_size(buffer: &[u8]) -> RecordResult<()> {
    if buffer.len() != PAGE_SIZE {
        return Err(crate::file::FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: buffer.len(),
        }
        .into());
    }
    Ok(())
}
