use std::iter;
use std::path::Path;

use tracing::debug;

use super::codec;
use super::error::{RecordError, RecordResult};
use super::page::{Slot, SlottedPage};
use super::record::RecordId;
use super::scan::{CompOp, RecordScan};
use super::value::{Attribute, find_attribute};
use crate::file::{FileHandle, PAGE_SIZE, PageNum, PagedFileManager};

/// Stores variable-length records in slotted pages
///
/// The manager holds no per-file state; every operation works on the
/// caller's [`FileHandle`] and re-reads the pages it touches.
#[derive(Debug, Default)]
pub struct RecordBasedFileManager {
    pfm: PagedFileManager,
}

impl RecordBasedFileManager {
    /// Create a new record manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record file
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<()> {
        Ok(self.pfm.create_file(path)?)
    }

    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<()> {
        Ok(self.pfm.destroy_file(path)?)
    }

    pub fn open_file<P: AsRef<Path>>(&self, path: P, handle: &mut FileHandle) -> RecordResult<()> {
        Ok(self.pfm.open_file(path, handle)?)
    }

    pub fn close_file(&self, handle: &mut FileHandle) -> RecordResult<()> {
        Ok(self.pfm.close_file(handle)?)
    }

    /// Insert a tuple and return its record id
    pub fn insert_record(
        &self,
        handle: &mut FileHandle,
        attrs: &[Attribute],
        tuple: &[u8],
    ) -> RecordResult<RecordId> {
        let packed = codec::encode(attrs, tuple)?;
        place(handle, &packed, false)
    }

    /// Read the tuple stored under `rid`
    pub fn read_record(
        &self,
        handle: &mut FileHandle,
        attrs: &[Attribute],
        rid: RecordId,
    ) -> RecordResult<Vec<u8>> {
        let packed = read_packed(handle, rid)?;
        codec::decode(attrs, &packed)
    }

    /// Read a single field as a one-field tuple buffer
    pub fn read_attribute(
        &self,
        handle: &mut FileHandle,
        attrs: &[Attribute],
        rid: RecordId,
        name: &str,
    ) -> RecordResult<Vec<u8>> {
        let index = find_attribute(attrs, name)?;
        let packed = read_packed(handle, rid)?;
        codec::project(attrs, &packed, &[index])
    }

    /// Delete the record under `rid`, freeing its slot for reuse
    pub fn delete_record(&self, handle: &mut FileHandle, rid: RecordId) -> RecordResult<()> {
        match home_slot(handle, rid)? {
            Slot::Occupied { .. } => {}
            Slot::Forwarded(target) => release_moved(handle, rid, target)?,
            Slot::Deleted { .. } | Slot::Moved { .. } => {
                return Err(RecordError::RecordNotFound(rid));
            }
        }
        modify_page(handle, rid.page_num, |page| page.remove(rid.slot_num))
    }

    /// Replace the record under `rid`; the record keeps its id
    pub fn update_record(
        &self,
        handle: &mut FileHandle,
        attrs: &[Attribute],
        tuple: &[u8],
        rid: RecordId,
    ) -> RecordResult<()> {
        let packed = codec::encode(attrs, tuple)?;

        match home_slot(handle, rid)? {
            Slot::Occupied { .. } => {
                if modify_page(handle, rid.page_num, |page| page.resize(rid.slot_num, &packed))? {
                    return Ok(());
                }
                let target = place(handle, &packed, true)?;
                modify_page(handle, rid.page_num, |page| page.forward(rid.slot_num, target))?;
                debug!(%rid, %target, "relocated record");
            }
            Slot::Forwarded(target) => {
                check_moved(handle, rid, target)?;
                if modify_page(handle, target.page_num, |page| {
                    page.resize(target.slot_num, &packed)
                })? {
                    return Ok(());
                }
                if modify_page(handle, rid.page_num, |page| page.restore(rid.slot_num, &packed))? {
                    release_moved(handle, rid, target)?;
                    debug!(%rid, from = %target, "record returned home");
                    return Ok(());
                }
                let new_target = place(handle, &packed, true)?;
                release_moved(handle, rid, target)?;
                modify_page(handle, rid.page_num, |page| page.forward(rid.slot_num, new_target))?;
                debug!(%rid, from = %target, to = %new_target, "relocated forwarded record");
            }
            Slot::Deleted { .. } | Slot::Moved { .. } => {
                return Err(RecordError::RecordNotFound(rid));
            }
        }
        Ok(())
    }

    /// Start a filtered, projecting scan over every live record
    ///
    /// `value` is a key buffer; it is ignored, and may be `None`, for
    /// [`CompOp::NoOp`].
    pub fn scan<'a>(
        &self,
        handle: &'a mut FileHandle,
        attrs: &[Attribute],
        condition_attr: &str,
        op: CompOp,
        value: Option<&[u8]>,
        projected: &[&str],
    ) -> RecordResult<RecordScan<'a>> {
        RecordScan::new(handle, attrs, condition_attr, op, value, projected)
    }
}

fn load_page(handle: &mut FileHandle, page_num: PageNum) -> RecordResult<Vec<u8>> {
    let mut buffer = vec![0u8; PAGE_SIZE];
    handle.read_page(page_num, &mut buffer)?;
    Ok(buffer)
}

/// Read a page, apply `f` and write the page back
fn modify_page<T>(
    handle: &mut FileHandle,
    page_num: PageNum,
    f: impl FnOnce(&mut SlottedPage<'_>) -> RecordResult<T>,
) -> RecordResult<T> {
    let mut buffer = load_page(handle, page_num)?;
    let result = {
        let mut page = SlottedPage::from_buffer(&mut buffer, page_num)?;
        f(&mut page)?
    };
    handle.write_page(page_num, &buffer)?;
    Ok(result)
}

/// Store packed bytes on the first page with room, appending one if needed
///
/// The last page is probed first, then the rest in ascending order.
fn place(handle: &mut FileHandle, packed: &[u8], moved: bool) -> RecordResult<RecordId> {
    let page_count = handle.page_count()?;
    let mut buffer = vec![0u8; PAGE_SIZE];

    if let Some(last) = page_count.checked_sub(1) {
        for page_num in iter::once(last).chain(0..last) {
            handle.read_page(page_num, &mut buffer)?;
            let mut page = SlottedPage::from_buffer(&mut buffer, page_num)?;
            if page.can_hold(packed.len()) {
                let slot_num = page.insert(packed, moved)?;
                handle.write_page(page_num, &buffer)?;
                return Ok(RecordId::new(page_num, slot_num));
            }
        }
    }

    let mut page = SlottedPage::init(&mut buffer, page_count)?;
    let slot_num = page.insert(packed, moved)?;
    let page_num = handle.append_page(&buffer)?;
    debug!(page_num, "appended record page");
    Ok(RecordId::new(page_num, slot_num))
}

/// Slot addressed by a caller-supplied id; bad pages and slots are not found
fn home_slot(handle: &mut FileHandle, rid: RecordId) -> RecordResult<Slot> {
    if rid.page_num >= handle.page_count()? {
        return Err(RecordError::RecordNotFound(rid));
    }
    let mut buffer = load_page(handle, rid.page_num)?;
    let page = SlottedPage::from_buffer(&mut buffer, rid.page_num)?;
    page.slot(rid.slot_num)
}

/// Packed bytes of the record whose home slot is `rid`
pub(crate) fn read_packed(handle: &mut FileHandle, rid: RecordId) -> RecordResult<Vec<u8>> {
    if rid.page_num >= handle.page_count()? {
        return Err(RecordError::RecordNotFound(rid));
    }
    let mut buffer = load_page(handle, rid.page_num)?;
    let page = SlottedPage::from_buffer(&mut buffer, rid.page_num)?;
    match page.slot(rid.slot_num)? {
        Slot::Occupied { offset, length } => Ok(page.body(offset, length)?.to_vec()),
        Slot::Forwarded(target) => read_moved(handle, rid, target),
        Slot::Deleted { .. } | Slot::Moved { .. } => Err(RecordError::RecordNotFound(rid)),
    }
}

/// Follow the single forwarding hop from `home` to `target`
pub(crate) fn read_moved(
    handle: &mut FileHandle,
    home: RecordId,
    target: RecordId,
) -> RecordResult<Vec<u8>> {
    let mut buffer = moved_page(handle, home, target)?;
    let page = SlottedPage::from_buffer(&mut buffer, target.page_num)?;
    let (offset, length) = moved_slot(&page, home, target)?;
    Ok(page.body(offset, length)?.to_vec())
}

fn moved_page(handle: &mut FileHandle, home: RecordId, target: RecordId) -> RecordResult<Vec<u8>> {
    if target.page_num >= handle.page_count()? {
        return Err(RecordError::corruption(
            home.page_num,
            format!("slot {} forwards past the end of file to {}", home.slot_num, target),
        ));
    }
    load_page(handle, target.page_num)
}

fn moved_slot(page: &SlottedPage<'_>, home: RecordId, target: RecordId) -> RecordResult<(u16, u16)> {
    match page.slot(target.slot_num) {
        Ok(Slot::Moved { offset, length }) => Ok((offset, length)),
        Ok(other) => Err(RecordError::corruption(
            home.page_num,
            format!("slot {} forwards to {} holding {:?}", home.slot_num, target, other),
        )),
        Err(RecordError::RecordNotFound(_)) => Err(RecordError::corruption(
            home.page_num,
            format!("slot {} forwards to missing slot {}", home.slot_num, target),
        )),
        Err(e) => Err(e),
    }
}

fn check_moved(handle: &mut FileHandle, home: RecordId, target: RecordId) -> RecordResult<()> {
    let mut buffer = moved_page(handle, home, target)?;
    let page = SlottedPage::from_buffer(&mut buffer, target.page_num)?;
    moved_slot(&page, home, target).map(|_| ())
}

/// Drop the relocated body that `home` forwards to
fn release_moved(handle: &mut FileHandle, home: RecordId, target: RecordId) -> RecordResult<()> {
    check_moved(handle, home, target)?;
    modify_page(handle, target.page_num, |page| page.remove(target.slot_num))
}
