use std::cmp::Ordering;

use super::codec;
use super::error::{RecordError, RecordResult};
use super::page::{Slot, SlottedPage};
use super::record::{RecordId, SlotNum};
use super::record_file::read_moved;
use super::value::{Attribute, find_attribute};
use crate::file::{FileHandle, PAGE_SIZE, PageNum};

/// Comparison applied between a record field and the scan value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    NoOp,
}

impl CompOp {
    /// Whether `field.cmp(value) == ordering` satisfies this operator
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CompOp::Eq => ordering == Ordering::Equal,
            CompOp::Lt => ordering == Ordering::Less,
            CompOp::Le => ordering != Ordering::Greater,
            CompOp::Gt => ordering == Ordering::Greater,
            CompOp::Ge => ordering != Ordering::Less,
            CompOp::Ne => ordering != Ordering::Equal,
            CompOp::NoOp => true,
        }
    }
}

struct Condition {
    index: usize,
    op: CompOp,
    value: Vec<u8>,
}

/// Lazy scan over a record file yielding `(rid, projected tuple)`
///
/// Pages are visited in ascending order and slots in ascending order
/// within a page. A relocated record is reported once, under its home id.
pub struct RecordScan<'a> {
    handle: &'a mut FileHandle,
    attrs: Vec<Attribute>,
    condition: Option<Condition>,
    projection: Vec<usize>,
    page_count: PageNum,
    page_num: PageNum,
    slot_num: SlotNum,
    slot_count: SlotNum,
    buffer: Vec<u8>,
    loaded: bool,
    done: bool,
}

impl<'a> RecordScan<'a> {
    pub(crate) fn new(
        handle: &'a mut FileHandle,
        attrs: &[Attribute],
        condition_attr: &str,
        op: CompOp,
        value: Option<&[u8]>,
        projected: &[&str],
    ) -> RecordResult<Self> {
        let projection = projected
            .iter()
            .map(|name| find_attribute(attrs, name))
            .collect::<RecordResult<Vec<_>>>()?;

        let condition = match op {
            CompOp::NoOp => None,
            _ => {
                let index = find_attribute(attrs, condition_attr)?;
                let key = value.ok_or_else(|| {
                    RecordError::MalformedTuple(format!(
                        "{:?} on '{}' needs a comparison value",
                        op, condition_attr
                    ))
                })?;
                let value = codec::key_value(attrs[index].attr_type, key)?.to_vec();
                Some(Condition { index, op, value })
            }
        };

        let page_count = handle.page_count()?;
        Ok(Self {
            handle,
            attrs: attrs.to_vec(),
            condition,
            projection,
            page_count,
            page_num: 0,
            slot_num: 0,
            slot_count: 0,
            buffer: vec![0u8; PAGE_SIZE],
            loaded: false,
            done: false,
        })
    }

    fn load_current_page(&mut self) -> RecordResult<()> {
        self.handle.read_page(self.page_num, &mut self.buffer)?;
        let page = SlottedPage::from_buffer(&mut self.buffer, self.page_num)?;
        self.slot_count = page.slot_count();
        self.slot_num = 0;
        self.loaded = true;
        Ok(())
    }

    /// Packed bytes reachable from a home slot, if it holds a live record
    fn live_record(&mut self, slot_num: SlotNum) -> RecordResult<Option<Vec<u8>>> {
        let page = SlottedPage::from_buffer(&mut self.buffer, self.page_num)?;
        match page.slot(slot_num)? {
            Slot::Occupied { offset, length } => Ok(Some(page.body(offset, length)?.to_vec())),
            Slot::Forwarded(target) => {
                let home = RecordId::new(self.page_num, slot_num);
                read_moved(self.handle, home, target).map(Some)
            }
            Slot::Deleted { .. } | Slot::Moved { .. } => Ok(None),
        }
    }

    fn matches(&self, packed: &[u8]) -> RecordResult<bool> {
        let Some(condition) = &self.condition else {
            return Ok(true);
        };
        let attr_type = self.attrs[condition.index].attr_type;
        Ok(match codec::field(&self.attrs, packed, condition.index)? {
            Some(field) => condition
                .op
                .accepts(codec::compare_field(attr_type, field, &condition.value)),
            None => false,
        })
    }

    fn advance(&mut self) -> RecordResult<Option<(RecordId, Vec<u8>)>> {
        while self.page_num < self.page_count {
            if !self.loaded {
                self.load_current_page()?;
            }
            if self.slot_num >= self.slot_count {
                self.page_num += 1;
                self.loaded = false;
                continue;
            }

            let slot_num = self.slot_num;
            self.slot_num += 1;
            if let Some(packed) = self.live_record(slot_num)?
                && self.matches(&packed)?
            {
                let tuple = codec::project(&self.attrs, &packed, &self.projection)?;
                return Ok(Some((RecordId::new(self.page_num, slot_num), tuple)));
            }
        }
        Ok(None)
    }
}

impl Iterator for RecordScan<'_> {
    type Item = RecordResult<(RecordId, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
