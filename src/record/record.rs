use std::fmt;

use serde::{Deserialize, Serialize};

use crate::file::PageNum;

/// Slot identifier within a page
pub type SlotNum = u16;

/// Physical identifier for a record (page + slot)
///
/// A record keeps its identifier for its whole lifetime, even when an
/// update relocates its bytes to another page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub page_num: PageNum,
    pub slot_num: SlotNum,
}

impl RecordId {
    pub fn new(page_num: PageNum, slot_num: SlotNum) -> Self {
        Self { page_num, slot_num }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.page_num, self.slot_num)
    }
}
