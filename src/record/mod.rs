//! Record management: tuple codec, slotted pages and record files

pub mod codec;
mod error;
pub mod page;
mod record;
mod record_file;
mod scan;
mod value;

pub use error::{RecordError, RecordResult};
pub use page::{MAX_RECORD_SIZE, Slot, SlotStats, SlottedPage};
pub use record::{RecordId, SlotNum};
pub use record_file::RecordBasedFileManager;
pub use scan::{CompOp, RecordScan};
pub use value::{AttrType, Attribute, Value, decode_values, encode_values, find_attribute};
