pub mod file;
pub mod index;
pub mod record;

pub use file::{FileHandle, PAGE_SIZE, PageCounters, PagedFileManager};
pub use index::{IndexError, IndexManager, IndexResult, IndexScan, Key, TreeDump};
pub use record::{
    AttrType, Attribute, CompOp, RecordBasedFileManager, RecordError, RecordId, RecordResult,
    RecordScan, Value, decode_values, encode_values,
};
