mod bytes;
mod error;
mod file_manager;

pub use bytes::{ByteReader, ByteWriter};
pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, PageCounters, PagedFileManager};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Zero-based page number within a paged file
pub type PageNum = u32;
