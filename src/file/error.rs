use std::io;
use thiserror::Error;

use super::PageNum;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File handle is already bound to {0}")]
    HandleAlreadyOpen(String),

    #[error("File handle is not open")]
    HandleNotOpen,

    #[error("Page not found: page_num={page_num}, page_count={page_count}")]
    PageNotFound { page_num: PageNum, page_count: PageNum },

    #[error("Short {op} on page {page_num}: fewer than {expected} bytes transferred")]
    ShortIo {
        op: &'static str,
        page_num: PageNum,
        expected: usize,
    },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Out of bounds access: offset={offset}, len={len}, buffer size={size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
}

pub type FileResult<T> = Result<T, FileError>;
