use thiserror::Error;

use crate::file::{FileError, PageNum};
use crate::record::RecordId;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Entry not found: key={key} rid={rid}")]
    EntryNotFound { key: String, rid: RecordId },

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Key of {size} bytes exceeds the {max} byte limit")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Corrupted node at page {page_num}: {reason}")]
    Corruption { page_num: PageNum, reason: String },
}

impl IndexError {
    pub(crate) fn corruption(page_num: PageNum, reason: impl Into<String>) -> Self {
        IndexError::Corruption {
            page_num,
            reason: reason.into(),
        }
    }
}
