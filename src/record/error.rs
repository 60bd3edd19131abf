use crate::file::FileError;
use thiserror::Error;

use super::record::RecordId;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Record of {size} bytes exceeds page capacity of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("Malformed tuple: {0}")]
    MalformedTuple(String),

    #[error("Unknown attribute type code: {0}")]
    UnknownType(u32),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Corrupted record: {0}")]
    CorruptRecord(String),

    #[error("Corrupted page {page_num}: {reason}")]
    Corruption { page_num: u32, reason: String },
}

impl RecordError {
    pub(crate) fn corruption(page_num: u32, reason: impl Into<String>) -> Self {
        RecordError::Corruption {
            page_num,
            reason: reason.into(),
        }
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
