//! Error kinds and error handling
//!
//! Every engine operation returns either a value or a `StoreError`. Nothing is
//! logged-and-ignored internally; callers decide what to do with a failure.
//! `ErrorKind` flattens the error into the small set of categories front ends
//! care about, each with a stable numeric code. Codes start at 3 so they
//! never collide with the usage-error status of the command-line parser.

use thiserror::Error;

/// Error categories surfaced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    /// Open/seek/read/write/stat/flush failure
    Io = 3,
    /// Record buffer of the wrong size or file length not a multiple of the slot size
    Format = 4,
    /// Insert with an id that is already stored
    DuplicateKey = 5,
    /// Lookup, update or delete of an absent id (or a stale ordinal)
    NotFound = 6,
    /// Malformed value in interchange input
    Parse = 7,
}

impl ErrorKind {
    /// Get the raw code value
    pub fn as_raw(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_raw(), match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::Format => "Format error",
            ErrorKind::DuplicateKey => "Duplicate key",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Parse => "Parse error",
        })
    }
}

/// Main error type for the staffdb engine
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    Format(String),

    #[error("Record with id {id} already exists")]
    DuplicateKey { id: i32 },

    #[error("Record with id {id} not found")]
    NotFound { id: i32 },

    #[error("Ordinal {ordinal} out of range (file holds {count} records)")]
    OrdinalOutOfRange { ordinal: usize, count: usize },

    #[error("Line {line}: invalid {field}: {message}")]
    Parse {
        line: u64,
        field: &'static str,
        message: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl StoreError {
    /// Get the error category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io(_) => ErrorKind::Io,
            StoreError::Format(_) => ErrorKind::Format,
            StoreError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            StoreError::NotFound { .. } | StoreError::OrdinalOutOfRange { .. } => {
                ErrorKind::NotFound
            }
            StoreError::Parse { .. } => ErrorKind::Parse,
            StoreError::Csv(e) if e.is_io_error() => ErrorKind::Io,
            StoreError::Csv(_) => ErrorKind::Parse,
            StoreError::Xlsx(_) => ErrorKind::Io,
        }
    }
}

/// Result type for engine operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        let codes: Vec<u8> = [
            ErrorKind::Io,
            ErrorKind::Format,
            ErrorKind::DuplicateKey,
            ErrorKind::NotFound,
            ErrorKind::Parse,
        ]
        .iter()
        .map(ErrorKind::as_raw)
        .collect();
        assert_eq!(codes, vec![3, 4, 5, 6, 7]);
        // 1 is the generic failure status, 2 the argument-parser usage error
        assert!(codes.iter().all(|&code| code > 2));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(StoreError::DuplicateKey { id: 5 }.kind(), ErrorKind::DuplicateKey);
        assert_eq!(StoreError::NotFound { id: 4 }.kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::OrdinalOutOfRange { ordinal: 9, count: 3 }.kind(),
            ErrorKind::NotFound
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(StoreError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_display() {
        let err = StoreError::NotFound { id: 42 };
        assert_eq!(err.to_string(), "Record with id 42 not found");
        assert_eq!(ErrorKind::DuplicateKey.to_string(), "5 (Duplicate key)");
    }
}
