//! staffdb engine - sorted fixed-width employee record files
//!
//! This crate provides the storage engine behind staffdb: the binary record
//! codec, the on-disk sorted slot file with binary-search lookup and
//! shift-based insert/delete, scan queries, and CSV backup/restore.

pub mod error;
pub mod storage;
pub mod operations;
pub mod exchange;

pub use error::{ErrorKind, StoreError, StoreResult};
pub use operations::{Query, Store};
pub use storage::{Employee, Ordinal, RecordPatch};
