//! Storage layer for staffdb database files
//!
//! This module handles the low-level binary format:
//! - Record encoding (fixed 53-byte slots)
//! - Slot-addressed file I/O, binary search and shifting

pub mod record;
pub mod slots;

pub use record::{Employee, RecordPatch, NAME_LEN, RECORD_SIZE};
pub use slots::{Ordinal, SlotFile};
