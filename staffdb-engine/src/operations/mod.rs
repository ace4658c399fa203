//! Store operations
//!
//! CRUD on a single database file plus scan-based queries built on top of it.

pub mod store;
pub mod query;

pub use store::{list_backups, list_databases, Store, DB_EXT};
pub use query::{delete_matching, find, find_records, update_matching, Query};
