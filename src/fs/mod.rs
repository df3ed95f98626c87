//! Filesystem helpers shared by the persistent queue and the file store.

pub mod locking;

pub use locking::{locked_read, locked_update, locked_write};
