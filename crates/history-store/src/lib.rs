//! Durable, bounded history of completed signal cycles.

pub mod db;
pub mod store;

pub use db::HistoryDb;
pub use store::{HistoryStore, DEFAULT_RETENTION};
