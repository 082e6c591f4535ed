//! Orgscout storage crate - SQLite turn log and short-term conversation memory.
//!
//! Provides a WAL-mode SQLite database with migrations, the turn repository
//! backing the persistence sink, and the time-bounded per-conversation
//! memory consulted by the classifier.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use memory::MemoryStore;
pub use repository::TurnRepository;
