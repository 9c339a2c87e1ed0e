//! SQLite persistence for ledgerline.
//!
//! Reads go through an r2d2 pool; writes are serialized through a
//! single write actor so every mutation and its sync queue entry share
//! one transaction.

pub mod db;
pub mod errors;
pub mod schema;
pub mod settings;
pub mod sync;
pub mod transactions;

pub use db::{create_pool, get_connection, init, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;
