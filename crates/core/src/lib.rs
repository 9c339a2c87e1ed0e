//! Core domain logic for Ledgerline: local-first expense records, the
//! pending-operation queue, and cloud sync orchestration.

pub mod errors;
pub mod secrets;
pub mod settings;
pub mod sync;
pub mod transactions;

pub use errors::{Error, Result};
