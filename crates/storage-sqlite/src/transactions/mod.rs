//! SQLite storage implementation for transactions.

pub mod model;
pub mod repository;

// Re-export for convenience
pub use model::TransactionDB;
pub use repository::TransactionRepository;

// Re-export domain model from core
pub use ledgerline_core::transactions::Transaction;
