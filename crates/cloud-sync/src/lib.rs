//! HTTP client for the ledgerline cloud API.
//!
//! Implements the core `RemoteTransactionStore` trait over the REST
//! endpoints, with errors classified for the sync retry policy.

pub mod client;
pub mod error;
pub mod types;

pub use client::{api_base_url_from_env, CloudSyncClient, DEFAULT_API_BASE_URL};
pub use error::{CloudSyncError, Result};
pub use types::{ApiErrorResponse, SuccessResponse, TransactionCreatedResponse};
