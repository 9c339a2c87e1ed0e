//! Response types for the cloud transactions API.

use serde::{Deserialize, Serialize};

/// Response from creating a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreatedResponse {
    /// Durable identifier assigned by the remote store.
    pub id: String,
    pub created_at: String,
}

/// Generic success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response envelope from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
}
