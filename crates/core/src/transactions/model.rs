//! Transaction domain models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncStatus;

/// Prefix carried by locally generated identifiers until the remote
/// store assigns a durable one.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Generate a placeholder identifier for a record created offline.
pub fn temp_transaction_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::now_v7())
}

/// Whether an identifier is a local placeholder, i.e. the record has
/// never been acknowledged by the remote store.
pub fn is_temp_transaction_id(transaction_id: &str) -> bool {
    transaction_id.starts_with(TEMP_ID_PREFIX)
}

/// A financial transaction in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub amount: Decimal,
    pub category: String,
    /// ISO-8601 date (`YYYY-MM-DD`).
    pub txn_date: String,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub sync_status: SyncStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub amount: Decimal,
    pub category: String,
    pub txn_date: String,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub txn_date: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
}

/// The client payload shipped to the remote store for creates and
/// updates. Identifiers and sync bookkeeping stay local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub amount: Decimal,
    pub category: String,
    pub txn_date: String,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
}

impl From<&Transaction> for TransactionPayload {
    fn from(transaction: &Transaction) -> Self {
        TransactionPayload {
            amount: transaction.amount,
            category: transaction.category.clone(),
            txn_date: transaction.txn_date.clone(),
            notes: transaction.notes.clone(),
            payment_method: transaction.payment_method.clone(),
        }
    }
}
