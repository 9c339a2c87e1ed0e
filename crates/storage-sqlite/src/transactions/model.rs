//! Database model for the transactions table.
//!
//! Amounts are stored as decimal strings to keep SQLite from rounding
//! them through floats.

use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use ledgerline_core::errors::{Error, Result};
use ledgerline_core::transactions::Transaction;

use crate::sync::enum_from_db;

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(id))]
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TransactionDB {
    pub id: String,
    pub amount: String,
    pub category: String,
    pub txn_date: String,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub sync_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TransactionDB {
    pub fn into_transaction(self) -> Result<Transaction> {
        let amount = Decimal::from_str(&self.amount).map_err(|e| {
            Error::Unexpected(format!(
                "Invalid amount {:?} on transaction {}: {}",
                self.amount, self.id, e
            ))
        })?;
        Ok(Transaction {
            id: self.id,
            amount,
            category: self.category,
            txn_date: self.txn_date,
            notes: self.notes,
            payment_method: self.payment_method,
            sync_status: enum_from_db(&self.sync_status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
