//! Transaction repository.
//!
//! Every mutation runs on the write actor and writes its sync queue
//! entry in the same transaction as the record change.

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use ledgerline_core::errors::{Error, Result};
use ledgerline_core::sync::SyncStatus;
use ledgerline_core::transactions::{
    is_temp_transaction_id, temp_transaction_id, NewTransaction, Transaction, TransactionPayload,
    TransactionRepositoryTrait, TransactionUpdate,
};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::transactions;
use crate::sync::{
    cancel_operations_for_transaction, enum_to_db, queue_delete_operation, queue_update_operation,
    write_outbox_operation, OutboxWriteRequest,
};

use super::model::TransactionDB;

use async_trait::async_trait;

pub struct TransactionRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl TransactionRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        TransactionRepository { pool, writer }
    }
}

#[async_trait]
impl TransactionRepositoryTrait for TransactionRepository {
    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = transactions::table
            .order((
                transactions::txn_date.desc(),
                transactions::created_at.desc(),
            ))
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(TransactionDB::into_transaction)
            .collect()
    }

    fn get_transaction(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        let row = transactions::table
            .find(transaction_id)
            .first::<TransactionDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(TransactionDB::into_transaction).transpose()
    }

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Transaction> {
                let now = Utc::now().to_rfc3339();
                let row = TransactionDB {
                    id: temp_transaction_id(),
                    amount: new_transaction.amount.to_string(),
                    category: new_transaction.category,
                    txn_date: new_transaction.txn_date,
                    notes: new_transaction.notes,
                    payment_method: new_transaction.payment_method,
                    sync_status: enum_to_db(&SyncStatus::Pending)?,
                    created_at: now.clone(),
                    updated_at: now,
                };

                let inserted = diesel::insert_into(transactions::table)
                    .values(&row)
                    .returning(TransactionDB::as_returning())
                    .get_result::<TransactionDB>(conn)
                    .map_err(StorageError::from)?;

                let transaction = inserted.into_transaction()?;
                write_outbox_operation(
                    conn,
                    OutboxWriteRequest::create(
                        transaction.id.clone(),
                        TransactionPayload::from(&transaction),
                    ),
                )?;
                Ok(transaction)
            })
            .await
    }

    async fn update_transaction(
        &self,
        transaction_id: String,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Transaction> {
                let Some(mut row) = transactions::table
                    .find(&transaction_id)
                    .first::<TransactionDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                else {
                    return Err(Error::not_found(format!(
                        "Transaction {} not found",
                        transaction_id
                    )));
                };

                if let Some(amount) = update.amount {
                    row.amount = amount.to_string();
                }
                if let Some(category) = update.category {
                    row.category = category;
                }
                if let Some(txn_date) = update.txn_date {
                    row.txn_date = txn_date;
                }
                if update.notes.is_some() {
                    row.notes = update.notes;
                }
                if update.payment_method.is_some() {
                    row.payment_method = update.payment_method;
                }
                row.sync_status = enum_to_db(&SyncStatus::Pending)?;
                row.updated_at = Utc::now().to_rfc3339();

                let saved = diesel::update(transactions::table.find(&transaction_id))
                    .set(&row)
                    .returning(TransactionDB::as_returning())
                    .get_result::<TransactionDB>(conn)
                    .map_err(StorageError::from)?;

                let transaction = saved.into_transaction()?;
                queue_update_operation(
                    conn,
                    &transaction.id,
                    &TransactionPayload::from(&transaction),
                )?;
                Ok(transaction)
            })
            .await
    }

    async fn delete_transaction(&self, transaction_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let affected = diesel::delete(transactions::table.find(&transaction_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                if affected > 0 {
                    if is_temp_transaction_id(&transaction_id) {
                        // Never reached the remote store, so there is
                        // nothing to delete remotely either.
                        cancel_operations_for_transaction(conn, &transaction_id)?;
                    } else {
                        queue_delete_operation(conn, &transaction_id)?;
                    }
                }
                Ok(affected)
            })
            .await
    }
}
