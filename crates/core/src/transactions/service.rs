//! Transaction service: validation in front of the repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;

use crate::errors::{Error, Result};

use super::model::{NewTransaction, Transaction, TransactionUpdate};

/// Storage seam for transactions. Implementations persist the record
/// and its queued sync operation atomically.
#[async_trait]
pub trait TransactionRepositoryTrait: Send + Sync {
    fn list_transactions(&self) -> Result<Vec<Transaction>>;
    fn get_transaction(&self, transaction_id: &str) -> Result<Option<Transaction>>;
    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction>;
    async fn update_transaction(
        &self,
        transaction_id: String,
        update: TransactionUpdate,
    ) -> Result<Transaction>;
    async fn delete_transaction(&self, transaction_id: String) -> Result<usize>;
}

#[async_trait]
pub trait TransactionServiceTrait: Send + Sync {
    fn list_transactions(&self) -> Result<Vec<Transaction>>;
    fn get_transaction(&self, transaction_id: &str) -> Result<Option<Transaction>>;

    /// Persists the transaction locally under a temp identifier and
    /// queues a create operation for the next sync.
    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction>;

    /// Applies a partial update locally and queues (or folds) the
    /// matching sync operation.
    async fn update_transaction(
        &self,
        transaction_id: String,
        update: TransactionUpdate,
    ) -> Result<Transaction>;

    /// Removes the record locally. A delete operation is queued only if
    /// the record had already reached the remote store.
    async fn delete_transaction(&self, transaction_id: String) -> Result<usize>;
}

#[derive(Clone)]
pub struct TransactionService {
    repository: Arc<dyn TransactionRepositoryTrait>,
}

impl TransactionService {
    pub fn new(repository: Arc<dyn TransactionRepositoryTrait>) -> Self {
        TransactionService { repository }
    }

    fn validate_category(category: &str) -> Result<()> {
        if category.trim().is_empty() {
            return Err(Error::validation("category must not be empty"));
        }
        Ok(())
    }

    fn validate_date(txn_date: &str) -> Result<()> {
        NaiveDate::parse_from_str(txn_date, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| {
                Error::validation(format!("txn_date must be an ISO date, got {:?}", txn_date))
            })
    }
}

#[async_trait]
impl TransactionServiceTrait for TransactionService {
    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        self.repository.list_transactions()
    }

    fn get_transaction(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        self.repository.get_transaction(transaction_id)
    }

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction> {
        Self::validate_category(&new_transaction.category)?;
        Self::validate_date(&new_transaction.txn_date)?;

        let created = self.repository.create_transaction(new_transaction).await?;
        debug!(
            "Created local transaction {} ({} {})",
            created.id, created.amount, created.category
        );
        Ok(created)
    }

    async fn update_transaction(
        &self,
        transaction_id: String,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        if let Some(category) = update.category.as_deref() {
            Self::validate_category(category)?;
        }
        if let Some(txn_date) = update.txn_date.as_deref() {
            Self::validate_date(txn_date)?;
        }
        self.repository
            .update_transaction(transaction_id, update)
            .await
    }

    async fn delete_transaction(&self, transaction_id: String) -> Result<usize> {
        let affected = self.repository.delete_transaction(transaction_id.clone()).await?;
        debug!("Deleted local transaction {} (rows: {})", transaction_id, affected);
        Ok(affected)
    }
}
