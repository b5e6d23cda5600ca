use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::TransactionError;
use crate::models::{Transaction, TransactionResult, TransactionStatus};

/// Durable record of every payer transaction. The tenant/domain data
/// store is an external collaborator; production deployments implement
/// this trait against it, tests and embedded use get the in-memory store.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn record_submission(&self, transaction: Transaction) -> Result<(), TransactionError>;

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, TransactionError>;

    async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference_id: &str,
    ) -> Result<Vec<Transaction>, TransactionError>;

    async fn list_in_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransactionError>;

    /// Records the clearinghouse-assigned control number and moves the
    /// transaction to `Submitted`. Replaying with the same control number
    /// is a no-op.
    async fn mark_submitted(
        &self,
        id: Uuid,
        control_number: &str,
    ) -> Result<Transaction, TransactionError>;

    /// Applies a status change. Idempotent on `(id, status)`: replaying
    /// the transaction's current status returns the unchanged row. Any
    /// other transition out of a terminal status is rejected, which is
    /// how late results of cancelled work get discarded.
    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        result: Option<TransactionResult>,
        error: Option<String>,
    ) -> Result<Transaction, TransactionError>;
}

pub struct InMemoryTransactionStore {
    transactions: RwLock<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn record_submission(&self, transaction: Transaction) -> Result<(), TransactionError> {
        let mut transactions = self.transactions.write().await;
        debug!("Recording transaction {}", transaction.id);
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Transaction>, TransactionError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference_id: &str,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.reference_id == reference_id)
            .cloned()
            .collect())
    }

    async fn list_in_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn mark_submitted(
        &self,
        id: Uuid,
        control_number: &str,
    ) -> Result<Transaction, TransactionError> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or_else(|| TransactionError::NotFound(id.to_string()))?;

        // Replay of the same submission response.
        if transaction.status == TransactionStatus::Submitted
            && transaction.control_number.as_deref() == Some(control_number)
        {
            return Ok(transaction.clone());
        }

        if !transaction
            .status
            .can_transition_to(&TransactionStatus::Submitted)
        {
            return Err(TransactionError::InvalidStatusTransition {
                from: format!("{:?}", transaction.status),
                to: "Submitted".to_string(),
            });
        }

        transaction.control_number = Some(control_number.to_string());
        transaction.status = TransactionStatus::Submitted;
        transaction.submitted_at = Some(Utc::now());
        transaction.updated_at = Utc::now();
        Ok(transaction.clone())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        result: Option<TransactionResult>,
        error: Option<String>,
    ) -> Result<Transaction, TransactionError> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or_else(|| TransactionError::NotFound(id.to_string()))?;

        // Idempotent replay under at-least-once job execution.
        if transaction.status == status {
            return Ok(transaction.clone());
        }

        if !transaction.status.can_transition_to(&status) {
            return Err(TransactionError::InvalidStatusTransition {
                from: format!("{:?}", transaction.status),
                to: format!("{:?}", status),
            });
        }

        debug!(
            "Transaction {} status {:?} -> {:?}",
            id, transaction.status, status
        );
        transaction.status = status;
        if let Some(result) = result {
            transaction.result = Some(result);
        }
        if error.is_some() {
            transaction.last_error = error;
        }
        transaction.updated_at = Utc::now();
        Ok(transaction.clone())
    }
}
