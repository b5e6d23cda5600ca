use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use gateway_cell::{ErrorClass, PayerGateway, StatusCheck};
use transaction_cell::{
    Transaction, TransactionKind, TransactionResult, TransactionStatus, TransactionStore,
};
use x12_cell::ClaimPaymentStatus;

use crate::error::SubmissionQueueError;
use crate::models::PollerConfig;

/// Periodically asks the clearinghouse where submitted claims stand.
/// Claims that sit unpaid past the poll window fail with a timeout.
pub struct StatusPollerService {
    config: PollerConfig,
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PayerGateway>,
    is_shutdown: Arc<tokio::sync::RwLock<bool>>,
}

impl StatusPollerService {
    pub fn new(
        config: PollerConfig,
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PayerGateway>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            is_shutdown: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SubmissionQueueError> {
        info!(
            "Starting claim status poller (interval {:?})",
            self.config.interval
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;

            if *self.is_shutdown.read().await {
                info!("Shutdown signal received, stopping status poller");
                break;
            }

            if let Err(e) = self.run_once().await {
                error!("Status poll cycle failed: {}", e);
            }
        }

        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    /// One poll cycle over every transaction still in `Submitted`.
    /// Claims are asked about at the clearinghouse; an eligibility check
    /// stuck in `Submitted` (a crash landed between the control number
    /// and the result) has nobody left to settle it, so the poll window
    /// is its only backstop.
    pub async fn run_once(&self) -> Result<(), SubmissionQueueError> {
        let submitted = self
            .store
            .list_in_status(TransactionStatus::Submitted)
            .await?;

        debug!("Polling status for {} submitted transaction(s)", submitted.len());

        for transaction in submitted {
            let outcome = match transaction.kind {
                TransactionKind::Claim => self.poll_claim(transaction).await,
                TransactionKind::Eligibility => {
                    self.expire_if_past_window(&transaction).await.map(|_| ())
                }
            };
            if let Err(e) = outcome {
                error!("Failed to poll transaction status: {}", e);
            }
        }

        Ok(())
    }

    /// Fails a transaction that has sat in `Submitted` longer than the
    /// poll window. Returns whether it expired.
    async fn expire_if_past_window(
        &self,
        transaction: &Transaction,
    ) -> Result<bool, SubmissionQueueError> {
        let submitted_at = transaction.submitted_at.unwrap_or(transaction.created_at);
        let age = Utc::now().signed_duration_since(submitted_at);
        let window = chrono::Duration::from_std(self.config.max_poll_duration)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        if age <= window {
            return Ok(false);
        }

        warn!(
            "Transaction {} unresolved after {} minutes, giving up",
            transaction.id,
            age.num_minutes()
        );
        self.store
            .update_status(
                transaction.id,
                TransactionStatus::Failed,
                None,
                Some("status check timeout".to_string()),
            )
            .await?;
        Ok(true)
    }

    async fn poll_claim(&self, transaction: Transaction) -> Result<(), SubmissionQueueError> {
        if self.expire_if_past_window(&transaction).await? {
            return Ok(());
        }

        let Some(control_number) = transaction.control_number.clone() else {
            warn!(
                "Submitted claim {} has no control number, skipping",
                transaction.id
            );
            return Ok(());
        };

        match self.gateway.check_claim_status(&control_number).await {
            Ok(StatusCheck::Pending) => {
                debug!("Claim {} still pending at clearinghouse", transaction.id);
                Ok(())
            }
            Ok(StatusCheck::Settled(result)) => {
                let (status, reason) = match result.status {
                    ClaimPaymentStatus::Paid => (TransactionStatus::Accepted, None),
                    ClaimPaymentStatus::Denied => (
                        TransactionStatus::Rejected,
                        result
                            .denial_reason
                            .clone()
                            .or_else(|| Some("claim denied".to_string())),
                    ),
                };
                info!("Claim {} settled as {:?}", transaction.id, status);
                self.store
                    .update_status(
                        transaction.id,
                        status,
                        Some(TransactionResult::Claim(result)),
                        reason,
                    )
                    .await?;
                Ok(())
            }
            Err(e) => match e.class() {
                ErrorClass::Transient => {
                    warn!(
                        "Transient error polling claim {}, will retry next cycle: {}",
                        transaction.id, e
                    );
                    Ok(())
                }
                ErrorClass::Permanent => {
                    error!("Permanent error polling claim {}: {}", transaction.id, e);
                    self.store
                        .update_status(
                            transaction.id,
                            TransactionStatus::Failed,
                            None,
                            Some(e.to_string()),
                        )
                        .await?;
                    Ok(())
                }
            },
        }
    }
}
