use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use x12_cell::{ClaimResult, EligibilityResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Eligibility,
    Claim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Queued,
    Submitted,
    Accepted,
    Rejected,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Accepted
                | TransactionStatus::Rejected
                | TransactionStatus::Failed
                | TransactionStatus::Cancelled
        )
    }

    /// Status transitions are monotonic: once a transaction reaches a
    /// terminal status it never leaves it.
    pub fn can_transition_to(&self, target: &TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, target) {
            (Queued, Submitted) => true,
            (Queued, Accepted) | (Queued, Rejected) => true,
            (Submitted, Accepted) | (Submitted, Rejected) => true,
            (_, Failed) | (_, Cancelled) => !self.is_terminal(),
            _ => false,
        }
    }
}

/// The parsed payload a completed transaction carries; immutable once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionResult {
    Eligibility(EligibilityResult),
    Claim(ClaimResult),
}

/// Audit record of a submitted eligibility check or claim. Transactions
/// are never deleted; they are retained per tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub tenant_id: Uuid,
    pub payer_code: String,
    /// Domain entity (claim, appointment, encounter) this transaction
    /// belongs to.
    pub reference_id: String,
    /// Assigned by the clearinghouse, only after a successful submission
    /// response.
    pub control_number: Option<String>,
    pub status: TransactionStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub result: Option<TransactionResult>,
}

impl Transaction {
    pub fn new(kind: TransactionKind, tenant_id: Uuid, payer_code: &str, reference_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            tenant_id,
            payer_code: payer_code.to_string(),
            reference_id: reference_id.to_string(),
            control_number: None,
            status: TransactionStatus::Queued,
            submitted_at: None,
            created_at: now,
            updated_at: now,
            last_error: None,
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_never_transition() {
        use TransactionStatus::*;
        for terminal in [Accepted, Rejected, Failed, Cancelled] {
            for target in [Queued, Submitted, Accepted, Rejected, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(&target));
            }
        }
    }

    #[test]
    fn queued_can_settle_directly() {
        use TransactionStatus::*;
        assert!(Queued.can_transition_to(&Accepted));
        assert!(Queued.can_transition_to(&Rejected));
        assert!(Queued.can_transition_to(&Submitted));
        assert!(Submitted.can_transition_to(&Accepted));
        assert!(!Submitted.can_transition_to(&Queued));
    }
}
