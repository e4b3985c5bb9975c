//! Transaction lifecycle and the provider status mapping.
//!
//! The polling and webhook flows both go through [`map_status`]; there is
//! no second mapping table anywhere in the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Internal lifecycle of a payment attempt.
///
/// `Pending` is the only non-terminal state. Once a transaction reaches any
/// other state it stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 5] = [
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
        TransactionStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next != TransactionStatus::Pending
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

const SUCCEEDED_PAYMENT_STATUSES: &[&str] = &["succeeded", "paid", "success"];

/// Maps a provider `(checkout_status, payment_status)` pair onto the
/// internal lifecycle. Inputs are compared case-insensitively; the first
/// matching rule wins and anything unrecognised stays `Pending`.
pub fn map_status(checkout_status: &str, payment_status: &str) -> TransactionStatus {
    let checkout = checkout_status.trim().to_ascii_lowercase();
    let payment = payment_status.trim().to_ascii_lowercase();

    if checkout == "complete" && SUCCEEDED_PAYMENT_STATUSES.contains(&payment.as_str()) {
        return TransactionStatus::Completed;
    }

    match checkout.as_str() {
        "failed" => return TransactionStatus::Failed,
        "expired" => return TransactionStatus::Expired,
        "cancelled" => return TransactionStatus::Cancelled,
        _ => {}
    }

    match payment.as_str() {
        "failed" => TransactionStatus::Failed,
        "cancelled" => TransactionStatus::Cancelled,
        _ => TransactionStatus::Pending,
    }
}

/// Progress of the post → pay → reconcile sequence for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
    NotStarted,
    InProgress,
    /// Payment posted and receivable lines matched.
    Settled,
    /// Payment posted but no receivable lines could be matched.
    PartiallyReconciled,
    /// The invoice had nothing left to pay when the transaction completed.
    AlreadySettled,
    Failed,
}

impl ReconciliationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationState::NotStarted => "not_started",
            ReconciliationState::InProgress => "in_progress",
            ReconciliationState::Settled => "settled",
            ReconciliationState::PartiallyReconciled => "partially_reconciled",
            ReconciliationState::AlreadySettled => "already_settled",
            ReconciliationState::Failed => "failed",
        }
    }

    /// States from which a reconciliation run may be claimed.
    pub fn is_claimable(&self) -> bool {
        matches!(
            self,
            ReconciliationState::NotStarted | ReconciliationState::Failed
        )
    }

    /// States a forced retry may take over, including a run abandoned
    /// `in_progress` by a crash or a lost outcome write.
    pub fn is_reclaimable(&self) -> bool {
        !self.is_done()
    }

    /// The payment side of the sequence is done and must not run again.
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            ReconciliationState::Settled
                | ReconciliationState::PartiallyReconciled
                | ReconciliationState::AlreadySettled
        )
    }
}

impl fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconciliationState {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ReconciliationState::NotStarted),
            "in_progress" => Ok(ReconciliationState::InProgress),
            "settled" => Ok(ReconciliationState::Settled),
            "partially_reconciled" => Ok(ReconciliationState::PartiallyReconciled),
            "already_settled" => Ok(ReconciliationState::AlreadySettled),
            "failed" => Ok(ReconciliationState::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT_STATUSES: &[&str] = &[
        "open", "complete", "failed", "expired", "cancelled", "processing", "", "weird",
    ];
    const PAYMENT_STATUSES: &[&str] = &[
        "processing", "succeeded", "paid", "success", "failed", "cancelled", "", "weird",
    ];

    #[test]
    fn completed_requires_complete_checkout_and_successful_payment() {
        assert_eq!(map_status("complete", "succeeded"), TransactionStatus::Completed);
        assert_eq!(map_status("complete", "paid"), TransactionStatus::Completed);
        assert_eq!(map_status("complete", "success"), TransactionStatus::Completed);
        assert_eq!(map_status("complete", "processing"), TransactionStatus::Pending);
        assert_eq!(map_status("open", "succeeded"), TransactionStatus::Pending);
    }

    #[test]
    fn terminal_checkout_status_wins_over_payment_status() {
        assert_eq!(map_status("expired", "failed"), TransactionStatus::Expired);
        assert_eq!(map_status("cancelled", "failed"), TransactionStatus::Cancelled);
        assert_eq!(map_status("failed", "cancelled"), TransactionStatus::Failed);
        assert_eq!(map_status("expired", "succeeded"), TransactionStatus::Expired);
    }

    #[test]
    fn payment_failure_and_cancellation() {
        assert_eq!(map_status("open", "failed"), TransactionStatus::Failed);
        assert_eq!(map_status("complete", "failed"), TransactionStatus::Failed);
        assert_eq!(map_status("open", "cancelled"), TransactionStatus::Cancelled);
    }

    #[test]
    fn mapping_is_case_insensitive() {
        for checkout in CHECKOUT_STATUSES {
            for payment in PAYMENT_STATUSES {
                let lower = map_status(checkout, payment);
                let upper = map_status(&checkout.to_uppercase(), &payment.to_uppercase());
                let padded = map_status(&format!(" {} ", checkout), &format!("{}\n", payment));
                assert_eq!(lower, upper, "({}, {})", checkout, payment);
                assert_eq!(lower, padded, "({}, {})", checkout, payment);
            }
        }
    }

    #[test]
    fn mapping_is_total_over_known_and_unknown_inputs() {
        for checkout in CHECKOUT_STATUSES {
            for payment in PAYMENT_STATUSES {
                let status = map_status(checkout, payment);
                assert!(TransactionStatus::ALL.contains(&status));
            }
        }
    }

    #[test]
    fn terminal_states_never_transition() {
        for from in TransactionStatus::ALL {
            for to in TransactionStatus::ALL {
                let allowed = from.can_transition_to(to);
                assert_eq!(allowed, from == TransactionStatus::Pending && to.is_terminal());
            }
        }
    }

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("refunded".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn only_not_started_and_failed_are_claimable() {
        assert!(ReconciliationState::NotStarted.is_claimable());
        assert!(ReconciliationState::Failed.is_claimable());
        assert!(!ReconciliationState::InProgress.is_claimable());
        assert!(!ReconciliationState::Settled.is_claimable());
        assert!(ReconciliationState::PartiallyReconciled.is_done());
    }
}
