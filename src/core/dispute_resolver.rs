//! Dispute escalation and administrative resolution
//!
//! Opening a dispute is an ordinary guarded transition. Resolving one is the
//! single sanctioned bypass of the transition table: an administrator picks
//! the final status. The bypass still requires the transaction to be in
//! `disputed` with an open dispute, and still appends exactly one timeline
//! event.

use super::ledger::TransactionLedger;
use crate::types::{
    Dispute, DisputeResolution, ExchangeError, Transaction, TransactionId, TransactionStatus,
    Transition, UserId,
};
use chrono::Utc;
use tracing::info;

/// Minimum dispute reason length, in characters, after trimming
pub const MIN_REASON_CHARS: usize = 10;

/// Administrator's decision on a dispute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Any status except `disputed`
    pub final_status: TransactionStatus,
    pub resolution: String,
    pub admin_notes: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisputeResolver;

impl DisputeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Escalate a transaction to `disputed`
    ///
    /// A transaction carries one dispute record at a time. Once an
    /// administrator has resolved it into a non-terminal status, a new dispute
    /// replaces the resolved record; the timeline keeps both.
    pub fn open(
        &self,
        ledger: &TransactionLedger,
        id: TransactionId,
        opener: UserId,
        reason: &str,
    ) -> Result<Transaction, ExchangeError> {
        let reason = reason.trim();
        if reason.chars().count() < MIN_REASON_CHARS {
            return Err(ExchangeError::validation(format!(
                "Dispute reason must have at least {} characters",
                MIN_REASON_CHARS
            )));
        }

        let notes = format!("Dispute opened: {}", reason);
        ledger.transition(id, Transition::OpenDispute, opener, Some(notes), |tx| {
            if tx.dispute.as_ref().is_some_and(Dispute::is_open) {
                return Err(ExchangeError::state_conflict(
                    "open-dispute",
                    tx.status,
                ));
            }
            tx.dispute = Some(Dispute {
                reason: reason.to_string(),
                opened_by: opener,
                opened_at: Utc::now(),
                resolution: None,
            });
            Ok(())
        })
    }

    /// Close an open dispute because a participant cancelled the transaction
    ///
    /// Runs inside the cancel transition; a transaction without an open
    /// dispute is left as is.
    pub fn withdraw(&self, tx: &mut Transaction, actor: UserId, notes: Option<&str>) {
        if let Some(dispute) = tx.dispute.as_mut().filter(|dispute| dispute.is_open()) {
            dispute.resolution = Some(DisputeResolution {
                final_status: TransactionStatus::Cancelled,
                resolution: notes
                    .unwrap_or(Transition::Cancel.timeline_note())
                    .to_string(),
                admin_notes: String::new(),
                resolved_by: actor,
                resolved_at: Utc::now(),
            });
        }
    }

    /// Close the open dispute on `id` with an administrator-chosen status
    ///
    /// `on_complete` runs inside the transaction's critical section when the
    /// final status is `completed`, so completion side effects and the status
    /// change land together or not at all. Authorization is the caller's
    /// concern.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Validation` - final status `disputed` or empty
    ///   resolution text
    /// * `ExchangeError::StateConflict` - transaction not in `disputed`, or its
    ///   dispute already resolved
    /// * `ExchangeError::Capacity` - final status is active and the owner
    ///   already holds the maximum number of active transactions
    pub fn resolve<F>(
        &self,
        ledger: &TransactionLedger,
        id: TransactionId,
        admin: UserId,
        request: ResolutionRequest,
        on_complete: F,
    ) -> Result<Transaction, ExchangeError>
    where
        F: FnOnce(&Transaction) -> Result<(), ExchangeError>,
    {
        if request.final_status == TransactionStatus::Disputed {
            return Err(ExchangeError::validation(
                "Final status must differ from disputed",
            ));
        }
        let resolution = request.resolution.trim().to_string();
        if resolution.is_empty() {
            return Err(ExchangeError::validation("Resolution text is required"));
        }

        let tx = ledger.modify(id, |tx| {
            let open = tx.dispute.as_ref().is_some_and(Dispute::is_open);
            if tx.status != TransactionStatus::Disputed || !open {
                return Err(ExchangeError::state_conflict("resolve-dispute", tx.status));
            }
            if request.final_status == TransactionStatus::Completed {
                on_complete(tx)?;
            }

            let now = Utc::now();
            if let Some(dispute) = tx.dispute.as_mut() {
                dispute.resolution = Some(DisputeResolution {
                    final_status: request.final_status,
                    resolution: resolution.clone(),
                    admin_notes: request.admin_notes.trim().to_string(),
                    resolved_by: admin,
                    resolved_at: now,
                });
            }
            tx.record(
                request.final_status,
                admin,
                format!("Dispute resolved: {}", resolution),
                now,
            );
            Ok(tx.clone())
        })?;

        info!(tx = %id, admin = %admin, status = %tx.status, "dispute resolved");
        Ok(tx)
    }
}
