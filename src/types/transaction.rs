//! Transaction-related types for the exchange engine
//!
//! This module defines the transaction status enumeration together with its
//! transition table, the structured sub-records a transaction carries
//! (timeline events, dispute, proof reference, settlement snapshot) and the
//! caller-facing projections returned by the exchange operations.

use super::error::ExchangeError;
use super::ids::{ProviderId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an exchange transaction
///
/// The happy path runs `Requested → Accepted → SinpeSent → ProofUploaded →
/// Verified → Completed`. `Cancelled` and `Disputed` branch off any
/// non-terminal status. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Created by the user, waiting for the provider
    Requested,
    /// Provider agreed to hand out cash
    Accepted,
    /// User reports the instant transfer as sent
    SinpeSent,
    /// Transfer receipt stored
    ProofUploaded,
    /// Provider confirmed the transfer arrived
    Verified,
    /// Cash handed over
    Completed,
    /// Abandoned by a participant or an administrator
    Cancelled,
    /// Escalated to an administrator
    Disputed,
}

impl TransactionStatus {
    /// Every status, in lifecycle order
    pub const ALL: [TransactionStatus; 8] = [
        TransactionStatus::Requested,
        TransactionStatus::Accepted,
        TransactionStatus::SinpeSent,
        TransactionStatus::ProofUploaded,
        TransactionStatus::Verified,
        TransactionStatus::Completed,
        TransactionStatus::Cancelled,
        TransactionStatus::Disputed,
    ];

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Requested => "requested",
            TransactionStatus::Accepted => "accepted",
            TransactionStatus::SinpeSent => "sinpe_sent",
            TransactionStatus::ProofUploaded => "proof_uploaded",
            TransactionStatus::Verified => "verified",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Disputed => "disputed",
        }
    }

    /// No transition of any kind leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Cancelled
        )
    }

    /// Whether a transaction in this status occupies one of the owner's
    /// active-transaction slots
    ///
    /// These are also the statuses a provider sees in its pending queue.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Requested
                | TransactionStatus::Accepted
                | TransactionStatus::SinpeSent
                | TransactionStatus::ProofUploaded
        )
    }

    /// The normal transition table
    ///
    /// Dispute resolution is the only way out of `Disputed` and does not go
    /// through this table.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;

        match (*self, next) {
            (Requested, Accepted) => true,
            (Accepted, SinpeSent) => true,
            (Accepted | SinpeSent, ProofUploaded) => true,
            (ProofUploaded, Verified) => true,
            (Verified, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            (from, Disputed) => !from.is_terminal() && from != Disputed,
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ExchangeError::validation(format!("Unknown transaction status '{}'", s)))
    }
}

/// A guarded, participant-initiated status change
///
/// Creation and dispute resolution are not listed: the first has no prior
/// status and the second bypasses the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Accept,
    MarkSinpeSent,
    UploadProof,
    Verify,
    Complete,
    Cancel,
    OpenDispute,
}

impl Transition {
    /// Status the transaction holds after the transition
    pub fn target(&self) -> TransactionStatus {
        match self {
            Transition::Accept => TransactionStatus::Accepted,
            Transition::MarkSinpeSent => TransactionStatus::SinpeSent,
            Transition::UploadProof => TransactionStatus::ProofUploaded,
            Transition::Verify => TransactionStatus::Verified,
            Transition::Complete => TransactionStatus::Completed,
            Transition::Cancel => TransactionStatus::Cancelled,
            Transition::OpenDispute => TransactionStatus::Disputed,
        }
    }

    /// Whether the transition may start from `current`
    pub fn permits_from(&self, current: TransactionStatus) -> bool {
        current.can_transition_to(self.target())
    }

    /// Operation name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Accept => "accept",
            Transition::MarkSinpeSent => "sinpe-sent",
            Transition::UploadProof => "upload-proof",
            Transition::Verify => "verify",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
            Transition::OpenDispute => "open-dispute",
        }
    }

    /// Timeline note recorded when the transition carries no notes of its own
    pub fn timeline_note(&self) -> &'static str {
        match self {
            Transition::Accept => "Provider accepted the request",
            Transition::MarkSinpeSent => "User marked the transfer as sent",
            Transition::UploadProof => "Transfer proof uploaded",
            Transition::Verify => "Provider verified the transfer",
            Transition::Complete => "Cash delivered",
            Transition::Cancel => "Cancelled by participant",
            Transition::OpenDispute => "Dispute opened",
        }
    }

    /// Confirmation message returned to the caller
    pub fn confirmation(&self) -> &'static str {
        match self {
            Transition::Accept => "Request accepted. The user will send the transfer.",
            Transition::MarkSinpeSent => "Transfer marked as sent.",
            Transition::UploadProof => "Proof uploaded.",
            Transition::Verify => "Transfer verified. Hand over the cash.",
            Transition::Complete => "Transaction completed!",
            Transition::Cancel => "Transaction cancelled.",
            Transition::OpenDispute => "Dispute opened. An administrator will review it.",
        }
    }
}

/// Commission snapshot computed once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionBreakdown {
    /// Cash amount the user wants to receive
    pub requested_amount: Decimal,
    /// Rate in effect when the transaction was created
    pub rate: Decimal,
    /// `requested_amount * rate`, rounded half-up to 2 places
    pub commission: Decimal,
    /// `requested_amount + commission`, rounded half-up to 2 places
    pub total: Decimal,
}

/// Provider settlement details frozen into the transaction at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementSnapshot {
    pub provider_name: String,
    pub account: String,
    pub holder_name: String,
}

/// One entry of the append-only audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: UserId,
    pub notes: String,
}

/// Administrative closure of a dispute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeResolution {
    pub final_status: TransactionStatus,
    pub resolution: String,
    pub admin_notes: String,
    pub resolved_by: UserId,
    pub resolved_at: DateTime<Utc>,
}

/// Escalation record attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispute {
    pub reason: String,
    pub opened_by: UserId,
    pub opened_at: DateTime<Utc>,
    /// `None` while the dispute is open
    pub resolution: Option<DisputeResolution>,
}

impl Dispute {
    pub fn is_open(&self) -> bool {
        self.resolution.is_none()
    }
}

/// Stored transfer proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofReference {
    /// Logical object key, derived from the transaction id and content digest
    pub key: String,
    /// Retrievable location returned by the object store
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Exchange transaction as held by the ledger
///
/// Financial fields are written once at creation. Everything else changes
/// only through [`Transaction::record`], which keeps the timeline in step
/// with the status.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    /// Human-readable code, `CN-YYYYMM-XXXXXX`
    pub code: String,
    pub user_id: UserId,
    pub provider_id: ProviderId,
    pub settlement: SettlementSnapshot,
    pub status: TransactionStatus,
    pub commission: CommissionBreakdown,
    pub proof: Option<ProofReference>,
    pub timeline: Vec<TimelineEvent>,
    pub dispute: Option<Dispute>,
    pub sinpe_sent_at: Option<DateTime<Utc>>,
    pub proof_uploaded_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Move to `status` and append the matching timeline event
    ///
    /// Callers must have checked that the move is allowed; this only keeps the
    /// status, milestone timestamps and timeline consistent with each other.
    pub(crate) fn record(
        &mut self,
        status: TransactionStatus,
        actor: UserId,
        notes: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        match status {
            TransactionStatus::SinpeSent => self.sinpe_sent_at = Some(at),
            TransactionStatus::ProofUploaded => self.proof_uploaded_at = Some(at),
            TransactionStatus::Verified => self.verified_at = Some(at),
            TransactionStatus::Completed => self.completed_at = Some(at),
            TransactionStatus::Cancelled => self.cancelled_at = Some(at),
            _ => {}
        }

        self.status = status;
        self.updated_at = at;
        self.timeline.push(TimelineEvent {
            status,
            timestamp: at,
            actor,
            notes: notes.into(),
        });
    }

    /// Whether `user` owns the transaction
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.user_id == user
    }
}

/// Caller-facing view of a transaction
///
/// Settlement details are present only when the caller is one of the
/// transaction's own participants.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionView {
    pub id: TransactionId,
    pub code: String,
    pub user_id: UserId,
    pub provider_id: ProviderId,
    pub settlement: Option<SettlementSnapshot>,
    pub status: TransactionStatus,
    pub requested_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub total_to_send: Decimal,
    pub proof_url: Option<String>,
    pub timeline: Vec<TimelineEvent>,
    pub dispute: Option<Dispute>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionView {
    pub fn project(tx: &Transaction, include_settlement: bool) -> Self {
        Self {
            id: tx.id,
            code: tx.code.clone(),
            user_id: tx.user_id,
            provider_id: tx.provider_id,
            settlement: include_settlement.then(|| tx.settlement.clone()),
            status: tx.status,
            requested_amount: tx.commission.requested_amount,
            commission_rate: tx.commission.rate,
            commission_amount: tx.commission.commission,
            total_to_send: tx.commission.total,
            proof_url: tx.proof.as_ref().map(|proof| proof.url.clone()),
            timeline: tx.timeline.clone(),
            dispute: tx.dispute.clone(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Result of a mutating transaction operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub message: String,
}
