//! Transaction ledger
//!
//! Owns every exchange transaction and applies status changes as atomic
//! compare-and-set updates: the transition is validated against the status
//! held under the transaction's lock, so of two racing incompatible
//! transitions exactly one is applied and the other observes a state conflict.
//!
//! # Admission
//!
//! Each user may hold at most `max_active` transactions in an active status
//! (see [`TransactionStatus::is_active`]). The ledger keeps, per user, the set
//! of transaction ids currently active. Every operation that can change that
//! set locks the user's admission entry first and the transaction second, so
//! count-and-insert is a single critical section and the set always matches
//! the stored statuses.
//!
//! # Lock Order
//!
//! admissions → transactions → (caller effects: providers → users). No
//! operation holds two entries of the same map at once.

use crate::types::{
    CommissionBreakdown, ExchangeError, ProviderId, SettlementSnapshot, TimelineEvent,
    Transaction, TransactionId, TransactionStatus, Transition, UserId,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_SUFFIX_LEN: usize = 6;

/// Everything needed to open a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub provider_id: ProviderId,
    pub settlement: SettlementSnapshot,
    pub commission: CommissionBreakdown,
}

/// Thread-safe transaction store with atomic transitions
#[derive(Debug)]
pub struct TransactionLedger {
    transactions: DashMap<TransactionId, Transaction>,
    codes: DashMap<String, TransactionId>,
    /// Active transaction ids per user
    admissions: DashMap<UserId, HashSet<TransactionId>>,
    max_active: usize,
}

impl TransactionLedger {
    pub fn new(max_active: usize) -> Self {
        Self {
            transactions: DashMap::new(),
            codes: DashMap::new(),
            admissions: DashMap::new(),
            max_active,
        }
    }

    /// Open a transaction in `requested`
    ///
    /// The capacity check and the insert happen under the owner's admission
    /// lock, so concurrent requests by one user cannot both pass the check.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Capacity` - the owner already holds `max_active`
    ///   active transactions
    pub fn create(&self, new: NewTransaction) -> Result<Transaction, ExchangeError> {
        let user = new.user_id;
        let mut slots = self.admissions.entry(user).or_default();
        if slots.len() >= self.max_active {
            return Err(ExchangeError::capacity(user, slots.len(), self.max_active));
        }

        let id = TransactionId::new();
        let now = Utc::now();
        let code = self.reserve_code(id, now);
        let tx = Transaction {
            id,
            code,
            user_id: user,
            provider_id: new.provider_id,
            settlement: new.settlement,
            status: TransactionStatus::Requested,
            commission: new.commission,
            proof: None,
            timeline: vec![TimelineEvent {
                status: TransactionStatus::Requested,
                timestamp: now,
                actor: user,
                notes: "Transaction created".to_string(),
            }],
            dispute: None,
            sinpe_sent_at: None,
            proof_uploaded_at: None,
            verified_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        self.transactions.insert(id, tx.clone());
        slots.insert(id);

        debug!(tx = %id, code = %tx.code, user = %user, active = slots.len(), "transaction admitted");
        Ok(tx)
    }

    fn reserve_code(&self, id: TransactionId, at: DateTime<Utc>) -> String {
        loop {
            let code = generate_code(at);
            if let Entry::Vacant(slot) = self.codes.entry(code.clone()) {
                slot.insert(id);
                return code;
            }
        }
    }

    /// Snapshot of a transaction
    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&id).map(|entry| entry.value().clone())
    }

    /// Look up a transaction by its human-readable code
    pub fn find_by_code(&self, code: &str) -> Option<Transaction> {
        let id = self.codes.get(code).map(|entry| *entry.value())?;
        self.get(id)
    }

    /// Number of active transactions held by `user`
    pub fn active_count(&self, user: UserId) -> usize {
        self.admissions
            .get(&user)
            .map(|slots| slots.len())
            .unwrap_or(0)
    }

    /// Mutate a transaction under the admission and transaction locks
    ///
    /// After `f` returns, the owner's admission set is brought in line with
    /// the transaction's status. `f` must leave the transaction untouched
    /// when it returns an error.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::NotFound` - unknown transaction
    /// * `ExchangeError::Capacity` - `f` moved an inactive transaction back
    ///   into an active status while the owner is at the limit; the
    ///   transaction is restored
    /// * whatever `f` returns
    pub fn modify<F, T>(&self, id: TransactionId, f: F) -> Result<T, ExchangeError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, ExchangeError>,
    {
        let user = self
            .transactions
            .get(&id)
            .map(|entry| entry.value().user_id)
            .ok_or_else(|| ExchangeError::not_found("Transaction", id))?;

        let mut slots = self.admissions.entry(user).or_default();
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| ExchangeError::not_found("Transaction", id))?;
        let tx = entry.value_mut();
        let was_active = slots.contains(&id);
        let before = (!was_active).then(|| tx.clone());

        let result = f(&mut *tx)?;

        if !tx.status.is_active() {
            slots.remove(&id);
        } else if !was_active {
            if slots.len() >= self.max_active {
                let active = slots.len();
                if let Some(before) = before {
                    *tx = before;
                }
                return Err(ExchangeError::capacity(user, active, self.max_active));
            }
            slots.insert(id);
        }
        Ok(result)
    }

    /// Apply a guarded transition
    ///
    /// The transition is checked against the status held under the lock, then
    /// `effect` runs, then the new status and one timeline event are recorded.
    /// If `effect` fails nothing is recorded.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::StateConflict` - transition not allowed from the
    ///   current status
    /// * whatever `effect` returns
    pub fn transition<F>(
        &self,
        id: TransactionId,
        transition: Transition,
        actor: UserId,
        notes: Option<String>,
        effect: F,
    ) -> Result<Transaction, ExchangeError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), ExchangeError>,
    {
        let tx = self.modify(id, |tx| {
            if !transition.permits_from(tx.status) {
                return Err(ExchangeError::state_conflict(transition.name(), tx.status));
            }
            effect(tx)?;

            let notes = notes.unwrap_or_else(|| transition.timeline_note().to_string());
            tx.record(transition.target(), actor, notes, Utc::now());
            Ok(tx.clone())
        })?;

        debug!(tx = %id, transition = transition.name(), status = %tx.status, "transition applied");
        Ok(tx)
    }

    /// Transactions created by `user`, newest first
    pub fn list_for_user(&self, user: UserId, limit: usize) -> Vec<Transaction> {
        self.collect_newest(|tx| tx.user_id == user, limit)
    }

    /// Active transactions matched to `provider`, newest first
    pub fn list_pending_for_provider(&self, provider: ProviderId, limit: usize) -> Vec<Transaction> {
        self.collect_newest(
            |tx| tx.provider_id == provider && tx.status.is_active(),
            limit,
        )
    }

    /// Transactions currently in `disputed`, most recently updated first
    pub fn list_disputed(&self) -> Vec<Transaction> {
        let mut disputed: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| entry.value().status == TransactionStatus::Disputed)
            .map(|entry| entry.value().clone())
            .collect();
        disputed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        disputed
    }

    /// Snapshot of every transaction, in arbitrary order
    pub fn all(&self) -> Vec<Transaction> {
        self.transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn collect_newest<P>(&self, predicate: P, limit: usize) -> Vec<Transaction>
    where
        P: Fn(&Transaction) -> bool,
    {
        let mut matching: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.code.cmp(&a.code))
        });
        matching.truncate(limit);
        matching
    }
}

/// `CN-YYYYMM-XXXXXX` with a random upper-case alphanumeric suffix
pub fn generate_code(at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("CN-{}-{}", at.format("%Y%m"), suffix)
}
