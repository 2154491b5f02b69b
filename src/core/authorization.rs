//! Capability matrix for exchange operations
//!
//! Every mutation is checked here before the ledger is touched. The guard is
//! a set of pure predicates over a principal and the record it acts on, so
//! the rules can be tested without a ledger and cannot drift from the
//! transition table, which lives on [`TransactionStatus`].
//!
//! [`TransactionStatus`]: crate::types::TransactionStatus

use crate::types::{ExchangeError, Principal, Provider, ProviderId, Role, Transaction, Transition};

/// How a principal relates to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// Created the transaction
    Owner,
    /// Owns the provider profile the transaction is matched to
    MatchedProvider,
    Admin,
}

/// Parties allowed to drive each transition
pub fn permitted_parties(transition: Transition) -> &'static [Party] {
    match transition {
        Transition::Accept | Transition::Verify | Transition::Complete => {
            &[Party::MatchedProvider]
        }
        Transition::MarkSinpeSent | Transition::UploadProof => &[Party::Owner],
        Transition::Cancel => &[Party::Owner, Party::MatchedProvider, Party::Admin],
        Transition::OpenDispute => &[Party::Owner, Party::MatchedProvider],
    }
}

/// Stateless authorization predicates
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGuard;

impl AuthorizationGuard {
    pub fn new() -> Self {
        Self
    }

    /// Parties `principal` plays on `tx`
    ///
    /// `acting_provider` is the principal's own provider profile, if any.
    pub fn parties(
        &self,
        principal: &Principal,
        tx: &Transaction,
        acting_provider: Option<ProviderId>,
    ) -> Vec<Party> {
        let mut parties = Vec::with_capacity(3);
        if tx.is_owned_by(principal.id) {
            parties.push(Party::Owner);
        }
        if acting_provider == Some(tx.provider_id) {
            parties.push(Party::MatchedProvider);
        }
        if principal.is_admin() {
            parties.push(Party::Admin);
        }
        parties
    }

    /// Reject suspended principals
    pub fn require_active(&self, principal: &Principal, action: &str) -> Result<(), ExchangeError> {
        if principal.is_suspended() {
            return Err(ExchangeError::forbidden(action, "account is suspended"));
        }
        Ok(())
    }

    /// Check that `principal` may drive `transition` on `tx`
    ///
    /// Only identity is checked; whether the transition is valid from the
    /// current status is the ledger's decision.
    pub fn authorize_transition(
        &self,
        principal: &Principal,
        tx: &Transaction,
        acting_provider: Option<ProviderId>,
        transition: Transition,
    ) -> Result<(), ExchangeError> {
        self.require_active(principal, transition.name())?;

        let allowed = permitted_parties(transition);
        let parties = self.parties(principal, tx, acting_provider);
        if parties.iter().any(|party| allowed.contains(party)) {
            return Ok(());
        }

        Err(ExchangeError::forbidden(
            transition.name(),
            describe_requirement(allowed),
        ))
    }

    /// Check that `principal` may read `tx`
    ///
    /// # Returns
    ///
    /// Whether the projection may include settlement details, which only the
    /// transaction's own participants see.
    pub fn authorize_view(
        &self,
        principal: &Principal,
        tx: &Transaction,
        acting_provider: Option<ProviderId>,
    ) -> Result<bool, ExchangeError> {
        self.require_active(principal, "view transaction")?;

        let parties = self.parties(principal, tx, acting_provider);
        if parties.is_empty() {
            return Err(ExchangeError::forbidden(
                "view transaction",
                "not a participant",
            ));
        }
        Ok(parties
            .iter()
            .any(|party| matches!(party, Party::Owner | Party::MatchedProvider)))
    }

    /// Administrators only
    pub fn require_admin(&self, principal: &Principal, action: &str) -> Result<(), ExchangeError> {
        self.require_active(principal, action)?;
        if !principal.is_admin() {
            return Err(ExchangeError::forbidden(action, "administrator role required"));
        }
        Ok(())
    }

    /// Provider businesses and administrators may register provider profiles
    pub fn authorize_provider_create(&self, principal: &Principal) -> Result<(), ExchangeError> {
        self.require_active(principal, "create provider")?;
        match principal.role {
            Role::ProviderBusiness | Role::Superadmin => Ok(()),
            Role::Regular => Err(ExchangeError::forbidden(
                "create provider",
                "provider business role required",
            )),
        }
    }

    /// Profile owner or an administrator may change a provider profile
    pub fn authorize_provider_manage(
        &self,
        principal: &Principal,
        provider: &Provider,
        action: &str,
    ) -> Result<(), ExchangeError> {
        self.require_active(principal, action)?;
        if provider.user_id == principal.id || principal.is_admin() {
            return Ok(());
        }
        Err(ExchangeError::forbidden(action, "not the provider owner"))
    }
}

fn describe_requirement(allowed: &[Party]) -> String {
    let names: Vec<&str> = allowed
        .iter()
        .map(|party| match party {
            Party::Owner => "the requesting user",
            Party::MatchedProvider => "the matched provider",
            Party::Admin => "an administrator",
        })
        .collect();
    format!("only {} may do this", names.join(" or "))
}
