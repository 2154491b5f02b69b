//! Exchange context
//!
//! `ExchangeService` is the explicit context object built once at process
//! start. It wires the configuration, collaborators and core components
//! together and exposes every exchange operation. Each operation takes the
//! authenticated [`Principal`] acting on it, runs the authorization guard,
//! then delegates to the component that owns the state.
//!
//! # Example
//!
//! ```
//! use coinnet_engine::config::EngineConfig;
//! use coinnet_engine::core::ExchangeService;
//! use coinnet_engine::types::{NewUser, Role};
//!
//! let exchange = ExchangeService::new(EngineConfig::default());
//! let (_, credential) = exchange
//!     .users()
//!     .register(NewUser {
//!         email: "ana@example.com".to_string(),
//!         full_name: "Ana Mora".to_string(),
//!         phone: None,
//!         role: Role::Regular,
//!     })
//!     .unwrap();
//! let principal = exchange.authenticate(&credential).unwrap();
//! assert!(exchange.list_mine(&principal).unwrap().is_empty());
//! ```

use super::authorization::AuthorizationGuard;
use super::commission::CommissionCalculator;
use super::dispute_resolver::{DisputeResolver, ResolutionRequest};
use super::ledger::{NewTransaction, TransactionLedger};
use super::object_store::InMemoryObjectStore;
use super::provider_directory::{NearbyQuery, ProviderDirectory};
use super::traits::{
    is_allowed_proof_mime, mime_from_filename, proof_extension, AuthenticationService, ObjectStore,
};
use super::user_directory::UserDirectory;
use crate::config::EngineConfig;
use crate::types::{
    Availability, ExchangeError, GeoPoint, NewProvider, Principal, ProofReference, Provider,
    ProviderId, ProviderUpdate, ProviderView, SettlementSnapshot, Transaction, TransactionId,
    TransactionStatus, TransactionView, Transition, TransitionOutcome, User, UserId,
    VerificationStatus,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Hex characters of the content digest used in proof object keys
const PROOF_DIGEST_CHARS: usize = 16;

/// Proof content submitted by the requesting user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofUpload {
    pub content: Vec<u8>,
    /// Declared MIME type; inferred from `filename` when absent
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

impl ProofUpload {
    fn resolve_mime(&self) -> Result<String, ExchangeError> {
        let mime = match (&self.mime_type, &self.filename) {
            (Some(mime), _) => mime.trim().to_lowercase(),
            (None, Some(filename)) => mime_from_filename(filename)
                .ok_or_else(|| {
                    ExchangeError::validation(format!(
                        "Cannot infer file type of '{}'; use JPG, PNG, WEBP or PDF",
                        filename
                    ))
                })?
                .to_string(),
            (None, None) => return Err(ExchangeError::validation("File type is required")),
        };
        if !is_allowed_proof_mime(&mime) {
            return Err(ExchangeError::validation(format!(
                "File type '{}' not allowed; use JPG, PNG, WEBP or PDF",
                mime
            )));
        }
        Ok(mime)
    }
}

/// Object key for a proof: `proofs/{transaction id}/{digest prefix}.{ext}`
pub fn proof_key(id: TransactionId, content: &[u8], mime_type: &str) -> String {
    let digest = hex::encode(Sha256::digest(content));
    format!(
        "proofs/{}/{}.{}",
        id,
        &digest[..PROOF_DIGEST_CHARS],
        proof_extension(mime_type)
    )
}

/// The exchange context
pub struct ExchangeService {
    config: EngineConfig,
    commission: CommissionCalculator,
    guard: AuthorizationGuard,
    users: Arc<UserDirectory>,
    auth: Arc<dyn AuthenticationService>,
    store: Arc<dyn ObjectStore>,
    providers: ProviderDirectory,
    ledger: TransactionLedger,
    resolver: DisputeResolver,
}

impl ExchangeService {
    /// Context backed by the in-memory user directory and object store
    pub fn new(config: EngineConfig) -> Self {
        let users = Arc::new(UserDirectory::new());
        let store = Arc::new(InMemoryObjectStore::new(config.proof_base_url.clone()));
        Self::with_collaborators(config, users.clone(), users, store)
    }

    /// Context with explicit collaborators
    ///
    /// `users` holds the profile counters updated on completion; `auth`
    /// resolves credentials and may be a different backend.
    pub fn with_collaborators(
        config: EngineConfig,
        users: Arc<UserDirectory>,
        auth: Arc<dyn AuthenticationService>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            commission: CommissionCalculator::new(config.commission_rate),
            guard: AuthorizationGuard::new(),
            providers: ProviderDirectory::new(config.nearby_result_limit),
            ledger: TransactionLedger::new(config.max_active_transactions),
            resolver: DisputeResolver::new(),
            users,
            auth,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn providers(&self) -> &ProviderDirectory {
        &self.providers
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    /// Resolve a credential to a principal
    pub fn authenticate(&self, credential: &str) -> Result<Principal, ExchangeError> {
        self.auth.authenticate(credential)
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Request `amount` in cash from `provider_id`
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Validation` - non-positive amount, provider not
    ///   available, or amount outside the provider's range
    /// * `ExchangeError::NotFound` - unknown provider
    /// * `ExchangeError::Capacity` - too many active transactions
    pub fn create_transaction(
        &self,
        principal: &Principal,
        provider_id: ProviderId,
        amount: Decimal,
    ) -> Result<TransactionView, ExchangeError> {
        self.guard.require_active(principal, "request cash")?;
        let commission = self.commission.compute(amount)?;

        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| ExchangeError::not_found("Provider", provider_id))?;
        if !provider.is_matchable() {
            return Err(ExchangeError::validation(format!(
                "Provider {} is not available",
                provider.business_name
            )));
        }
        if !provider.accepts_amount(amount) {
            return Err(ExchangeError::validation(format!(
                "Amount must be between {} and {}",
                provider.min_amount, provider.max_amount
            )));
        }

        let tx = self.ledger.create(NewTransaction {
            user_id: principal.id,
            provider_id,
            settlement: SettlementSnapshot {
                provider_name: provider.business_name.clone(),
                account: provider.settlement_account.clone(),
                holder_name: provider.settlement_holder_name.clone(),
            },
            commission,
        })?;
        Ok(TransactionView::project(&tx, true))
    }

    /// Fetch a transaction visible to `principal`
    pub fn get_transaction(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> Result<TransactionView, ExchangeError> {
        let tx = self.load(id)?;
        let include_settlement =
            self.guard
                .authorize_view(principal, &tx, self.acting_provider(principal))?;
        Ok(TransactionView::project(&tx, include_settlement))
    }

    /// The caller's own transactions, newest first
    pub fn list_mine(&self, principal: &Principal) -> Result<Vec<TransactionView>, ExchangeError> {
        self.guard.require_active(principal, "list transactions")?;
        Ok(self
            .ledger
            .list_for_user(principal.id, self.config.listing_limit)
            .iter()
            .map(|tx| TransactionView::project(tx, true))
            .collect())
    }

    /// Active transactions matched to the caller's provider profile
    pub fn list_pending_for_provider(
        &self,
        principal: &Principal,
    ) -> Result<Vec<TransactionView>, ExchangeError> {
        self.guard.require_active(principal, "list pending transactions")?;
        let provider = self.my_provider(principal)?;
        Ok(self
            .ledger
            .list_pending_for_provider(provider.id, self.config.listing_limit)
            .iter()
            .map(|tx| TransactionView::project(tx, true))
            .collect())
    }

    pub fn accept(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> Result<TransitionOutcome, ExchangeError> {
        self.drive(principal, id, Transition::Accept, None, |_| Ok(()))
    }

    pub fn mark_sinpe_sent(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> Result<TransitionOutcome, ExchangeError> {
        self.drive(principal, id, Transition::MarkSinpeSent, None, |_| Ok(()))
    }

    /// Store a transfer proof and move to `proof_uploaded`
    ///
    /// The content is stored before the status changes; a storage failure
    /// leaves the transaction untouched. Re-submitting the same content once
    /// the transaction is in `proof_uploaded` succeeds without a second
    /// timeline event.
    pub fn upload_proof(
        &self,
        principal: &Principal,
        id: TransactionId,
        upload: ProofUpload,
    ) -> Result<TransitionOutcome, ExchangeError> {
        let tx = self.load(id)?;
        self.guard.authorize_transition(
            principal,
            &tx,
            self.acting_provider(principal),
            Transition::UploadProof,
        )?;

        if upload.content.is_empty() {
            return Err(ExchangeError::validation("Proof file is empty"));
        }
        let mime_type = upload.resolve_mime()?;
        let key = proof_key(id, &upload.content, &mime_type);

        if is_same_proof(&tx, &key) {
            return Ok(already_uploaded(&tx));
        }
        if !Transition::UploadProof.permits_from(tx.status) {
            return Err(ExchangeError::state_conflict(
                Transition::UploadProof.name(),
                tx.status,
            ));
        }

        let url = self.store.put(&key, &upload.content, &mime_type)?;
        debug!(tx = %id, key = %key, "proof stored");

        let actor = principal.id;
        self.ledger.modify(id, |tx| {
            if is_same_proof(tx, &key) {
                return Ok(already_uploaded(tx));
            }
            if !Transition::UploadProof.permits_from(tx.status) {
                return Err(ExchangeError::state_conflict(
                    Transition::UploadProof.name(),
                    tx.status,
                ));
            }

            let now = Utc::now();
            tx.proof = Some(ProofReference {
                key: key.clone(),
                url,
                uploaded_at: now,
            });
            tx.record(
                TransactionStatus::ProofUploaded,
                actor,
                Transition::UploadProof.timeline_note(),
                now,
            );
            Ok(outcome(tx, Transition::UploadProof))
        })
    }

    pub fn verify(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> Result<TransitionOutcome, ExchangeError> {
        self.drive(principal, id, Transition::Verify, None, |_| Ok(()))
    }

    /// Mark cash as delivered and bump the lifetime counters
    pub fn complete(
        &self,
        principal: &Principal,
        id: TransactionId,
    ) -> Result<TransitionOutcome, ExchangeError> {
        let result = self.drive(principal, id, Transition::Complete, None, |tx| {
            self.record_completion(tx)
        })?;
        info!(tx = %id, "transaction completed");
        Ok(result)
    }

    /// Cancel from any non-terminal status
    ///
    /// Cancelling a disputed transaction closes its dispute with the
    /// canceller as resolver.
    pub fn cancel(
        &self,
        principal: &Principal,
        id: TransactionId,
        reason: Option<String>,
    ) -> Result<TransitionOutcome, ExchangeError> {
        let notes = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let withdrawal = notes.clone();
        self.drive(principal, id, Transition::Cancel, notes, |tx| {
            self.resolver.withdraw(tx, principal.id, withdrawal.as_deref());
            Ok(())
        })
    }

    pub fn open_dispute(
        &self,
        principal: &Principal,
        id: TransactionId,
        reason: &str,
    ) -> Result<TransitionOutcome, ExchangeError> {
        let tx = self.load(id)?;
        self.guard.authorize_transition(
            principal,
            &tx,
            self.acting_provider(principal),
            Transition::OpenDispute,
        )?;
        let tx = self.resolver.open(&self.ledger, id, principal.id, reason)?;
        info!(tx = %id, opened_by = %principal.id, "dispute opened");
        Ok(outcome(&tx, Transition::OpenDispute))
    }

    /// Close a dispute with an administrator-chosen status
    ///
    /// Resolving into `completed` applies the same counters as a normal
    /// completion.
    pub fn resolve_dispute(
        &self,
        principal: &Principal,
        id: TransactionId,
        request: ResolutionRequest,
    ) -> Result<TransitionOutcome, ExchangeError> {
        self.guard.require_admin(principal, "resolve dispute")?;
        let tx = self.resolver.resolve(&self.ledger, id, principal.id, request, |tx| {
            self.record_completion(tx)
        })?;
        Ok(TransitionOutcome {
            transaction_id: tx.id,
            status: tx.status,
            message: format!("Dispute resolved. Transaction is now {}.", tx.status),
        })
    }

    /// Disputed transactions, most recently updated first
    pub fn list_open_disputes(
        &self,
        principal: &Principal,
    ) -> Result<Vec<TransactionView>, ExchangeError> {
        self.guard.require_admin(principal, "list disputes")?;
        Ok(self
            .ledger
            .list_disputed()
            .iter()
            .map(|tx| TransactionView::project(tx, false))
            .collect())
    }

    // ---------------------------------------------------------------------
    // Providers
    // ---------------------------------------------------------------------

    pub fn create_provider(
        &self,
        principal: &Principal,
        input: NewProvider,
    ) -> Result<Provider, ExchangeError> {
        self.guard.authorize_provider_create(principal)?;
        let provider = self.providers.register(principal.id, input)?;
        info!(provider = %provider.id, owner = %principal.id, "provider profile created");
        Ok(provider)
    }

    /// Available providers near a point, verified first then nearest
    ///
    /// `radius_km` defaults to the configured radius. The returned iterator is
    /// lazy; nothing is read until it is first advanced.
    pub fn find_nearby(
        &self,
        principal: &Principal,
        latitude: f64,
        longitude: f64,
        radius_km: Option<f64>,
        amount: Option<Decimal>,
    ) -> Result<impl Iterator<Item = ProviderView> + '_, ExchangeError> {
        self.guard.require_active(principal, "search providers")?;
        let origin = GeoPoint::new(latitude, longitude)?;
        let radius = radius_km.unwrap_or(self.config.default_radius_km);
        let query = NearbyQuery::new(origin, radius, amount)?;

        Ok(self
            .providers
            .find_nearby(query)
            .map(|hit| ProviderView::project(&hit.provider, hit.distance_km)))
    }

    pub fn get_my_provider(&self, principal: &Principal) -> Result<Provider, ExchangeError> {
        self.guard.require_active(principal, "view provider profile")?;
        self.my_provider(principal)
    }

    pub fn get_provider(&self, id: ProviderId) -> Result<ProviderView, ExchangeError> {
        self.providers
            .get(id)
            .map(|provider| ProviderView::project(&provider, None))
            .ok_or_else(|| ExchangeError::not_found("Provider", id))
    }

    pub fn update_provider(
        &self,
        principal: &Principal,
        id: ProviderId,
        changes: ProviderUpdate,
    ) -> Result<Provider, ExchangeError> {
        let provider = self.load_provider(id)?;
        self.guard
            .authorize_provider_manage(principal, &provider, "update provider")?;
        self.providers.apply_update(id, changes)
    }

    pub fn set_availability(
        &self,
        principal: &Principal,
        id: ProviderId,
        availability: Availability,
    ) -> Result<Provider, ExchangeError> {
        let provider = self.load_provider(id)?;
        self.guard
            .authorize_provider_manage(principal, &provider, "set availability")?;
        let provider = self.providers.set_availability(id, availability)?;
        debug!(provider = %id, available = provider.is_available, "availability changed");
        Ok(provider)
    }

    pub fn verify_provider(
        &self,
        principal: &Principal,
        id: ProviderId,
    ) -> Result<Provider, ExchangeError> {
        self.guard.require_admin(principal, "verify provider")?;
        self.providers.set_verification(id, VerificationStatus::Active)
    }

    pub fn suspend_provider(
        &self,
        principal: &Principal,
        id: ProviderId,
    ) -> Result<Provider, ExchangeError> {
        self.guard.require_admin(principal, "suspend provider")?;
        self.providers.set_verification(id, VerificationStatus::Suspended)
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    pub fn suspend_user(&self, principal: &Principal, id: UserId) -> Result<User, ExchangeError> {
        self.guard.require_admin(principal, "suspend user")?;
        self.users.suspend(id)
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn load(&self, id: TransactionId) -> Result<Transaction, ExchangeError> {
        self.ledger
            .get(id)
            .ok_or_else(|| ExchangeError::not_found("Transaction", id))
    }

    fn load_provider(&self, id: ProviderId) -> Result<Provider, ExchangeError> {
        self.providers
            .get(id)
            .ok_or_else(|| ExchangeError::not_found("Provider", id))
    }

    fn my_provider(&self, principal: &Principal) -> Result<Provider, ExchangeError> {
        self.providers
            .find_by_user(principal.id)
            .ok_or_else(|| ExchangeError::not_found("Provider profile of user", principal.id))
    }

    fn acting_provider(&self, principal: &Principal) -> Option<ProviderId> {
        self.providers
            .find_by_user(principal.id)
            .map(|provider| provider.id)
    }

    /// Authorize on a snapshot, then apply atomically against current state
    fn drive<F>(
        &self,
        principal: &Principal,
        id: TransactionId,
        transition: Transition,
        notes: Option<String>,
        effect: F,
    ) -> Result<TransitionOutcome, ExchangeError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), ExchangeError>,
    {
        let snapshot = self.load(id)?;
        self.guard.authorize_transition(
            principal,
            &snapshot,
            self.acting_provider(principal),
            transition,
        )?;

        let tx = self
            .ledger
            .transition(id, transition, principal.id, notes, effect)?;
        Ok(outcome(&tx, transition))
    }

    /// Lifetime counters for a delivered exchange
    ///
    /// The user is updated inside the provider's critical section so either
    /// both counters move or neither does.
    fn record_completion(&self, tx: &Transaction) -> Result<(), ExchangeError> {
        let amount = tx.commission.requested_amount;
        let now = Utc::now();
        self.providers.update(tx.provider_id, |provider| {
            self.users.update(tx.user_id, |user| {
                user.total_transactions += 1;
                user.updated_at = now;
                Ok(())
            })?;
            provider.total_transactions += 1;
            provider.total_volume += amount;
            provider.updated_at = now;
            Ok(())
        })
    }
}

fn outcome(tx: &Transaction, transition: Transition) -> TransitionOutcome {
    TransitionOutcome {
        transaction_id: tx.id,
        status: tx.status,
        message: transition.confirmation().to_string(),
    }
}

fn is_same_proof(tx: &Transaction, key: &str) -> bool {
    tx.status == TransactionStatus::ProofUploaded
        && tx.proof.as_ref().is_some_and(|proof| proof.key == key)
}

fn already_uploaded(tx: &Transaction) -> TransitionOutcome {
    TransitionOutcome {
        transaction_id: tx.id,
        status: tx.status,
        message: "Proof already uploaded.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorKind, NewUser, Role};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    struct Setup {
        exchange: ExchangeService,
        user: Principal,
        provider_user: Principal,
        provider: Provider,
        admin: Principal,
    }

    fn register(exchange: &ExchangeService, email: &str, role: Role) -> Principal {
        let (_, credential) = exchange
            .users()
            .register(NewUser {
                email: email.to_string(),
                full_name: "Test Person".to_string(),
                phone: None,
                role,
            })
            .unwrap();
        exchange.authenticate(&credential).unwrap()
    }

    fn setup() -> Setup {
        setup_with(ExchangeService::new(EngineConfig::default()))
    }

    fn setup_with(exchange: ExchangeService) -> Setup {
        let user = register(&exchange, "user@example.com", Role::Regular);
        let provider_user = register(&exchange, "shop@example.com", Role::ProviderBusiness);
        let (_, admin_credential) = exchange
            .users()
            .register_admin("admin@example.com", "Admin")
            .unwrap();
        let admin = exchange.authenticate(&admin_credential).unwrap();

        let provider = exchange
            .create_provider(
                &provider_user,
                NewProvider {
                    business_name: "Pulperia La Esquina".to_string(),
                    settlement_account: "88887777".to_string(),
                    settlement_holder_name: "Maria Solis".to_string(),
                    bank_email: "maria@example.com".to_string(),
                    address: None,
                    latitude: 9.9281,
                    longitude: -84.0907,
                    description: None,
                    min_amount: None,
                    max_amount: None,
                },
            )
            .unwrap();
        exchange
            .set_availability(
                &provider_user,
                provider.id,
                Availability {
                    is_available: true,
                    declared_liquidity: Some(dec!(500000)),
                },
            )
            .unwrap();

        Setup {
            exchange,
            user,
            provider_user,
            provider,
            admin,
        }
    }

    fn png(bytes: &[u8]) -> ProofUpload {
        ProofUpload {
            content: bytes.to_vec(),
            mime_type: Some("image/png".to_string()),
            filename: None,
        }
    }

    #[test]
    fn test_create_snapshots_commission_and_settlement() {
        let s = setup();
        let view = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap();

        assert_eq!(view.status, TransactionStatus::Requested);
        assert_eq!(view.commission_amount, dec!(500.00));
        assert_eq!(view.total_to_send, dec!(10500.00));
        assert_eq!(view.settlement.unwrap().account, "88887777");
        assert!(view.code.starts_with("CN-"));
    }

    #[rstest]
    #[case::below_min(dec!(999))]
    #[case::above_max(dec!(100001))]
    #[case::zero(dec!(0))]
    #[case::negative(dec!(-5))]
    fn test_create_rejects_out_of_range(#[case] amount: Decimal) {
        let s = setup();
        let err = s
            .exchange
            .create_transaction(&s.user, s.provider.id, amount)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_create_rejects_unavailable_provider() {
        let s = setup();
        s.exchange
            .set_availability(
                &s.provider_user,
                s.provider.id,
                Availability {
                    is_available: false,
                    declared_liquidity: None,
                },
            )
            .unwrap();

        let err = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(5000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_happy_path_updates_counters() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;

        s.exchange.accept(&s.provider_user, id).unwrap();
        s.exchange.mark_sinpe_sent(&s.user, id).unwrap();
        s.exchange.upload_proof(&s.user, id, png(b"receipt")).unwrap();
        s.exchange.verify(&s.provider_user, id).unwrap();
        let done = s.exchange.complete(&s.provider_user, id).unwrap();

        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(done.message, "Transaction completed!");
        let provider = s.exchange.providers().get(s.provider.id).unwrap();
        assert_eq!(provider.total_transactions, 1);
        assert_eq!(provider.total_volume, dec!(10000));
        assert_eq!(s.exchange.users().get(s.user.id).unwrap().total_transactions, 1);

        let view = s.exchange.get_transaction(&s.user, id).unwrap();
        assert_eq!(view.timeline.len(), 6);
        assert!(view.proof_url.unwrap().starts_with("https://proofs.coinnet.local/proofs/"));
    }

    #[test]
    fn test_wrong_actor_is_forbidden_and_state_kept() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;

        let err = s.exchange.accept(&s.user, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let view = s.exchange.get_transaction(&s.user, id).unwrap();
        assert_eq!(view.status, TransactionStatus::Requested);
        assert_eq!(view.timeline.len(), 1);
    }

    #[test]
    fn test_cancel_from_verified() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        s.exchange.accept(&s.provider_user, id).unwrap();
        s.exchange.upload_proof(&s.user, id, png(b"receipt")).unwrap();
        s.exchange.verify(&s.provider_user, id).unwrap();

        let cancelled = s
            .exchange
            .cancel(&s.user, id, Some("Changed my mind".to_string()))
            .unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);

        let view = s.exchange.get_transaction(&s.user, id).unwrap();
        assert_eq!(view.timeline.last().unwrap().notes, "Changed my mind");
    }

    #[test]
    fn test_proof_upload_is_idempotent_for_same_content() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        s.exchange.accept(&s.provider_user, id).unwrap();

        s.exchange.upload_proof(&s.user, id, png(b"receipt")).unwrap();
        let again = s.exchange.upload_proof(&s.user, id, png(b"receipt")).unwrap();
        assert_eq!(again.status, TransactionStatus::ProofUploaded);
        assert_eq!(again.message, "Proof already uploaded.");

        let different = s
            .exchange
            .upload_proof(&s.user, id, png(b"another receipt"))
            .unwrap_err();
        assert_eq!(different.kind(), ErrorKind::StateConflict);

        let view = s.exchange.get_transaction(&s.user, id).unwrap();
        assert_eq!(view.timeline.len(), 3);
    }

    #[rstest]
    #[case::empty(ProofUpload { content: Vec::new(), mime_type: Some("image/png".to_string()), filename: None })]
    #[case::gif(ProofUpload { content: b"gif".to_vec(), mime_type: Some("image/gif".to_string()), filename: None })]
    #[case::unknown_extension(ProofUpload { content: b"txt".to_vec(), mime_type: None, filename: Some("notes.txt".to_string()) })]
    #[case::no_type(ProofUpload { content: b"x".to_vec(), mime_type: None, filename: None })]
    fn test_invalid_proof_leaves_status(#[case] upload: ProofUpload) {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        s.exchange.accept(&s.provider_user, id).unwrap();

        let err = s.exchange.upload_proof(&s.user, id, upload).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            s.exchange.get_transaction(&s.user, id).unwrap().status,
            TransactionStatus::Accepted
        );
    }

    struct UnreachableStore;

    impl ObjectStore for UnreachableStore {
        fn put(
            &self,
            _key: &str,
            _content: &[u8],
            _mime_type: &str,
        ) -> Result<String, ExchangeError> {
            Err(ExchangeError::external("object store", "bucket unreachable"))
        }
    }

    #[test]
    fn test_store_failure_leaves_transaction_untouched() {
        let users = Arc::new(UserDirectory::new());
        let s = setup_with(ExchangeService::with_collaborators(
            EngineConfig::default(),
            users.clone(),
            users,
            Arc::new(UnreachableStore),
        ));
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        s.exchange.accept(&s.provider_user, id).unwrap();

        let err = s.exchange.upload_proof(&s.user, id, png(b"receipt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);

        let view = s.exchange.get_transaction(&s.user, id).unwrap();
        assert_eq!(view.status, TransactionStatus::Accepted);
        assert_eq!(view.timeline.len(), 2);
        assert!(view.proof_url.is_none());
        assert!(s.exchange.ledger().get(id).unwrap().proof.is_none());
    }

    #[test]
    fn test_proof_key_uses_digest_and_extension() {
        let id = TransactionId::new();
        let key = proof_key(id, b"receipt", "application/pdf");
        assert!(key.starts_with(&format!("proofs/{}/", id)));
        assert!(key.ends_with(".pdf"));
        assert_eq!(key, proof_key(id, b"receipt", "application/pdf"));
        assert_ne!(key, proof_key(id, b"other", "application/pdf"));
    }

    #[test]
    fn test_dispute_resolved_to_completed_counts() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        s.exchange.accept(&s.provider_user, id).unwrap();
        s.exchange.mark_sinpe_sent(&s.user, id).unwrap();
        s.exchange
            .open_dispute(&s.user, id, "Cash never handed over")
            .unwrap();

        let disputes = s.exchange.list_open_disputes(&s.admin).unwrap();
        assert_eq!(disputes.len(), 1);
        assert!(disputes[0].settlement.is_none());

        let err = s
            .exchange
            .resolve_dispute(
                &s.user,
                id,
                ResolutionRequest {
                    final_status: TransactionStatus::Completed,
                    resolution: "Self-serve".to_string(),
                    admin_notes: String::new(),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let resolved = s
            .exchange
            .resolve_dispute(
                &s.admin,
                id,
                ResolutionRequest {
                    final_status: TransactionStatus::Completed,
                    resolution: "Provider showed signed receipt".to_string(),
                    admin_notes: "Closed".to_string(),
                },
            )
            .unwrap();
        assert_eq!(resolved.status, TransactionStatus::Completed);
        assert_eq!(
            s.exchange.providers().get(s.provider.id).unwrap().total_transactions,
            1
        );
        assert!(s.exchange.list_open_disputes(&s.admin).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_closes_open_dispute() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        s.exchange.accept(&s.provider_user, id).unwrap();
        s.exchange
            .open_dispute(&s.user, id, "Provider stopped answering")
            .unwrap();

        let cancelled = s.exchange.cancel(&s.user, id, None).unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);

        let view = s.exchange.get_transaction(&s.user, id).unwrap();
        let dispute = view.dispute.unwrap();
        assert!(!dispute.is_open());
        let resolution = dispute.resolution.unwrap();
        assert_eq!(resolution.final_status, TransactionStatus::Cancelled);
        assert_eq!(resolution.resolved_by, s.user.id);
        assert_eq!(resolution.resolution, Transition::Cancel.timeline_note());
        assert!(s.exchange.list_open_disputes(&s.admin).unwrap().is_empty());
    }

    #[test]
    fn test_pending_queue_requires_profile() {
        let s = setup();
        let err = s.exchange.list_pending_for_provider(&s.user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        s.exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap();
        assert_eq!(
            s.exchange
                .list_pending_for_provider(&s.provider_user)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_stranger_cannot_view() {
        let s = setup();
        let id = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(10000))
            .unwrap()
            .id;
        let stranger = register(&s.exchange, "other@example.com", Role::Regular);

        let err = s.exchange.get_transaction(&stranger, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(s.exchange.get_transaction(&s.admin, id).unwrap().settlement.is_none());
    }

    #[test]
    fn test_find_nearby_uses_default_radius() {
        let s = setup();
        s.exchange.verify_provider(&s.admin, s.provider.id).unwrap();

        let hits: Vec<ProviderView> = s
            .exchange
            .find_nearby(&s.user, 9.93, -84.09, None, Some(dec!(5000)))
            .unwrap()
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].verification_status, VerificationStatus::Active);

        let far: Vec<ProviderView> = s
            .exchange
            .find_nearby(&s.user, 10.5, -84.09, None, None)
            .unwrap()
            .collect();
        assert!(far.is_empty());
    }

    #[test]
    fn test_suspended_provider_cannot_be_requested() {
        let s = setup();
        s.exchange.suspend_provider(&s.admin, s.provider.id).unwrap();

        let err = s
            .exchange
            .create_transaction(&s.user, s.provider.id, dec!(5000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_suspended_user_is_locked_out() {
        let s = setup();
        s.exchange.suspend_user(&s.admin, s.user.id).unwrap();
        let suspended = Principal {
            status: crate::types::AccountStatus::Suspended,
            ..s.user
        };

        let err = s
            .exchange
            .create_transaction(&suspended, s.provider.id, dec!(5000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_only_owner_or_admin_updates_provider() {
        let s = setup();
        let changes = ProviderUpdate {
            description: Some("Open late".to_string()),
            ..ProviderUpdate::default()
        };

        assert!(s
            .exchange
            .update_provider(&s.user, s.provider.id, changes.clone())
            .is_err());
        let updated = s
            .exchange
            .update_provider(&s.admin, s.provider.id, changes)
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("Open late"));
        assert_eq!(updated.settlement_account, "88887777");
    }
}
