//! Command replay engine
//!
//! Drives an [`ExchangeService`] from script commands. The engine keeps the
//! script-local names a script uses: user handles (mapped to the credential
//! issued at registration) and transaction labels (mapped to the transaction
//! and its owner). Every command authenticates its actor afresh, so a
//! suspension takes effect on the actor's next command.
//!
//! The engine is `Sync`; the async strategy shares one instance across tasks.

use super::dispute_resolver::ResolutionRequest;
use super::exchange::{ExchangeService, ProofUpload};
use super::user_directory::UserDirectory;
use crate::config::EngineConfig;
use crate::types::command::required;
use crate::types::{
    Action, Availability, Command, ExchangeError, NewProvider, NewUser, Principal, Provider,
    ProviderUpdate, Role, TransactionId, TransactionStatus, TransitionOutcome, User, UserId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

/// A labelled transaction as the script knows it
#[derive(Debug, Clone, PartialEq, Eq)]
struct Labelled {
    id: TransactionId,
    owner: String,
    provider_owner: String,
}

/// Final state of one labelled transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRow {
    pub label: String,
    pub code: String,
    pub user: String,
    pub provider: String,
    pub status: TransactionStatus,
    pub requested: Decimal,
    pub commission: Decimal,
    pub total: Decimal,
    /// Timeline length
    pub events: usize,
    /// `none`, `open` or `resolved`
    pub dispute: &'static str,
}

/// Replays commands against one exchange context
pub struct ReplayEngine {
    exchange: ExchangeService,
    /// Handle → credential
    credentials: DashMap<String, String>,
    /// Handle → user id
    handles: DashMap<String, UserId>,
    /// Label → transaction
    labels: DashMap<String, Labelled>,
}

impl ReplayEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_exchange(ExchangeService::new(config))
    }

    pub fn with_exchange(exchange: ExchangeService) -> Self {
        Self {
            exchange,
            credentials: DashMap::new(),
            handles: DashMap::new(),
            labels: DashMap::new(),
        }
    }

    pub fn exchange(&self) -> &ExchangeService {
        &self.exchange
    }

    /// Handle of the user that owns the transaction labelled `label`
    pub fn label_owner(&self, label: &str) -> Option<String> {
        self.labels.get(label).map(|entry| entry.owner.clone())
    }

    /// Transaction behind a label
    pub fn transaction_id(&self, label: &str) -> Option<TransactionId> {
        self.labels.get(label).map(|entry| entry.id)
    }

    /// Execute one command
    ///
    /// # Returns
    ///
    /// The confirmation message of the operation the command mapped to.
    pub fn execute(&self, command: &Command) -> Result<String, ExchangeError> {
        let message = match command.action {
            Action::Register => self.register(command),
            Action::RegisterAdmin => self.register_admin(command),
            Action::CreateProvider => self.create_provider(command),
            Action::UpdateProvider => self.update_provider(command),
            Action::SetAvailability => self.set_availability(command),
            Action::VerifyProvider => {
                let admin = self.principal(&command.actor)?;
                let provider = self.provider_of(required(command.target.as_deref(), "target")?)?;
                let provider = self.exchange.verify_provider(&admin, provider.id)?;
                Ok(format!("Provider {} verified", provider.business_name))
            }
            Action::SuspendProvider => {
                let admin = self.principal(&command.actor)?;
                let provider = self.provider_of(required(command.target.as_deref(), "target")?)?;
                let provider = self.exchange.suspend_provider(&admin, provider.id)?;
                Ok(format!("Provider {} suspended", provider.business_name))
            }
            Action::SuspendUser => {
                let admin = self.principal(&command.actor)?;
                let target = required(command.target.as_deref(), "target")?;
                let user = self.user_id(target)?;
                self.exchange.suspend_user(&admin, user)?;
                Ok(format!("User {} suspended", target))
            }
            Action::FindNearby => self.find_nearby(command),
            Action::Request => self.request(command),
            Action::Accept => self.on_label(command, |p, id| self.exchange.accept(p, id)),
            Action::SinpeSent => self.on_label(command, |p, id| self.exchange.mark_sinpe_sent(p, id)),
            Action::UploadProof => {
                let upload = ProofUpload {
                    content: command.text.clone().unwrap_or_default().into_bytes(),
                    mime_type: None,
                    filename: Some(required(command.name.as_deref(), "name")?.to_string()),
                };
                self.on_label(command, |p, id| self.exchange.upload_proof(p, id, upload))
            }
            Action::Verify => self.on_label(command, |p, id| self.exchange.verify(p, id)),
            Action::Complete => self.on_label(command, |p, id| self.exchange.complete(p, id)),
            Action::Cancel => self.on_label(command, |p, id| {
                self.exchange.cancel(p, id, command.text.clone())
            }),
            Action::Dispute => {
                let reason = command.text.clone().unwrap_or_default();
                self.on_label(command, |p, id| self.exchange.open_dispute(p, id, &reason))
            }
            Action::Resolve => {
                let final_status: TransactionStatus =
                    required(command.status.as_deref(), "status")?.parse()?;
                let request = ResolutionRequest {
                    final_status,
                    resolution: command.text.clone().unwrap_or_default(),
                    admin_notes: String::new(),
                };
                self.on_label(command, |p, id| self.exchange.resolve_dispute(p, id, request))
            }
        }?;

        debug!(action = %command.action, actor = %command.actor, "command applied");
        Ok(message)
    }

    /// Final state of every labelled transaction, sorted by label
    pub fn rows(&self) -> Vec<ReplayRow> {
        let mut rows: Vec<ReplayRow> = self
            .labels
            .iter()
            .filter_map(|entry| {
                let tx = self.exchange.ledger().get(entry.value().id)?;
                let dispute = match &tx.dispute {
                    None => "none",
                    Some(dispute) if dispute.is_open() => "open",
                    Some(_) => "resolved",
                };
                Some(ReplayRow {
                    label: entry.key().clone(),
                    code: tx.code.clone(),
                    user: entry.value().owner.clone(),
                    provider: entry.value().provider_owner.clone(),
                    status: tx.status,
                    requested: tx.commission.requested_amount,
                    commission: tx.commission.commission,
                    total: tx.commission.total,
                    events: tx.timeline.len(),
                    dispute,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.label.cmp(&b.label));
        rows
    }

    fn register(&self, command: &Command) -> Result<String, ExchangeError> {
        let handle = command.actor.as_str();
        let new_user = NewUser {
            email: self.email_for(command),
            full_name: command.name.clone().unwrap_or_else(|| handle.to_string()),
            phone: None,
            role: command.role.unwrap_or(Role::Regular),
        };
        self.claim_handle(handle, |users| users.register(new_user))?;
        Ok(format!("Registered {}", handle))
    }

    fn register_admin(&self, command: &Command) -> Result<String, ExchangeError> {
        let handle = command.actor.as_str();
        let email = self.email_for(command);
        let name = command.name.clone().unwrap_or_else(|| handle.to_string());
        self.claim_handle(handle, |users| users.register_admin(&email, &name))?;
        Ok(format!("Registered administrator {}", handle))
    }

    /// Bind `handle` to the user created by `register`
    fn claim_handle<F>(&self, handle: &str, register: F) -> Result<(), ExchangeError>
    where
        F: FnOnce(&UserDirectory) -> Result<(User, String), ExchangeError>,
    {
        match self.credentials.entry(handle.to_string()) {
            Entry::Occupied(_) => Err(ExchangeError::validation(format!(
                "Handle '{}' is already registered",
                handle
            ))),
            Entry::Vacant(slot) => {
                let (user, credential) = register(self.exchange.users())?;
                self.handles.insert(handle.to_string(), user.id);
                slot.insert(credential);
                Ok(())
            }
        }
    }

    fn email_for(&self, command: &Command) -> String {
        command
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@replay.local", command.actor))
    }

    fn create_provider(&self, command: &Command) -> Result<String, ExchangeError> {
        let principal = self.principal(&command.actor)?;
        let input = NewProvider {
            business_name: required(command.name.as_deref(), "name")?.to_string(),
            settlement_account: required(command.account.as_deref(), "account")?.to_string(),
            settlement_holder_name: required(command.holder.as_deref(), "holder")?.to_string(),
            bank_email: command.email.clone().unwrap_or_default(),
            address: None,
            latitude: *required(command.latitude.as_ref(), "latitude")?,
            longitude: *required(command.longitude.as_ref(), "longitude")?,
            description: command.text.clone(),
            min_amount: command.min_amount,
            max_amount: command.max_amount,
        };
        let provider = self.exchange.create_provider(&principal, input)?;
        Ok(format!("Provider {} created", provider.business_name))
    }

    fn update_provider(&self, command: &Command) -> Result<String, ExchangeError> {
        let principal = self.principal(&command.actor)?;
        let provider = self.provider_of(command.target_or_actor())?;
        let changes = ProviderUpdate {
            business_name: command.name.clone(),
            settlement_holder_name: command.holder.clone(),
            bank_email: command.email.clone(),
            address: None,
            latitude: command.latitude,
            longitude: command.longitude,
            description: command.text.clone(),
            min_amount: command.min_amount,
            max_amount: command.max_amount,
            declared_liquidity: command.amount,
        };
        let provider = self
            .exchange
            .update_provider(&principal, provider.id, changes)?;
        Ok(format!("Provider {} updated", provider.business_name))
    }

    fn set_availability(&self, command: &Command) -> Result<String, ExchangeError> {
        let principal = self.principal(&command.actor)?;
        let provider = self.provider_of(command.target_or_actor())?;
        let is_available = parse_flag(required(command.status.as_deref(), "status")?)?;
        let provider = self.exchange.set_availability(
            &principal,
            provider.id,
            Availability {
                is_available,
                declared_liquidity: command.amount,
            },
        )?;
        Ok(format!(
            "Provider {} is {}",
            provider.business_name,
            if provider.is_available { "online" } else { "offline" }
        ))
    }

    fn find_nearby(&self, command: &Command) -> Result<String, ExchangeError> {
        let principal = self.principal(&command.actor)?;
        let names: Vec<String> = self
            .exchange
            .find_nearby(
                &principal,
                *required(command.latitude.as_ref(), "latitude")?,
                *required(command.longitude.as_ref(), "longitude")?,
                command.radius_km,
                command.amount,
            )?
            .map(|view| view.business_name)
            .collect();
        Ok(format!("{} providers nearby: {}", names.len(), names.join(", ")))
    }

    fn request(&self, command: &Command) -> Result<String, ExchangeError> {
        let label = command.label()?;
        let principal = self.principal(&command.actor)?;
        let provider_owner = required(command.target.as_deref(), "target")?;
        let provider = self.provider_of(provider_owner)?;
        let amount = *required(command.amount.as_ref(), "amount")?;

        match self.labels.entry(label.to_string()) {
            Entry::Occupied(_) => Err(ExchangeError::validation(format!(
                "Label '{}' is already used",
                label
            ))),
            Entry::Vacant(slot) => {
                let view = self
                    .exchange
                    .create_transaction(&principal, provider.id, amount)?;
                slot.insert(Labelled {
                    id: view.id,
                    owner: command.actor.clone(),
                    provider_owner: provider_owner.to_string(),
                });
                Ok(format!(
                    "Requested {} as {}; send {}",
                    view.requested_amount, view.code, view.total_to_send
                ))
            }
        }
    }

    /// Run a transaction operation on the command's label
    fn on_label<F>(&self, command: &Command, operation: F) -> Result<String, ExchangeError>
    where
        F: FnOnce(&Principal, TransactionId) -> Result<TransitionOutcome, ExchangeError>,
    {
        let label = command.label()?;
        let id = self
            .transaction_id(label)
            .ok_or_else(|| ExchangeError::not_found("Transaction label", label))?;
        let principal = self.principal(&command.actor)?;
        let outcome = operation(&principal, id)?;
        Ok(outcome.message)
    }

    fn principal(&self, handle: &str) -> Result<Principal, ExchangeError> {
        let credential = self
            .credentials
            .get(handle)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ExchangeError::not_found("User handle", handle))?;
        self.exchange.authenticate(&credential)
    }

    fn user_id(&self, handle: &str) -> Result<UserId, ExchangeError> {
        self.handles
            .get(handle)
            .map(|entry| *entry.value())
            .ok_or_else(|| ExchangeError::not_found("User handle", handle))
    }

    fn provider_of(&self, handle: &str) -> Result<Provider, ExchangeError> {
        let user = self.user_id(handle)?;
        self.exchange
            .providers()
            .find_by_user(user)
            .ok_or_else(|| ExchangeError::not_found("Provider of", handle))
    }
}

fn parse_flag(value: &str) -> Result<bool, ExchangeError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "online" | "yes" | "1" => Ok(true),
        "false" | "offline" | "no" | "0" => Ok(false),
        other => Err(ExchangeError::validation(format!(
            "Expected true or false, got '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use rust_decimal_macros::dec;

    fn seeded() -> ReplayEngine {
        let engine = ReplayEngine::new(EngineConfig::default());
        let mut shop = Command::new(Action::Register, "shop");
        shop.role = Some(Role::ProviderBusiness);
        let mut provider = Command::new(Action::CreateProvider, "shop").with_location(9.9281, -84.0907);
        provider.name = Some("Pulperia Central".to_string());
        provider.account = Some("88887777".to_string());
        provider.holder = Some("Maria Solis".to_string());

        for command in [
            Command::new(Action::RegisterAdmin, "root"),
            Command::new(Action::Register, "ana"),
            shop,
            provider,
            Command::new(Action::SetAvailability, "shop").with_status("true"),
        ] {
            engine.execute(&command).unwrap();
        }
        engine
    }

    fn request(label: &str) -> Command {
        Command::new(Action::Request, "ana")
            .with_tx(label)
            .with_target("shop")
            .with_amount(dec!(10000))
    }

    #[test]
    fn test_request_binds_label() {
        let engine = seeded();
        let message = engine.execute(&request("t1")).unwrap();

        assert!(message.contains("send 10500.00"), "{}", message);
        assert_eq!(engine.label_owner("t1").as_deref(), Some("ana"));
        assert!(engine.transaction_id("t1").is_some());
    }

    #[test]
    fn test_duplicate_label_is_rejected() {
        let engine = seeded();
        engine.execute(&request("t1")).unwrap();
        let err = engine.execute(&request("t1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(engine.exchange().ledger().all().len(), 1);
    }

    #[test]
    fn test_full_lifecycle_rows() {
        let engine = seeded();
        engine.execute(&request("t1")).unwrap();
        let mut proof = Command::new(Action::UploadProof, "ana")
            .with_tx("t1")
            .with_text("receipt 0042");
        proof.name = Some("receipt.png".to_string());

        for command in [
            Command::new(Action::Accept, "shop").with_tx("t1"),
            Command::new(Action::SinpeSent, "ana").with_tx("t1"),
            proof,
            Command::new(Action::Verify, "shop").with_tx("t1"),
            Command::new(Action::Complete, "shop").with_tx("t1"),
        ] {
            engine.execute(&command).unwrap();
        }

        let rows = engine.rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.label, "t1");
        assert_eq!(row.user, "ana");
        assert_eq!(row.provider, "shop");
        assert_eq!(row.status, TransactionStatus::Completed);
        assert_eq!(row.commission, dec!(500.00));
        assert_eq!(row.events, 6);
        assert_eq!(row.dispute, "none");
    }

    #[test]
    fn test_dispute_and_resolve() {
        let engine = seeded();
        engine.execute(&request("t1")).unwrap();
        engine
            .execute(&Command::new(Action::Dispute, "ana").with_tx("t1").with_text("Provider closed the shop"))
            .unwrap();
        assert_eq!(engine.rows()[0].dispute, "open");

        engine
            .execute(
                &Command::new(Action::Resolve, "root")
                    .with_tx("t1")
                    .with_status("cancelled")
                    .with_text("Refunded"),
            )
            .unwrap();
        let row = &engine.rows()[0];
        assert_eq!(row.status, TransactionStatus::Cancelled);
        assert_eq!(row.dispute, "resolved");
        assert_eq!(row.events, 3);
    }

    #[test]
    fn test_cancel_while_disputed_shows_resolved() {
        let engine = seeded();
        engine.execute(&request("t1")).unwrap();
        engine
            .execute(&Command::new(Action::Dispute, "ana").with_tx("t1").with_text("Provider closed the shop"))
            .unwrap();
        engine
            .execute(&Command::new(Action::Cancel, "ana").with_tx("t1"))
            .unwrap();

        let row = &engine.rows()[0];
        assert_eq!(row.status, TransactionStatus::Cancelled);
        assert_eq!(row.dispute, "resolved");
        assert_eq!(row.events, 3);
    }

    #[test]
    fn test_unknown_handles_and_labels() {
        let engine = seeded();
        let err = engine
            .execute(&Command::new(Action::Accept, "shop").with_tx("missing"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine
            .execute(&Command::new(Action::Register, "ana"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = engine
            .execute(&Command::new(Action::FindNearby, "ghost").with_location(0.0, 0.0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_suspended_actor_is_rejected_next_command() {
        let engine = seeded();
        engine
            .execute(&Command::new(Action::SuspendUser, "root").with_target("ana"))
            .unwrap();
        let err = engine.execute(&request("t1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_find_nearby_lists_names() {
        let engine = seeded();
        let message = engine
            .execute(&Command::new(Action::FindNearby, "ana").with_location(9.93, -84.09))
            .unwrap();
        assert_eq!(message, "1 providers nearby: Pulperia Central");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("offline").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
