//! Replay commands
//!
//! A command is one row of a replay script: an action, the handle of the
//! user performing it, and whatever arguments the action takes. Users are
//! addressed by script-local handles, providers by their owner's handle and
//! transactions by the label given when they were requested.

use super::error::ExchangeError;
use super::user::Role;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Replayable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Register,
    RegisterAdmin,
    CreateProvider,
    UpdateProvider,
    SetAvailability,
    VerifyProvider,
    SuspendProvider,
    SuspendUser,
    FindNearby,
    Request,
    Accept,
    SinpeSent,
    UploadProof,
    Verify,
    Complete,
    Cancel,
    Dispute,
    Resolve,
}

impl Action {
    pub const ALL: [Action; 18] = [
        Action::Register,
        Action::RegisterAdmin,
        Action::CreateProvider,
        Action::UpdateProvider,
        Action::SetAvailability,
        Action::VerifyProvider,
        Action::SuspendProvider,
        Action::SuspendUser,
        Action::FindNearby,
        Action::Request,
        Action::Accept,
        Action::SinpeSent,
        Action::UploadProof,
        Action::Verify,
        Action::Complete,
        Action::Cancel,
        Action::Dispute,
        Action::Resolve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::RegisterAdmin => "register-admin",
            Action::CreateProvider => "create-provider",
            Action::UpdateProvider => "update-provider",
            Action::SetAvailability => "set-availability",
            Action::VerifyProvider => "verify-provider",
            Action::SuspendProvider => "suspend-provider",
            Action::SuspendUser => "suspend-user",
            Action::FindNearby => "find-nearby",
            Action::Request => "request",
            Action::Accept => "accept",
            Action::SinpeSent => "sinpe-sent",
            Action::UploadProof => "upload-proof",
            Action::Verify => "verify",
            Action::Complete => "complete",
            Action::Cancel => "cancel",
            Action::Dispute => "dispute",
            Action::Resolve => "resolve",
        }
    }

    /// Whether the action works on a single labelled transaction
    ///
    /// Everything else reads or changes users and providers.
    pub fn is_transaction_scoped(&self) -> bool {
        matches!(
            self,
            Action::Request
                | Action::Accept
                | Action::SinpeSent
                | Action::UploadProof
                | Action::Verify
                | Action::Complete
                | Action::Cancel
                | Action::Dispute
                | Action::Resolve
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| ExchangeError::validation(format!("Unknown action '{}'", s)))
    }
}

/// One parsed script row
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: Action,
    /// Handle of the acting user
    pub actor: String,
    /// Transaction label
    pub tx: Option<String>,
    /// Handle of the user (or provider owner) the action targets
    pub target: Option<String>,
    pub amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
    pub name: Option<String>,
    pub account: Option<String>,
    pub holder: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub status: Option<String>,
    pub text: Option<String>,
}

impl Command {
    /// Start a command for `actor`
    pub fn new(action: Action, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            tx: None,
            target: None,
            amount: None,
            min_amount: None,
            max_amount: None,
            latitude: None,
            longitude: None,
            radius_km: None,
            name: None,
            account: None,
            holder: None,
            email: None,
            role: None,
            status: None,
            text: None,
        }
    }

    /// Transaction label, required by transaction-scoped actions
    pub fn label(&self) -> Result<&str, ExchangeError> {
        self.tx
            .as_deref()
            .ok_or_else(|| ExchangeError::validation("Missing 'tx' column"))
    }

    /// Target handle, falling back to the actor
    pub fn target_or_actor(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.actor)
    }

    pub fn with_tx(mut self, label: impl Into<String>) -> Self {
        self.tx = Some(label.into());
        self
    }

    pub fn with_target(mut self, handle: impl Into<String>) -> Self {
        self.target = Some(handle.into());
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Required-column accessor used by the replay engine
pub fn required<'a, T: ?Sized>(value: Option<&'a T>, column: &str) -> Result<&'a T, ExchangeError> {
    value.ok_or_else(|| ExchangeError::validation(format!("Missing '{}' column", column)))
}
