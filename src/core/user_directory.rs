//! In-memory user directory
//!
//! Registration and login persistence live outside the exchange core; this
//! directory is the reference adapter the core runs against. It enforces the
//! unique email and sparse-unique phone constraints, issues opaque
//! credentials and resolves them to principals through
//! [`AuthenticationService`].
//!
//! # Thread Safety
//!
//! Users live in a `DashMap`, so updates to different users proceed in
//! parallel and updates to one user are serialized. Uniqueness is enforced by
//! reserving the email and phone keys in their own maps before the user record
//! is inserted; a failed reservation rolls back the ones already taken.

use super::traits::AuthenticationService;
use crate::types::{AccountStatus, ExchangeError, NewUser, Principal, Role, User, UserId};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

/// Thread-safe registry of users and their credentials
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<UserId, User>,
    /// Lowercased email → owner
    emails: DashMap<String, UserId>,
    /// Phone → owner; users without a phone are absent
    phones: DashMap<String, UserId>,
    /// Issued credential → owner
    credentials: DashMap<String, UserId>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `regular` or `provider_business` user
    ///
    /// # Returns
    ///
    /// The stored user and the credential issued for it.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Validation` - malformed input, `superadmin` role, or
    ///   email/phone already registered
    pub fn register(&self, new_user: NewUser) -> Result<(User, String), ExchangeError> {
        if new_user.role == Role::Superadmin {
            return Err(ExchangeError::validation(
                "Administrator accounts cannot self-register",
            ));
        }
        self.insert(new_user)
    }

    /// Seed an administrator account
    pub fn register_admin(
        &self,
        email: &str,
        full_name: &str,
    ) -> Result<(User, String), ExchangeError> {
        self.insert(NewUser {
            email: email.to_string(),
            full_name: full_name.to_string(),
            phone: None,
            role: Role::Superadmin,
        })
    }

    fn insert(&self, new_user: NewUser) -> Result<(User, String), ExchangeError> {
        let email = new_user.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(ExchangeError::validation(format!(
                "Invalid email '{}'",
                new_user.email
            )));
        }
        let full_name = new_user.full_name.trim().to_string();
        if full_name.chars().count() < 2 {
            return Err(ExchangeError::validation(
                "Full name must have at least 2 characters",
            ));
        }
        let phone = new_user
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let id = UserId::new();

        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => {
                return Err(ExchangeError::validation(format!(
                    "Email {} is already registered",
                    email
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        if let Some(phone) = &phone {
            let taken = match self.phones.entry(phone.clone()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(id);
                    false
                }
            };
            if taken {
                self.emails.remove(&email);
                return Err(ExchangeError::validation(format!(
                    "Phone {} is already registered",
                    phone
                )));
            }
        }

        let now = Utc::now();
        let user = User {
            id,
            email,
            full_name,
            phone,
            role: new_user.role,
            status: AccountStatus::Active,
            reputation_score: Decimal::new(50, 1),
            total_transactions: 0,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());

        let credential = Uuid::new_v4().simple().to_string();
        self.credentials.insert(credential.clone(), id);

        debug!(user = %id, role = %user.role, "user registered");
        Ok((user, credential))
    }

    /// Look up a user by id
    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    /// Update a user with a closure (atomic per user)
    ///
    /// The closure runs while the user's entry is locked. If it returns an
    /// error it must not have mutated the user.
    pub fn update<F, T>(&self, id: UserId, f: F) -> Result<T, ExchangeError>
    where
        F: FnOnce(&mut User) -> Result<T, ExchangeError>,
    {
        match self.users.get_mut(&id) {
            Some(mut entry) => f(entry.value_mut()),
            None => Err(ExchangeError::not_found("User", id)),
        }
    }

    /// Mark a user suspended
    ///
    /// Suspension is idempotent. Authorization is the caller's concern.
    pub fn suspend(&self, id: UserId) -> Result<User, ExchangeError> {
        let user = self.update(id, |user| {
            user.status = AccountStatus::Suspended;
            user.updated_at = Utc::now();
            Ok(user.clone())
        })?;
        info!(user = %id, "user suspended");
        Ok(user)
    }
}

impl AuthenticationService for UserDirectory {
    fn authenticate(&self, credential: &str) -> Result<Principal, ExchangeError> {
        let id = self
            .credentials
            .get(credential)
            .map(|entry| *entry.value())
            .ok_or_else(|| ExchangeError::unauthenticated("Invalid or expired credential"))?;

        self.users
            .get(&id)
            .map(|entry| entry.value().principal())
            .ok_or_else(|| ExchangeError::unauthenticated("User no longer exists"))
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
