//! The `Account` aggregate and its value objects.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::password::{PasswordHash, PasswordPolicy};
use crate::error::AuthError;

/// Consecutive login failures that lock an account.
pub const MAX_LOGIN_FAILURES: u32 = 5;

/// Account class. The same email may exist once per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Seller => "SELLER",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse the persisted textual value.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "CUSTOMER" => Ok(Self::Customer),
            "SELLER" => Ok(Self::Seller),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(AuthError::storage(anyhow::anyhow!(
                "invalid role value: {value}"
            ))),
        }
    }

    #[must_use]
    pub fn is_customer(&self) -> bool {
        matches!(self, Self::Customer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Social sign-in provider. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Kakao,
    Naver,
    Google,
}

impl ProviderType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kakao => "KAKAO",
            Self::Naver => "NAVER",
            Self::Google => "GOOGLE",
        }
    }

    /// Parse the persisted textual value.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "KAKAO" => Ok(Self::Kakao),
            "NAVER" => Ok(Self::Naver),
            "GOOGLE" => Ok(Self::Google),
            _ => Err(AuthError::storage(anyhow::anyhow!(
                "invalid provider value: {value}"
            ))),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an account.
///
/// ```text
/// active <──> locked
///    │           │
///    └── withdrawn (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Locked,
    Withdrawn,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Locked => "LOCKED",
            Self::Withdrawn => "WITHDRAWN",
        }
    }

    /// Parse the persisted textual value.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "LOCKED" => Ok(Self::Locked),
            "WITHDRAWN" => Ok(Self::Withdrawn),
            _ => Err(AuthError::storage(anyhow::anyhow!(
                "invalid status value: {value}"
            ))),
        }
    }

    /// Whether the state machine allows a transition to `target`.
    #[must_use]
    pub fn can_change_to(&self, target: Self) -> bool {
        if *self == target {
            return false;
        }
        match self {
            Self::Active => matches!(target, Self::Locked | Self::Withdrawn),
            Self::Locked => matches!(target, Self::Active),
            Self::Withdrawn => false,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }

    #[must_use]
    pub fn is_withdrawn(&self) -> bool {
        matches!(self, Self::Withdrawn)
    }
}

/// One social-provider linkage, owned by its account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIdentity {
    pub provider: ProviderType,
    pub provider_user_id: String,
    pub connected_at: DateTime<Utc>,
}

impl LinkedIdentity {
    #[must_use]
    pub fn new(provider: ProviderType, provider_user_id: String) -> Self {
        Self {
            provider,
            provider_user_id,
            connected_at: Utc::now(),
        }
    }
}

/// The authentication identity aggregate.
///
/// Not the business "user" profile, which lives elsewhere on the platform.
/// All mutations go through methods so the state machine stays consistent;
/// stores rebuild instances with [`Account::restore`].
#[derive(Debug, Clone)]
pub struct Account {
    id: Uuid,
    email: String,
    role: Role,
    password: PasswordHash,
    status: AccountStatus,
    failed_login_count: u32,
    last_login_at: Option<DateTime<Utc>>,
    providers: Vec<LinkedIdentity>,
}

impl Account {
    /// Self-service registration.
    ///
    /// # Errors
    /// `InvalidEmail` for a blank or malformed email; password policy errors.
    pub fn register(
        email: &str,
        raw_password: &str,
        role: Role,
        policy: &PasswordPolicy,
    ) -> Result<Self, AuthError> {
        validate_email(email)?;
        let password = policy.hash(raw_password)?;
        Ok(Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            role,
            password,
            status: AccountStatus::Active,
            failed_login_count: 0,
            last_login_at: None,
            providers: Vec::new(),
        })
    }

    /// Registration through a social provider.
    ///
    /// Only customer accounts may link a provider, and a password is still
    /// mandatory so a non-social login path exists from day one. The linkage
    /// is attached atomically with creation.
    ///
    /// # Errors
    /// `OauthNotAllowedForRole` for non-customer roles; otherwise as
    /// [`Self::register`].
    pub fn register_with_oauth(
        email: &str,
        raw_password: &str,
        role: Role,
        provider: ProviderType,
        provider_user_id: &str,
        policy: &PasswordPolicy,
    ) -> Result<Self, AuthError> {
        if !role.is_customer() {
            return Err(AuthError::OauthNotAllowedForRole(role));
        }
        let mut account = Self::register(email, raw_password, role, policy)?;
        account
            .providers
            .push(LinkedIdentity::new(provider, provider_user_id.to_string()));
        Ok(account)
    }

    /// Rebuild an account from persisted state. For store implementations.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn restore(
        id: Uuid,
        email: String,
        role: Role,
        password: PasswordHash,
        status: AccountStatus,
        failed_login_count: u32,
        last_login_at: Option<DateTime<Utc>>,
        providers: Vec<LinkedIdentity>,
    ) -> Self {
        Self {
            id,
            email,
            role,
            password,
            status,
            failed_login_count,
            last_login_at,
            providers,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn password(&self) -> &PasswordHash {
        &self.password
    }

    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    #[must_use]
    pub fn failed_login_count(&self) -> u32 {
        self.failed_login_count
    }

    #[must_use]
    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    #[must_use]
    pub fn providers(&self) -> &[LinkedIdentity] {
        &self.providers
    }

    /// Compare a raw password against the stored credential.
    ///
    /// False when no hash is set; never an error.
    #[must_use]
    pub fn verify_credential(&self, raw: &str, policy: &PasswordPolicy) -> bool {
        if !self.password.has_value() {
            return false;
        }
        policy.verify(raw, &self.password)
    }

    /// Record a successful credential check: reset the failure count and
    /// stamp the login time.
    ///
    /// # Errors
    /// `AccountLocked` / `AccountWithdrawn` when the account is not active.
    pub fn record_login_success(&mut self) -> Result<(), AuthError> {
        self.ensure_can_login()?;
        self.failed_login_count = 0;
        self.last_login_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failed credential check, auto-locking at the threshold.
    ///
    /// Incrementing never errors — callers log every failed attempt
    /// uniformly, locked accounts included. Only withdrawal blocks it.
    ///
    /// # Errors
    /// `AccountWithdrawn`.
    pub fn record_login_failure(&mut self) -> Result<(), AuthError> {
        self.ensure_not_withdrawn()?;
        self.failed_login_count += 1;
        if self.failed_login_count >= MAX_LOGIN_FAILURES {
            self.status = AccountStatus::Locked;
        }
        Ok(())
    }

    /// Authenticated self-service password change. Mirrors the login guard:
    /// locked accounts cannot rotate their own credential.
    ///
    /// # Errors
    /// `AccountLocked` / `AccountWithdrawn`; password policy errors.
    pub fn change_password(
        &mut self,
        raw_password: &str,
        policy: &PasswordPolicy,
    ) -> Result<(), AuthError> {
        self.ensure_can_login()?;
        self.password = policy.hash(raw_password)?;
        Ok(())
    }

    /// Administrative/recovery reset: also clears a lock and the failure
    /// count, unlike [`Self::change_password`].
    ///
    /// # Errors
    /// `AccountWithdrawn`; password policy errors.
    pub fn reset_password(
        &mut self,
        raw_password: &str,
        policy: &PasswordPolicy,
    ) -> Result<(), AuthError> {
        self.ensure_not_withdrawn()?;
        self.password = policy.hash(raw_password)?;
        self.status = AccountStatus::Active;
        self.failed_login_count = 0;
        Ok(())
    }

    /// # Errors
    /// `AccountWithdrawn`.
    pub fn lock(&mut self) -> Result<(), AuthError> {
        self.ensure_not_withdrawn()?;
        self.status = AccountStatus::Locked;
        Ok(())
    }

    /// Clear a lock and the failure count. No-op unless locked.
    pub fn unlock(&mut self) {
        if !self.status.is_locked() {
            return;
        }
        self.status = AccountStatus::Active;
        self.failed_login_count = 0;
    }

    /// Terminal soft delete.
    ///
    /// # Errors
    /// `AlreadyWithdrawn` on a second withdrawal.
    pub fn withdraw(&mut self) -> Result<(), AuthError> {
        if self.status.is_withdrawn() {
            return Err(AuthError::AlreadyWithdrawn);
        }
        self.status = AccountStatus::Withdrawn;
        Ok(())
    }

    /// Link a social provider. At most one linkage per provider type.
    ///
    /// # Errors
    /// `OauthNotAllowedForRole`, `AccountWithdrawn`, or
    /// `ProviderAlreadyConnected`.
    pub fn connect_provider(
        &mut self,
        provider: ProviderType,
        provider_user_id: &str,
    ) -> Result<(), AuthError> {
        if !self.role.is_customer() {
            return Err(AuthError::OauthNotAllowedForRole(self.role));
        }
        self.ensure_not_withdrawn()?;
        if self.has_provider(provider) {
            return Err(AuthError::ProviderAlreadyConnected(provider));
        }
        self.providers
            .push(LinkedIdentity::new(provider, provider_user_id.to_string()));
        Ok(())
    }

    /// Remove a provider linkage. Idempotent.
    ///
    /// Removing the last linkage is always safe: the password fallback
    /// login path remains.
    ///
    /// # Errors
    /// `AccountWithdrawn`.
    pub fn disconnect_provider(&mut self, provider: ProviderType) -> Result<(), AuthError> {
        self.ensure_not_withdrawn()?;
        self.providers.retain(|p| p.provider != provider);
        Ok(())
    }

    #[must_use]
    pub fn has_provider(&self, provider: ProviderType) -> bool {
        self.providers.iter().any(|p| p.provider == provider)
    }

    fn ensure_can_login(&self) -> Result<(), AuthError> {
        if self.status.is_locked() {
            return Err(AuthError::AccountLocked);
        }
        if self.status.is_withdrawn() {
            return Err(AuthError::AccountWithdrawn);
        }
        Ok(())
    }

    fn ensure_not_withdrawn(&self) -> Result<(), AuthError> {
        if self.status.is_withdrawn() {
            return Err(AuthError::AccountWithdrawn);
        }
        Ok(())
    }
}

/// Canonical form of an email for storage and lookups. Accounts store
/// emails normalized, so every store query must pass through here too.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let normalized = email.trim();
    if normalized.is_empty() {
        return Err(AuthError::InvalidEmail);
    }
    let well_formed = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .is_ok_and(|regex| regex.is_match(&normalized.to_lowercase()));
    if !well_formed {
        return Err(AuthError::InvalidEmail);
    }
    Ok(())
}
