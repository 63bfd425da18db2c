//! Audit trail emission.
//!
//! Every use case reports its outcome to an [`AuditSink`]. Emission is
//! fire-and-forget: a sink failure must never abort the primary operation,
//! so the trait is infallible and implementations log their own errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::account::Role;

/// Action catalogue for the audit trail. Success and failure are distinct
/// actions so downstream consumers can alert on failure rates directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Registered,
    RegisterFailed,
    OauthRegistered,
    OauthRegisterFailed,
    Login,
    LoginFailed,
    OauthLogin,
    OauthLoginFailed,
    Logout,
    TokenRefreshed,
    TokenRefreshFailed,
    PasswordChanged,
    PasswordChangeFailed,
    PasswordReset,
    Withdrawn,
    WithdrawFailed,
    ProviderLinked,
    ProviderLinkFailed,
    ProviderUnlinked,
    ProviderUnlinkFailed,
    UserWithdrawnSynced,
    UserSuspendedSynced,
    UserActivatedSynced,
}

impl AuthAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::RegisterFailed => "REGISTER_FAILED",
            Self::OauthRegistered => "OAUTH_REGISTERED",
            Self::OauthRegisterFailed => "OAUTH_REGISTER_FAILED",
            Self::Login => "LOGIN",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::OauthLogin => "OAUTH_LOGIN",
            Self::OauthLoginFailed => "OAUTH_LOGIN_FAILED",
            Self::Logout => "LOGOUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::PasswordChangeFailed => "PASSWORD_CHANGE_FAILED",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::Withdrawn => "WITHDRAWN",
            Self::WithdrawFailed => "WITHDRAW_FAILED",
            Self::ProviderLinked => "PROVIDER_LINKED",
            Self::ProviderLinkFailed => "PROVIDER_LINK_FAILED",
            Self::ProviderUnlinked => "PROVIDER_UNLINKED",
            Self::ProviderUnlinkFailed => "PROVIDER_UNLINK_FAILED",
            Self::UserWithdrawnSynced => "USER_WITHDRAWN_SYNCED",
            Self::UserSuspendedSynced => "USER_SUSPENDED_SYNCED",
            Self::UserActivatedSynced => "USER_ACTIVATED_SYNCED",
        }
    }
}

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Customer,
    Seller,
    Admin,
    System,
}

impl ActorType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Seller => "SELLER",
            Self::Admin => "ADMIN",
            Self::System => "SYSTEM",
        }
    }

    #[must_use]
    pub fn from_role(role: Role) -> Self {
        match role {
            Role::Customer => Self::Customer,
            Role::Seller => Self::Seller,
            Role::Admin => Self::Admin,
        }
    }
}

/// One audit record. `account_id` is absent when the action failed before
/// an account could be resolved.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub account_id: Option<Uuid>,
    pub role: Option<Role>,
    pub action: AuthAction,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// An action performed by the account itself (or anonymously, before
    /// resolution).
    #[must_use]
    pub fn of(action: AuthAction, account_id: Option<Uuid>, role: Option<Role>) -> Self {
        let actor_type = role.map_or(ActorType::System, ActorType::from_role);
        Self {
            account_id,
            role,
            action,
            actor_type,
            actor_id: account_id,
            occurred_at: Utc::now(),
        }
    }

    /// An action performed by the platform (seeding, status sync).
    #[must_use]
    pub fn system(action: AuthAction, account_id: Option<Uuid>) -> Self {
        Self {
            account_id,
            role: None,
            action,
            actor_type: ActorType::System,
            actor_id: None,
            occurred_at: Utc::now(),
        }
    }
}

/// Receives audit records. Implementations must swallow their own failures.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Default sink: structured tracing events, picked up by whatever log
/// shipping the embedding service runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        info!(
            action = record.action.as_str(),
            account_id = record.account_id.map(|id| id.to_string()),
            role = record.role.map(|role| role.as_str()),
            actor_type = record.actor_type.as_str(),
            actor_id = record.actor_id.map(|id| id.to_string()),
            occurred_at = %record.occurred_at,
            "auth audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_are_stable() {
        assert_eq!(AuthAction::Registered.as_str(), "REGISTERED");
        assert_eq!(AuthAction::TokenRefreshFailed.as_str(), "TOKEN_REFRESH_FAILED");
        assert_eq!(AuthAction::UserSuspendedSynced.as_str(), "USER_SUSPENDED_SYNCED");
    }

    #[test]
    fn actor_defaults_to_system_without_a_role() {
        let record = AuditRecord::of(AuthAction::LoginFailed, None, None);
        assert_eq!(record.actor_type, ActorType::System);
        assert!(record.actor_id.is_none());

        let id = Uuid::new_v4();
        let record = AuditRecord::of(AuthAction::Login, Some(id), Some(Role::Seller));
        assert_eq!(record.actor_type, ActorType::Seller);
        assert_eq!(record.actor_id, Some(id));
    }
}
