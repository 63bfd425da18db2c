//! Use-case orchestration.
//!
//! `AuthService` owns the credential flows: registration, login with
//! lockout, refresh-token rotation with breach detection, logout, password
//! rotation, withdrawal, and externally-driven status sync. The OAuth flows
//! live in [`oauth::OAuthService`].
//!
//! Every flow reports its outcome to the configured [`AuditSink`]; the sink
//! is fire-and-forget and can never fail a flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::account::{
    normalize_email, Account, AccountStatus, PasswordPolicy, ProviderType, Role,
};
use crate::audit::{AuditRecord, AuditSink, AuthAction};
use crate::error::AuthError;
use crate::signer::TokenSigner;
use crate::store::{AccountDirectory, SessionStore};
use crate::token::{generate_token_value, SessionToken};

pub mod oauth;


pub use oauth::OAuthService;

/// Successful authentication payload: the identity plus a token pair.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub account_id: Uuid,
    pub email: String,
    pub role: Role,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Read-only account projection for the query surface.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub providers: Vec<ProviderType>,
}

impl AccountInfo {
    fn from_account(account: &Account) -> Self {
        Self {
            id: account.id(),
            email: account.email().to_string(),
            role: account.role(),
            status: account.status(),
            last_login_at: account.last_login_at(),
            providers: account.providers().iter().map(|p| p.provider).collect(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountDirectory>,
    sessions: Arc<dyn SessionStore>,
    signer: Arc<dyn TokenSigner>,
    audit: Arc<dyn AuditSink>,
    policy: PasswordPolicy,
}

impl AuthService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        sessions: Arc<dyn SessionStore>,
        signer: Arc<dyn TokenSigner>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            signer,
            audit,
            policy: PasswordPolicy,
        }
    }

    /// Register a new `(email, role)` account and open a first session.
    ///
    /// # Errors
    /// `EmailAlreadyExists`, `InvalidEmail`, or a password policy error.
    pub async fn register(
        &self,
        email: &str,
        raw_password: &str,
        role: Role,
        device_label: &str,
        remember_me: bool,
    ) -> Result<AuthSession, AuthError> {
        let result = self
            .register_inner(email, raw_password, role, device_label, remember_me)
            .await;
        match &result {
            Ok(session) => {
                self.emit(AuthAction::Registered, Some(session.account_id), Some(role))
                    .await;
            }
            Err(_) => self.emit(AuthAction::RegisterFailed, None, Some(role)).await,
        }
        result
    }

    async fn register_inner(
        &self,
        email: &str,
        raw_password: &str,
        role: Role,
        device_label: &str,
        remember_me: bool,
    ) -> Result<AuthSession, AuthError> {
        let account = Account::register(email, raw_password, role, &self.policy)?;
        self.accounts.insert(&account).await?;
        self.open_session(&account, device_label, remember_me).await
    }

    /// Password login against the `(email, role)` pair.
    ///
    /// An unknown pair and a wrong password both surface as
    /// `InvalidCredentials`, which keeps account enumeration blind. A
    /// mismatch records a failure (and may auto-lock) before the error is
    /// raised.
    ///
    /// # Errors
    /// `InvalidCredentials`, `AccountLocked`, `AccountWithdrawn`.
    pub async fn login(
        &self,
        email: &str,
        raw_password: &str,
        role: Role,
        device_label: &str,
        remember_me: bool,
    ) -> Result<AuthSession, AuthError> {
        let result = self
            .login_inner(email, raw_password, role, device_label, remember_me)
            .await;
        match &result {
            Ok(session) => {
                self.emit(AuthAction::Login, Some(session.account_id), Some(role))
                    .await;
            }
            Err(_) => self.emit(AuthAction::LoginFailed, None, Some(role)).await,
        }
        result
    }

    async fn login_inner(
        &self,
        email: &str,
        raw_password: &str,
        role: Role,
        device_label: &str,
        remember_me: bool,
    ) -> Result<AuthSession, AuthError> {
        let Some(mut account) = self
            .accounts
            .find_by_email_and_role(&normalize_email(email), role)
            .await?
        else {
            return Err(AuthError::InvalidCredentials);
        };

        if !account.verify_credential(raw_password, &self.policy) {
            account.record_login_failure()?;
            self.accounts.update(&account).await?;
            return Err(AuthError::InvalidCredentials);
        }

        account.record_login_success()?;
        self.accounts.update(&account).await?;
        self.open_session(&account, device_label, remember_me).await
    }

    /// Rotate a refresh token and sign a fresh access token.
    ///
    /// Replay of an already-revoked value is treated as evidence of token
    /// theft: every session belonging to the owning account is revoked
    /// before `TokenAlreadyRevoked` is surfaced. A lost rotation race is
    /// handled identically, since the loser observes the same stale value.
    ///
    /// # Errors
    /// `InvalidRefreshToken`, `TokenAlreadyRevoked`, `RefreshTokenExpired`,
    /// `AccountNotFound`.
    pub async fn refresh(&self, refresh_token_value: &str) -> Result<AuthSession, AuthError> {
        let result = self.refresh_inner(refresh_token_value).await;
        match &result {
            Ok(session) => {
                self.emit(
                    AuthAction::TokenRefreshed,
                    Some(session.account_id),
                    Some(session.role),
                )
                .await;
            }
            Err(_) => self.emit(AuthAction::TokenRefreshFailed, None, None).await,
        }
        result
    }

    async fn refresh_inner(&self, refresh_token_value: &str) -> Result<AuthSession, AuthError> {
        let Some(token) = self.sessions.find_by_value(refresh_token_value).await? else {
            return Err(AuthError::InvalidRefreshToken);
        };

        if token.is_revoked() {
            return self.contain_breach(&token).await;
        }
        token.validate_usable()?;

        let Some(account) = self.accounts.find_by_id(token.account_id()).await? else {
            return Err(AuthError::AccountNotFound);
        };

        // Sign before committing the rotation: a signing failure must leave
        // the presented value intact, not strand the caller between values.
        let access = self
            .signer
            .sign_access_token(account.id(), account.role())?;

        let mut rotated = token.clone();
        rotated.rotate(generate_token_value()?)?;
        if !self.sessions.rotate(refresh_token_value, &rotated).await? {
            // Lost the race: someone else already rotated this value away.
            return self.contain_breach(&token).await;
        }

        Ok(AuthSession {
            account_id: account.id(),
            email: account.email().to_string(),
            role: account.role(),
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: rotated.value().to_string(),
            refresh_expires_at: rotated.expires_at(),
        })
    }

    async fn contain_breach(&self, token: &SessionToken) -> Result<AuthSession, AuthError> {
        warn!(
            account_id = %token.account_id(),
            "revoked refresh token replayed, revoking all sessions"
        );
        self.sessions
            .revoke_all_for_account(token.account_id())
            .await?;
        Err(AuthError::TokenAlreadyRevoked)
    }

    /// Revoke one session, or every session for the account.
    ///
    /// A token value that no longer resolves is treated as already logged
    /// out; logout never fails for a missing token.
    ///
    /// # Errors
    /// `Storage` only.
    pub async fn logout(
        &self,
        account_id: Uuid,
        refresh_token_value: &str,
        all_devices: bool,
    ) -> Result<(), AuthError> {
        if all_devices {
            self.sessions.revoke_all_for_account(account_id).await?;
        } else {
            self.sessions.revoke(refresh_token_value).await?;
        }
        self.emit(AuthAction::Logout, Some(account_id), None).await;
        Ok(())
    }

    /// Authenticated password change. Revokes every session: rotating the
    /// credential invalidates all prior logins.
    ///
    /// # Errors
    /// `AccountNotFound`, `InvalidCurrentPassword`, `AccountLocked`,
    /// `AccountWithdrawn`, or a password policy error.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let result = self
            .change_password_inner(account_id, current_password, new_password)
            .await;
        match &result {
            Ok(role) => {
                self.emit(AuthAction::PasswordChanged, Some(account_id), Some(*role))
                    .await;
            }
            Err(_) => {
                self.emit(AuthAction::PasswordChangeFailed, Some(account_id), None)
                    .await;
            }
        }
        result.map(|_| ())
    }

    async fn change_password_inner(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<Role, AuthError> {
        let Some(mut account) = self.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        if !account.verify_credential(current_password, &self.policy) {
            return Err(AuthError::InvalidCurrentPassword);
        }
        account.change_password(new_password, &self.policy)?;
        self.accounts.update(&account).await?;
        self.sessions.revoke_all_for_account(account_id).await?;
        Ok(account.role())
    }

    /// Recovery/administrative password reset. Clears a lock and the
    /// failure count, then revokes every session.
    ///
    /// # Errors
    /// `AccountNotFound`, `AccountWithdrawn`, or a password policy error.
    pub async fn reset_password(
        &self,
        account_id: Uuid,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let Some(mut account) = self.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        account.reset_password(new_password, &self.policy)?;
        self.accounts.update(&account).await?;
        self.sessions.revoke_all_for_account(account_id).await?;
        self.emit(AuthAction::PasswordReset, Some(account_id), Some(account.role()))
            .await;
        Ok(())
    }

    /// Terminal account withdrawal. Verifies the password, marks the
    /// account withdrawn, and hard-deletes its sessions.
    ///
    /// # Errors
    /// `AccountNotFound`, `InvalidCurrentPassword`, `AlreadyWithdrawn`.
    pub async fn withdraw(&self, account_id: Uuid, raw_password: &str) -> Result<(), AuthError> {
        let result = self.withdraw_inner(account_id, raw_password).await;
        match &result {
            Ok(role) => {
                self.emit(AuthAction::Withdrawn, Some(account_id), Some(*role))
                    .await;
            }
            Err(_) => {
                self.emit(AuthAction::WithdrawFailed, Some(account_id), None)
                    .await;
            }
        }
        result.map(|_| ())
    }

    async fn withdraw_inner(
        &self,
        account_id: Uuid,
        raw_password: &str,
    ) -> Result<Role, AuthError> {
        let Some(mut account) = self.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        if !account.verify_credential(raw_password, &self.policy) {
            return Err(AuthError::InvalidCurrentPassword);
        }
        account.withdraw()?;
        self.accounts.update(&account).await?;
        self.sessions.delete_all_for_account(account_id).await?;
        Ok(account.role())
    }

    /// Upstream lifecycle event: the identity was withdrawn elsewhere.
    ///
    /// A missing account is a no-op: the event may race the account's own
    /// deletion.
    ///
    /// # Errors
    /// `Storage` only.
    pub async fn handle_externally_withdrawn(&self, account_id: Uuid) -> Result<(), AuthError> {
        let Some(mut account) = self.accounts.find_by_id(account_id).await? else {
            info!(%account_id, "withdrawn sync for unknown account, skipping");
            return Ok(());
        };
        if account.withdraw().is_err() {
            info!(%account_id, "withdrawn sync for already-withdrawn account");
            return Ok(());
        }
        self.accounts.update(&account).await?;
        self.sessions.delete_all_for_account(account_id).await?;
        self.emit(AuthAction::UserWithdrawnSynced, Some(account_id), None)
            .await;
        Ok(())
    }

    /// Upstream lifecycle event: the identity was suspended elsewhere.
    /// Locks the account and revokes its sessions.
    ///
    /// # Errors
    /// `Storage` only.
    pub async fn handle_externally_suspended(&self, account_id: Uuid) -> Result<(), AuthError> {
        let Some(mut account) = self.accounts.find_by_id(account_id).await? else {
            info!(%account_id, "suspended sync for unknown account, skipping");
            return Ok(());
        };
        if account.lock().is_err() {
            info!(%account_id, "suspended sync for withdrawn account, skipping");
            return Ok(());
        }
        self.accounts.update(&account).await?;
        self.sessions.revoke_all_for_account(account_id).await?;
        self.emit(AuthAction::UserSuspendedSynced, Some(account_id), None)
            .await;
        Ok(())
    }

    /// Upstream lifecycle event: the identity was re-activated elsewhere.
    ///
    /// # Errors
    /// `Storage` only.
    pub async fn handle_externally_activated(&self, account_id: Uuid) -> Result<(), AuthError> {
        let Some(mut account) = self.accounts.find_by_id(account_id).await? else {
            info!(%account_id, "activated sync for unknown account, skipping");
            return Ok(());
        };
        account.unlock();
        self.accounts.update(&account).await?;
        self.emit(AuthAction::UserActivatedSynced, Some(account_id), None)
            .await;
        Ok(())
    }

    /// # Errors
    /// `AccountNotFound`.
    pub async fn account_info(&self, account_id: Uuid) -> Result<AccountInfo, AuthError> {
        let Some(account) = self.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        Ok(AccountInfo::from_account(&account))
    }

    /// # Errors
    /// `Storage` only.
    pub async fn find_by_email_and_role(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<AccountInfo>, AuthError> {
        Ok(self
            .accounts
            .find_by_email_and_role(&normalize_email(email), role)
            .await?
            .as_ref()
            .map(AccountInfo::from_account))
    }

    /// Pre-check for registration forms.
    ///
    /// # Errors
    /// `Storage` only.
    pub async fn email_taken(&self, email: &str, role: Role) -> Result<bool, AuthError> {
        self.accounts
            .exists_by_email_and_role(&normalize_email(email), role)
            .await
    }

    pub(crate) async fn open_session(
        &self,
        account: &Account,
        device_label: &str,
        remember_me: bool,
    ) -> Result<AuthSession, AuthError> {
        let refresh = SessionToken::issue(account.id(), device_label, remember_me)?;
        self.sessions.insert(&refresh).await?;
        let access = self
            .signer
            .sign_access_token(account.id(), account.role())?;
        Ok(AuthSession {
            account_id: account.id(),
            email: account.email().to_string(),
            role: account.role(),
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.value().to_string(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    pub(crate) async fn emit(
        &self,
        action: AuthAction,
        account_id: Option<Uuid>,
        role: Option<Role>,
    ) {
        self.audit
            .record(AuditRecord::of(action, account_id, role))
            .await;
    }
}
