//! OAuth login and account-linking flows.
//!
//! The redirect round trip carries an encoded [`OAuthState`] through the
//! provider; the callback decodes it and either links the external identity
//! to an existing account or resolves an account to log in, in strict
//! precedence order: existing linkage, then existing customer account by
//! email, then first-time registration.

use std::sync::Arc;

use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::account::{normalize_email, Account, ProviderType, Role};
use crate::audit::AuthAction;
use crate::error::AuthError;
use crate::oauth::{IdentityProvider, OAuthState, ProviderUserInfo};
use crate::service::{AuthService, AuthSession};

/// What a callback resolved to: a login session, or a completed link.
#[derive(Debug, Clone)]
pub enum OAuthOutcome {
    Session(AuthSession),
    Linked {
        account_id: Uuid,
        provider: ProviderType,
    },
}

#[derive(Clone)]
pub struct OAuthService {
    auth: AuthService,
    provider: Arc<dyn IdentityProvider>,
}

impl OAuthService {
    #[must_use]
    pub fn new(auth: AuthService, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { auth, provider }
    }

    /// Build the provider redirect URL for a login attempt.
    ///
    /// # Errors
    /// `ProviderNotConfigured`, `ProviderUnavailable`.
    pub fn authorization_url(
        &self,
        provider: ProviderType,
        remember_me: bool,
        device_label: &str,
    ) -> Result<Url, AuthError> {
        if !self.provider.is_configured(provider) {
            return Err(AuthError::ProviderNotConfigured(provider));
        }
        let state = OAuthState::for_login(remember_me, device_label).encode()?;
        self.provider.authorization_url(provider, &state)
    }

    /// Build the provider redirect URL for linking a provider to an
    /// existing account. Pre-checks everything that would make the
    /// callback fail, so the user is not bounced through the provider for
    /// nothing.
    ///
    /// # Errors
    /// `AccountNotFound`, `OauthNotAllowedForRole`, `AccountWithdrawn`,
    /// `ProviderAlreadyConnected`, `ProviderNotConfigured`.
    pub async fn link_url(
        &self,
        account_id: Uuid,
        provider: ProviderType,
        device_label: &str,
    ) -> Result<Url, AuthError> {
        let Some(account) = self.auth.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        if !account.role().is_customer() {
            return Err(AuthError::OauthNotAllowedForRole(account.role()));
        }
        if account.status().is_withdrawn() {
            return Err(AuthError::AccountWithdrawn);
        }
        if account.has_provider(provider) {
            return Err(AuthError::ProviderAlreadyConnected(provider));
        }
        if !self.provider.is_configured(provider) {
            return Err(AuthError::ProviderNotConfigured(provider));
        }
        let state = OAuthState::for_link(account_id, device_label).encode()?;
        self.provider.authorization_url(provider, &state)
    }

    /// Resolve a provider callback.
    ///
    /// A link-intent state connects the external identity to the account
    /// embedded in the state. A login-intent state resolves an account by
    /// precedence: existing `(provider, provider_user_id)` linkage, then
    /// existing `(email, customer)` account which gains the linkage, then
    /// a brand-new customer account registered with a random throwaway
    /// password (the password-reset path stays available even though the
    /// user never chose one).
    ///
    /// # Errors
    /// `InvalidOauthState`, `ProviderUnavailable`, `OauthEmailRequired`,
    /// `ProviderAlreadyConnected`, plus account-state errors on login.
    pub async fn handle_callback(
        &self,
        provider: ProviderType,
        code: &str,
        encoded_state: &str,
    ) -> Result<OAuthOutcome, AuthError> {
        let state = OAuthState::decode(encoded_state)?;
        let user_info = self.provider.user_info(provider, code).await?;

        if state.is_link_request() {
            let result = self.link_callback(provider, &state, &user_info).await;
            match &result {
                Ok(OAuthOutcome::Linked { account_id, .. }) => {
                    self.auth
                        .emit(AuthAction::ProviderLinked, Some(*account_id), None)
                        .await;
                }
                _ => {
                    self.auth
                        .emit(AuthAction::ProviderLinkFailed, state.link_account_id, None)
                        .await;
                }
            }
            return result;
        }

        let result = self.login_callback(provider, &state, &user_info).await;
        match &result {
            Ok((session, first_login)) => {
                let action = if *first_login {
                    AuthAction::OauthRegistered
                } else {
                    AuthAction::OauthLogin
                };
                self.auth
                    .emit(action, Some(session.account_id), Some(session.role))
                    .await;
            }
            Err(_) => {
                self.auth
                    .emit(AuthAction::OauthLoginFailed, None, Some(Role::Customer))
                    .await;
            }
        }
        result.map(|(session, _)| OAuthOutcome::Session(session))
    }

    async fn link_callback(
        &self,
        provider: ProviderType,
        state: &OAuthState,
        user_info: &ProviderUserInfo,
    ) -> Result<OAuthOutcome, AuthError> {
        let Some(account_id) = state.link_account_id else {
            return Err(AuthError::InvalidOauthState);
        };
        let Some(mut account) = self.auth.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };

        // The external identity may already belong to someone else.
        if let Some(holder) = self
            .auth
            .accounts
            .find_by_provider(provider, &user_info.provider_user_id)
            .await?
        {
            if holder.id() != account.id() {
                return Err(AuthError::ProviderAlreadyConnected(provider));
            }
        }

        account.connect_provider(provider, &user_info.provider_user_id)?;
        self.auth.accounts.update(&account).await?;
        info!(account_id = %account.id(), provider = provider.as_str(), "provider linked");
        Ok(OAuthOutcome::Linked {
            account_id: account.id(),
            provider,
        })
    }

    async fn login_callback(
        &self,
        provider: ProviderType,
        state: &OAuthState,
        user_info: &ProviderUserInfo,
    ) -> Result<(AuthSession, bool), AuthError> {
        // A usable email is required up front, before any account lookup:
        // a provider response without one fails even for an identity that
        // is already linked.
        let email = user_info
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .ok_or(AuthError::OauthEmailRequired)?;

        // Path 1: the external identity is already linked.
        if let Some(mut account) = self
            .auth
            .accounts
            .find_by_provider(provider, &user_info.provider_user_id)
            .await?
        {
            account.record_login_success()?;
            self.auth.accounts.update(&account).await?;
            let session = self
                .auth
                .open_session(&account, &state.device_label, state.remember_me)
                .await?;
            return Ok((session, false));
        }

        // Path 2: a customer account with this email exists; attach the
        // linkage and reuse it.
        if let Some(mut account) = self
            .auth
            .accounts
            .find_by_email_and_role(&email, Role::Customer)
            .await?
        {
            account.connect_provider(provider, &user_info.provider_user_id)?;
            account.record_login_success()?;
            self.auth.accounts.update(&account).await?;
            self.auth
                .emit(AuthAction::ProviderLinked, Some(account.id()), None)
                .await;
            let session = self
                .auth
                .open_session(&account, &state.device_label, state.remember_me)
                .await?;
            return Ok((session, false));
        }

        // Path 3: first-time login, register a fresh customer account. The
        // throwaway password keeps a resettable non-social login path alive.
        let account = Account::register_with_oauth(
            &email,
            &Uuid::new_v4().to_string(),
            Role::Customer,
            provider,
            &user_info.provider_user_id,
            &self.auth.policy,
        )?;
        self.auth.accounts.insert(&account).await?;
        let session = self
            .auth
            .open_session(&account, &state.device_label, state.remember_me)
            .await?;
        Ok((session, true))
    }

    /// Remove a provider linkage. Idempotent at the account level.
    ///
    /// # Errors
    /// `AccountNotFound`, `AccountWithdrawn`.
    pub async fn unlink_provider(
        &self,
        account_id: Uuid,
        provider: ProviderType,
    ) -> Result<(), AuthError> {
        let result = self.unlink_inner(account_id, provider).await;
        match &result {
            Ok(()) => {
                self.auth
                    .emit(AuthAction::ProviderUnlinked, Some(account_id), None)
                    .await;
            }
            Err(_) => {
                self.auth
                    .emit(AuthAction::ProviderUnlinkFailed, Some(account_id), None)
                    .await;
            }
        }
        result
    }

    async fn unlink_inner(
        &self,
        account_id: Uuid,
        provider: ProviderType,
    ) -> Result<(), AuthError> {
        let Some(mut account) = self.auth.accounts.find_by_id(account_id).await? else {
            return Err(AuthError::AccountNotFound);
        };
        account.disconnect_provider(provider)?;
        self.auth.accounts.update(&account).await?;
        Ok(())
    }
}
