//! Error taxonomy for the authentication core.
//!
//! Every failure surfaced by this crate is an [`AuthError`] variant. The set
//! is closed on purpose: callers map [`ErrorKind`] onto their own transport
//! (HTTP statuses, message-bus NACKs) without inspecting individual variants.

use thiserror::Error;

use crate::account::{ProviderType, Role};

/// Coarse classification of an [`AuthError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An id-based lookup found nothing.
    NotFound,
    /// Wrong password or an equivalent resolution failure, normalized to
    /// avoid account enumeration.
    InvalidCredential,
    /// A uniqueness or already-done conflict.
    Conflict,
    /// The account or token state forbids the operation.
    ForbiddenByState,
    /// Input rejected by policy (password rules, malformed OAuth state).
    InputPolicy,
    /// An external collaborator failed; retryable.
    ExternalUnavailable,
    /// Storage or signing fault inside the engine.
    Internal,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("account not found")]
    AccountNotFound,

    #[error("refresh token not recognized")]
    InvalidRefreshToken,

    /// Raised for both a missing (email, role) pair and a password mismatch
    /// so callers cannot probe which emails are registered.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("current password does not match")]
    InvalidCurrentPassword,

    #[error("email is blank or malformed")]
    InvalidEmail,

    #[error("email already registered for this role")]
    EmailAlreadyExists,

    #[error("provider {0} is already connected")]
    ProviderAlreadyConnected(ProviderType),

    #[error("account is already withdrawn")]
    AlreadyWithdrawn,

    #[error("account is locked")]
    AccountLocked,

    #[error("account is withdrawn")]
    AccountWithdrawn,

    #[error("social sign-in is not available for {0} accounts")]
    OauthNotAllowedForRole(Role),

    /// Covers both the ordinary revoked-token case and detected replay of a
    /// rotated-away value; the breach side effect stays internal.
    #[error("refresh token already revoked")]
    TokenAlreadyRevoked,

    #[error("refresh token expired")]
    RefreshTokenExpired,

    #[error("password must be at least 8 characters")]
    PasswordTooShort,

    #[error("password needs at least two of letters, digits, specials")]
    PasswordTooWeak,

    #[error("password contains disallowed characters")]
    PasswordInvalidCharacters,

    #[error("malformed oauth state")]
    InvalidOauthState,

    #[error("identity provider returned no email")]
    OauthEmailRequired,

    #[error("identity provider {0} is not configured")]
    ProviderNotConfigured(ProviderType),

    #[error("identity provider unavailable")]
    ProviderUnavailable(#[source] anyhow::Error),

    #[error("storage failure")]
    Storage(#[source] anyhow::Error),

    #[error("token signing failure")]
    Signing(#[source] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound | Self::InvalidRefreshToken => ErrorKind::NotFound,
            Self::InvalidCredentials | Self::InvalidCurrentPassword => ErrorKind::InvalidCredential,
            Self::EmailAlreadyExists
            | Self::ProviderAlreadyConnected(_)
            | Self::AlreadyWithdrawn => ErrorKind::Conflict,
            Self::AccountLocked
            | Self::AccountWithdrawn
            | Self::OauthNotAllowedForRole(_)
            | Self::TokenAlreadyRevoked
            | Self::RefreshTokenExpired => ErrorKind::ForbiddenByState,
            Self::InvalidEmail
            | Self::PasswordTooShort
            | Self::PasswordTooWeak
            | Self::PasswordInvalidCharacters
            | Self::InvalidOauthState
            | Self::OauthEmailRequired => ErrorKind::InputPolicy,
            Self::ProviderNotConfigured(_) | Self::ProviderUnavailable(_) => {
                ErrorKind::ExternalUnavailable
            }
            Self::Storage(_) | Self::Signing(_) => ErrorKind::Internal,
        }
    }

    /// Wrap a storage fault, keeping the source chain for logs.
    #[must_use]
    pub fn storage<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Storage(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_the_taxonomy() {
        assert_eq!(AuthError::AccountNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            AuthError::InvalidCredentials.kind(),
            ErrorKind::InvalidCredential
        );
        assert_eq!(AuthError::EmailAlreadyExists.kind(), ErrorKind::Conflict);
        assert_eq!(
            AuthError::AccountLocked.kind(),
            ErrorKind::ForbiddenByState
        );
        assert_eq!(
            AuthError::TokenAlreadyRevoked.kind(),
            ErrorKind::ForbiddenByState
        );
        assert_eq!(AuthError::PasswordTooShort.kind(), ErrorKind::InputPolicy);
        assert_eq!(
            AuthError::ProviderUnavailable(anyhow::anyhow!("down")).kind(),
            ErrorKind::ExternalUnavailable
        );
        assert_eq!(
            AuthError::storage(anyhow::anyhow!("db")).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn messages_do_not_leak_lookup_outcome() {
        // Missing account and wrong password must read identically.
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "invalid credentials"
        );
    }
}
