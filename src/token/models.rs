//! The `SessionToken` aggregate: one durable refresh-token record.

use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::error::AuthError;

/// Refresh lifetime without remember-me.
pub const STANDARD_TTL: Duration = Duration::hours(1);

/// Refresh lifetime with remember-me.
pub const REMEMBER_ME_TTL: Duration = Duration::days(30);

/// Generate an opaque high-entropy token value (32 random bytes, URL-safe
/// base64 without padding). The value is a bearer secret.
///
/// # Errors
/// `Signing` if the OS random source fails.
pub fn generate_token_value() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token value")
        .map_err(AuthError::Signing)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// A refresh-token record backing one login session on one device.
///
/// Single-use: every successful refresh replaces the value (rotation) and
/// recomputes expiry from the record's own remember-me flag. Revocation
/// keeps the row so replay of a rotated-away value stays detectable.
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: Uuid,
    account_id: Uuid,
    value: String,
    device_label: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    remember_me: bool,
}

impl SessionToken {
    /// Issue a fresh token for an account/device pair.
    ///
    /// # Errors
    /// `Signing` if token-value generation fails.
    pub fn issue(
        account_id: Uuid,
        device_label: &str,
        remember_me: bool,
    ) -> Result<Self, AuthError> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            value: generate_token_value()?,
            device_label: device_label.to_string(),
            created_at: now,
            expires_at: now + ttl_for(remember_me),
            revoked: false,
            remember_me,
        })
    }

    /// Issue with an explicit expiry. Tests and sweep tooling only.
    ///
    /// # Errors
    /// `Signing` if token-value generation fails.
    pub fn issue_with_expiry(
        account_id: Uuid,
        device_label: &str,
        remember_me: bool,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let mut token = Self::issue(account_id, device_label, remember_me)?;
        token.expires_at = expires_at;
        Ok(token)
    }

    /// Rebuild a token from persisted state. For store implementations.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn restore(
        id: Uuid,
        account_id: Uuid,
        value: String,
        device_label: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        revoked: bool,
        remember_me: bool,
    ) -> Self {
        Self {
            id,
            account_id,
            value,
            device_label,
            created_at,
            expires_at,
            revoked,
            remember_me,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    #[must_use]
    pub fn remember_me(&self) -> bool {
        self.remember_me
    }

    /// Replace the value and recompute expiry from this record's own
    /// remember-me flag.
    ///
    /// # Errors
    /// `TokenAlreadyRevoked` / `RefreshTokenExpired` when the token is not
    /// usable.
    pub fn rotate(&mut self, new_value: String) -> Result<(), AuthError> {
        self.validate_usable()?;
        self.value = new_value;
        self.expires_at = Utc::now() + ttl_for(self.remember_me);
        Ok(())
    }

    /// Idempotent revocation; the record is retained.
    pub fn revoke(&mut self) {
        self.revoked = true;
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    /// # Errors
    /// `TokenAlreadyRevoked` before `RefreshTokenExpired`: a revoked token
    /// reports revocation even when it has also expired.
    pub fn validate_usable(&self) -> Result<(), AuthError> {
        if self.revoked {
            return Err(AuthError::TokenAlreadyRevoked);
        }
        if self.is_expired() {
            return Err(AuthError::RefreshTokenExpired);
        }
        Ok(())
    }
}

fn ttl_for(remember_me: bool) -> Duration {
    if remember_me {
        REMEMBER_ME_TTL
    } else {
        STANDARD_TTL
    }
}
