//! Access-token signing.
//!
//! Refresh tokens are opaque database-backed values; access tokens are
//! self-contained signed claims the rest of the platform verifies offline.
//! The signing-key lifecycle (files, rotation, distribution) lives outside
//! this crate; [`JwtAccessSigner`] only needs the symmetric secret.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Role;
use crate::error::AuthError;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_ISSUER: &str = "tessera-auth";

/// Claims carried by a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed access token plus its expiry instant.
#[derive(Debug, Clone)]
pub struct SignedAccess {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies access tokens for the platform.
pub trait TokenSigner: Send + Sync {
    /// Sign an access token for the account's current role.
    ///
    /// # Errors
    /// `Signing` when the signing primitive fails.
    fn sign_access_token(&self, account_id: Uuid, role: Role) -> Result<SignedAccess, AuthError>;

    /// Verify a presented access token and extract its claims.
    ///
    /// # Errors
    /// `InvalidCredentials` for any bad, expired, or foreign token.
    fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError>;
}

/// HS256 implementation backed by a shared symmetric secret.
pub struct JwtAccessSigner {
    secret: SecretString,
    issuer: String,
    ttl_seconds: i64,
}

impl JwtAccessSigner {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            issuer: DEFAULT_ISSUER.to_string(),
            ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }
}

impl TokenSigner for JwtAccessSigner {
    fn sign_access_token(&self, account_id: Uuid, role: Role) -> Result<SignedAccess, AuthError> {
        let now = Utc::now();
        let exp = now.timestamp() + self.ttl_seconds;
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            sub: account_id,
            role,
            iat: now.timestamp(),
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|err| AuthError::Signing(anyhow::anyhow!("jwt encode failed: {err}")))?;

        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .unwrap_or_else(|| now + chrono::Duration::seconds(self.ttl_seconds));
        Ok(SignedAccess { token, expires_at })
    }

    fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> JwtAccessSigner {
        JwtAccessSigner::new(SecretString::from("test-secret-at-least-32-bytes!!"))
    }

    #[test]
    fn sign_then_verify_round_trips_claims() {
        let signer = signer();
        let account_id = Uuid::new_v4();
        let signed = signer
            .sign_access_token(account_id, Role::Seller)
            .expect("sign");

        let claims = signer.verify_access_token(&signed.token).expect("verify");
        assert_eq!(claims.sub, account_id);
        assert_eq!(claims.role, Role::Seller);
        assert_eq!(claims.iss, "tessera-auth");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let signer = signer();
        let signed = signer
            .sign_access_token(Uuid::new_v4(), Role::Customer)
            .expect("sign");

        let mut tampered = signed.token.clone();
        tampered.push('x');
        assert!(matches!(
            signer.verify_access_token(&tampered),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            signer.verify_access_token("not-a-jwt"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let signed = signer()
            .sign_access_token(Uuid::new_v4(), Role::Admin)
            .expect("sign");
        let other = JwtAccessSigner::new(SecretString::from("another-secret-another-secret!!"));
        assert!(matches!(
            other.verify_access_token(&signed.token),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn expired_tokens_fail_verification() {
        let signer = JwtAccessSigner::new(SecretString::from("test-secret-at-least-32-bytes!!"))
            .with_ttl_seconds(-120);
        let signed = signer
            .sign_access_token(Uuid::new_v4(), Role::Customer)
            .expect("sign");
        assert!(matches!(
            signer.verify_access_token(&signed.token),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
