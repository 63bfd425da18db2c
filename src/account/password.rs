//! Password policy validation and Argon2id hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::warn;

use crate::error::AuthError;

/// Minimum accepted password length.
const MIN_LENGTH: usize = 8;

/// Specials accepted by the policy. Quotes, angle brackets, backslash,
/// braces, brackets, semicolon, pipe, backtick, colon, and ampersand are
/// rejected outright: they are the usual injection suspects.
const ALLOWED_SPECIALS: &str = "!@#$%^*()_+-=.,?";

/// An Argon2id-encoded password hash.
///
/// Always present on an account, including accounts created through OAuth:
/// the platform guarantees a non-social fallback login path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Rebuild from an already-encoded value (loading persisted state).
    #[must_use]
    pub fn from_encoded(encoded: String) -> Self {
        Self(encoded)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

/// Validates raw passwords against the platform policy and hashes them.
///
/// Stateless; the only effect is the hashing primitive's internal salt
/// generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordPolicy;

impl PasswordPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check a raw password against the policy.
    ///
    /// Rules, in order: length, allowed characters only, then at least two
    /// of {letter, digit, special}.
    ///
    /// # Errors
    /// `PasswordTooShort`, `PasswordInvalidCharacters`, or `PasswordTooWeak`.
    pub fn validate(&self, raw: &str) -> Result<(), AuthError> {
        if raw.chars().count() < MIN_LENGTH {
            return Err(AuthError::PasswordTooShort);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ALLOWED_SPECIALS.contains(c))
        {
            return Err(AuthError::PasswordInvalidCharacters);
        }

        let has_letter = raw.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = raw.chars().any(|c| c.is_ascii_digit());
        let has_special = raw.chars().any(|c| ALLOWED_SPECIALS.contains(c));
        let classes = usize::from(has_letter) + usize::from(has_digit) + usize::from(has_special);
        if classes < 2 {
            return Err(AuthError::PasswordTooWeak);
        }
        Ok(())
    }

    /// Validate then hash a raw password.
    ///
    /// # Errors
    /// Policy violations as in [`Self::validate`]; `Signing` if the hashing
    /// primitive fails.
    pub fn hash(&self, raw: &str) -> Result<PasswordHash, AuthError> {
        self.validate(raw)?;
        let salt = SaltString::generate(&mut OsRng);
        let encoded = Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|err| AuthError::Signing(anyhow::anyhow!("argon2 hash failed: {err}")))?
            .to_string();
        Ok(PasswordHash(encoded))
    }

    /// Compare a raw password against a stored hash.
    ///
    /// An undecodable stored hash counts as a mismatch rather than an error;
    /// login treats it like any wrong password.
    #[must_use]
    pub fn verify(&self, raw: &str, hash: &PasswordHash) -> bool {
        let parsed = match argon2::password_hash::PasswordHash::new(hash.as_str()) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Stored password hash is not decodable: {err}");
                return false;
            }
        };
        Argon2::default()
            .verify_password(raw.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short_is_checked_first() {
        let policy = PasswordPolicy::new();
        assert!(matches!(
            policy.validate("Ab1!"),
            Err(AuthError::PasswordTooShort)
        ));
        // Even a short password with bad characters reports length first.
        assert!(matches!(
            policy.validate("Ab1;"),
            Err(AuthError::PasswordTooShort)
        ));
    }

    #[test]
    fn letters_only_is_too_weak() {
        let policy = PasswordPolicy::new();
        assert!(matches!(
            policy.validate("abcdefgh"),
            Err(AuthError::PasswordTooWeak)
        ));
        assert!(matches!(
            policy.validate("12345678"),
            Err(AuthError::PasswordTooWeak)
        ));
    }

    #[test]
    fn disallowed_characters_are_rejected() {
        let policy = PasswordPolicy::new();
        for raw in ["Abcd123;", "Abcd123|", "Abcd123`", "Abcd123<", "Abcd 123"] {
            assert!(
                matches!(policy.validate(raw), Err(AuthError::PasswordInvalidCharacters)),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn two_character_classes_pass() {
        let policy = PasswordPolicy::new();
        assert!(policy.validate("Abcd123!").is_ok());
        assert!(policy.validate("abcd1234").is_ok());
        assert!(policy.validate("abcd!!!!").is_ok());
        assert!(policy.validate("1234!!!!").is_ok());
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let policy = PasswordPolicy::new();
        let hash = policy.hash("Abcd123!").expect("policy-compliant password");
        assert!(hash.has_value());
        assert!(policy.verify("Abcd123!", &hash));
        assert!(!policy.verify("Abcd123?", &hash));
    }

    #[test]
    fn hash_refuses_invalid_passwords() {
        let policy = PasswordPolicy::new();
        assert!(matches!(
            policy.hash("short"),
            Err(AuthError::PasswordTooShort)
        ));
    }

    #[test]
    fn undecodable_stored_hash_is_a_mismatch() {
        let policy = PasswordPolicy::new();
        let hash = PasswordHash::from_encoded("not-an-argon2-hash".to_string());
        assert!(!policy.verify("Abcd123!", &hash));
    }
}
