//! Fixture-account seeding for local and staging environments.
//!
//! Seeding is an explicit step the embedding application invokes once at
//! bootstrap, never part of the engine's own lifecycle. Existing accounts
//! are left untouched, so the call is safe to repeat.

use tracing::info;

use crate::account::{normalize_email, Account, PasswordPolicy, Role};
use crate::error::AuthError;
use crate::store::AccountDirectory;

const DEFAULT_PASSWORD: &str = "Changeme1!";

const FIXTURES: &[(&str, Role)] = &[
    ("customer@tessera.local", Role::Customer),
    ("seller@tessera.local", Role::Seller),
    ("admin@tessera.local", Role::Admin),
];

/// Create one customer, seller, and admin fixture account each, skipping
/// any `(email, role)` pair that already exists. Returns how many accounts
/// were created.
///
/// # Errors
/// Password policy errors or `Storage`.
pub async fn seed_default_accounts(
    accounts: &dyn AccountDirectory,
) -> Result<usize, AuthError> {
    let policy = PasswordPolicy;
    let mut created = 0;

    for &(email, role) in FIXTURES {
        let email = normalize_email(email);
        if accounts.exists_by_email_and_role(&email, role).await? {
            continue;
        }
        let account = Account::register(&email, DEFAULT_PASSWORD, role, &policy)?;
        accounts.insert(&account).await?;
        info!(email, role = role.as_str(), "seeded fixture account");
        created += 1;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAccountDirectory;

    #[tokio::test]
    async fn seeding_is_idempotent() -> anyhow::Result<()> {
        let directory = MemoryAccountDirectory::new();

        assert_eq!(seed_default_accounts(&directory).await?, 3);
        assert_eq!(seed_default_accounts(&directory).await?, 0);

        let seeded = directory
            .find_by_email_and_role("seller@tessera.local", Role::Seller)
            .await?;
        assert!(seeded.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn default_password_satisfies_the_policy() {
        assert!(PasswordPolicy.validate(DEFAULT_PASSWORD).is_ok());
    }
}
