//! Persistence boundaries.
//!
//! The engine talks to storage through two traits so the same service code
//! runs against Postgres in production and in-memory stores in tests.
//! Compound operations (revoke-all, delete-all) are atomic per store call;
//! the orchestrator does not hold a transaction across both stores.

use async_trait::async_trait;
use uuid::Uuid;

use crate::account::{Account, ProviderType, Role};
use crate::error::AuthError;
use crate::token::SessionToken;

mod memory;
mod postgres;

pub use memory::{MemoryAccountDirectory, MemorySessionStore};
pub use postgres::{PgAccountDirectory, PgSessionStore};

/// Account persistence. `(email, role)` is the uniqueness key: the same
/// email may exist once per role.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Inserts a new account. Returns [`AuthError::EmailAlreadyExists`]
    /// when `(email, role)` is already taken.
    async fn insert(&self, account: &Account) -> Result<(), AuthError>;

    /// Persists the current state of an existing account, linked
    /// identities included.
    async fn update(&self, account: &Account) -> Result<(), AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError>;

    async fn find_by_email_and_role(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<Account>, AuthError>;

    /// Looks up the account holding a linked identity for
    /// `(provider, provider_user_id)`.
    async fn find_by_provider(
        &self,
        provider: ProviderType,
        provider_user_id: &str,
    ) -> Result<Option<Account>, AuthError>;

    async fn exists_by_email_and_role(&self, email: &str, role: Role) -> Result<bool, AuthError>;
}

/// Refresh-token persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, token: &SessionToken) -> Result<(), AuthError>;

    async fn find_by_value(&self, value: &str) -> Result<Option<SessionToken>, AuthError>;

    /// Compare-and-swap rotation: replaces `old_value` with the rotated
    /// token only if the stored row still carries `old_value` unrevoked.
    /// Returns `false` when another rotation won the race.
    async fn rotate(&self, old_value: &str, rotated: &SessionToken) -> Result<bool, AuthError>;

    /// Marks the token with `value` revoked. No-op when absent.
    async fn revoke(&self, value: &str) -> Result<(), AuthError>;

    /// Revokes every live token belonging to `account_id`. Used for
    /// breach containment and password changes.
    async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError>;

    /// Hard-deletes every token belonging to `account_id` (withdrawal).
    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError>;

    /// Deletes expired and revoked rows, returning how many were removed.
    async fn sweep_expired_or_revoked(&self) -> Result<u64, AuthError>;

    async fn find_all_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<SessionToken>, AuthError>;
}
