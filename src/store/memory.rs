//! In-memory store implementations, used by tests and local tooling.
//!
//! Each store serializes writes behind a single `RwLock`, which also makes
//! `rotate` an honest compare-and-swap: two racing rotations of the same
//! value are ordered by the lock and exactly one succeeds.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::{Account, ProviderType, Role};
use crate::error::AuthError;
use crate::store::{AccountDirectory, SessionStore};
use crate::token::SessionToken;

#[derive(Debug, Default)]
pub struct MemoryAccountDirectory {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryAccountDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn insert(&self, account: &Account) -> Result<(), AuthError> {
        let mut accounts = self.accounts.write().await;
        let taken = accounts
            .values()
            .any(|existing| existing.email() == account.email() && existing.role() == account.role());
        if taken {
            return Err(AuthError::EmailAlreadyExists);
        }
        accounts.insert(account.id(), account.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> Result<(), AuthError> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&account.id()) {
            return Err(AuthError::AccountNotFound);
        }
        accounts.insert(account.id(), account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_email_and_role(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<Account>, AuthError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.email() == email && account.role() == role)
            .cloned())
    }

    async fn find_by_provider(
        &self,
        provider: ProviderType,
        provider_user_id: &str,
    ) -> Result<Option<Account>, AuthError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| {
                account
                    .providers()
                    .iter()
                    .any(|link| link.provider == provider && link.provider_user_id == provider_user_id)
            })
            .cloned())
    }

    async fn exists_by_email_and_role(&self, email: &str, role: Role) -> Result<bool, AuthError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .any(|account| account.email() == email && account.role() == role))
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: RwLock<HashMap<Uuid, SessionToken>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, token: &SessionToken) -> Result<(), AuthError> {
        self.tokens.write().await.insert(token.id(), token.clone());
        Ok(())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<SessionToken>, AuthError> {
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .find(|token| token.value() == value)
            .cloned())
    }

    async fn rotate(&self, old_value: &str, rotated: &SessionToken) -> Result<bool, AuthError> {
        let mut tokens = self.tokens.write().await;
        let Some(current) = tokens.get(&rotated.id()) else {
            return Ok(false);
        };
        if current.value() != old_value || current.is_revoked() {
            return Ok(false);
        }
        tokens.insert(rotated.id(), rotated.clone());
        Ok(true)
    }

    async fn revoke(&self, value: &str) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        if let Some(token) = tokens.values_mut().find(|token| token.value() == value) {
            token.revoke();
        }
        Ok(())
    }

    async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        for token in tokens.values_mut() {
            if token.account_id() == account_id {
                token.revoke();
            }
        }
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError> {
        self.tokens
            .write()
            .await
            .retain(|_, token| token.account_id() != account_id);
        Ok(())
    }

    async fn sweep_expired_or_revoked(&self) -> Result<u64, AuthError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        let now = Utc::now();
        tokens.retain(|_, token| !token.is_revoked() && token.expires_at() > now);
        Ok((before - tokens.len()) as u64)
    }

    async fn find_all_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<SessionToken>, AuthError> {
        let mut tokens: Vec<SessionToken> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|token| token.account_id() == account_id)
            .cloned()
            .collect();
        tokens.sort_by_key(SessionToken::created_at);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{PasswordHash, PasswordPolicy};
    use chrono::Duration;

    fn account(email: &str, role: Role) -> Account {
        Account::register(email, "Abcd123!", role, &PasswordPolicy).unwrap()
    }

    #[tokio::test]
    async fn email_is_unique_per_role_only() {
        let directory = MemoryAccountDirectory::new();
        directory.insert(&account("a@b.com", Role::Customer)).await.unwrap();
        directory.insert(&account("a@b.com", Role::Seller)).await.unwrap();

        let err = directory
            .insert(&account("a@b.com", Role::Customer))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn update_requires_existing_account() {
        let directory = MemoryAccountDirectory::new();
        let ghost = Account::restore(
            Uuid::new_v4(),
            "ghost@b.com".into(),
            Role::Customer,
            PasswordHash::from_encoded(String::new()),
            crate::account::AccountStatus::Active,
            0,
            None,
            Vec::new(),
        );
        assert!(matches!(
            directory.update(&ghost).await.unwrap_err(),
            AuthError::AccountNotFound
        ));
    }

    #[tokio::test]
    async fn rotate_is_first_writer_wins() {
        let store = MemorySessionStore::new();
        let token = SessionToken::issue(Uuid::new_v4(), "web", false).unwrap();
        let original_value = token.value().to_string();
        store.insert(&token).await.unwrap();

        let mut first = token.clone();
        first.rotate("first-value".into()).unwrap();
        assert!(store.rotate(&original_value, &first).await.unwrap());

        let mut second = token.clone();
        second.rotate("second-value".into()).unwrap();
        assert!(!store.rotate(&original_value, &second).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_revoked() {
        let store = MemorySessionStore::new();
        let account_id = Uuid::new_v4();

        let live = SessionToken::issue(account_id, "web", false).unwrap();
        let expired = SessionToken::issue_with_expiry(
            account_id,
            "web",
            false,
            Utc::now() - Duration::minutes(1),
        )
        .unwrap();
        let mut revoked = SessionToken::issue(account_id, "app", false).unwrap();
        revoked.revoke();

        store.insert(&live).await.unwrap();
        store.insert(&expired).await.unwrap();
        store.insert(&revoked).await.unwrap();

        assert_eq!(store.sweep_expired_or_revoked().await.unwrap(), 2);
        let remaining = store.find_all_for_account(account_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), live.id());
    }
}
