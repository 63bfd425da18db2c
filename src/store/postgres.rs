//! Postgres-backed stores.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id UUID PRIMARY KEY,
//!     email TEXT NOT NULL,
//!     role TEXT NOT NULL,
//!     password TEXT NOT NULL,
//!     status TEXT NOT NULL,
//!     failed_login_count INT NOT NULL DEFAULT 0,
//!     last_login_at TIMESTAMPTZ,
//!     UNIQUE (email, role)
//! );
//!
//! CREATE TABLE linked_identities (
//!     account_id UUID NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
//!     provider TEXT NOT NULL,
//!     provider_user_id TEXT NOT NULL,
//!     connected_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (account_id, provider),
//!     UNIQUE (provider, provider_user_id)
//! );
//!
//! CREATE TABLE session_tokens (
//!     id UUID PRIMARY KEY,
//!     account_id UUID NOT NULL,
//!     value TEXT NOT NULL UNIQUE,
//!     device_label TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL,
//!     revoked BOOLEAN NOT NULL DEFAULT FALSE,
//!     remember_me BOOLEAN NOT NULL DEFAULT FALSE
//! );
//! ```

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::account::{
    Account, AccountStatus, LinkedIdentity, PasswordHash, ProviderType, Role,
};
use crate::error::AuthError;
use crate::store::{AccountDirectory, SessionStore};
use crate::token::SessionToken;

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|db| db.code()),
        Some(code) if code == UNIQUE_VIOLATION
    )
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn account_from_row(row: &PgRow, providers: Vec<LinkedIdentity>) -> Result<Account, AuthError> {
    let email: String = row.try_get("email").map_err(AuthError::storage)?;
    let role: String = row.try_get("role").map_err(AuthError::storage)?;
    let status: String = row.try_get("status").map_err(AuthError::storage)?;
    let password: String = row.try_get("password").map_err(AuthError::storage)?;
    let failures: i32 = row
        .try_get("failed_login_count")
        .map_err(AuthError::storage)?;

    Ok(Account::restore(
        row.try_get("id").map_err(AuthError::storage)?,
        email,
        Role::parse(&role)?,
        PasswordHash::from_encoded(password),
        AccountStatus::parse(&status)?,
        u32::try_from(failures).unwrap_or(0),
        row.try_get("last_login_at").map_err(AuthError::storage)?,
        providers,
    ))
}

fn token_from_row(row: &PgRow) -> Result<SessionToken, AuthError> {
    Ok(SessionToken::restore(
        row.try_get("id").map_err(AuthError::storage)?,
        row.try_get("account_id").map_err(AuthError::storage)?,
        row.try_get("value").map_err(AuthError::storage)?,
        row.try_get("device_label").map_err(AuthError::storage)?,
        row.try_get("created_at").map_err(AuthError::storage)?,
        row.try_get("expires_at").map_err(AuthError::storage)?,
        row.try_get("revoked").map_err(AuthError::storage)?,
        row.try_get("remember_me").map_err(AuthError::storage)?,
    ))
}

#[derive(Debug, Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_providers(&self, account_id: Uuid) -> Result<Vec<LinkedIdentity>, AuthError> {
        let query = "SELECT provider, provider_user_id, connected_at \
                     FROM linked_identities WHERE account_id = $1 ORDER BY connected_at";

        let rows = sqlx::query(query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("fetching linked identities")
            .map_err(AuthError::Storage)?;

        rows.iter()
            .map(|row| {
                let provider: String = row.try_get("provider").map_err(AuthError::storage)?;
                let connected_at: DateTime<Utc> =
                    row.try_get("connected_at").map_err(AuthError::storage)?;
                let mut link = LinkedIdentity::new(
                    ProviderType::parse(&provider)?,
                    row.try_get("provider_user_id").map_err(AuthError::storage)?,
                );
                link.connected_at = connected_at;
                Ok(link)
            })
            .collect()
    }

    async fn replace_providers(
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
    ) -> Result<(), AuthError> {
        let delete = "DELETE FROM linked_identities WHERE account_id = $1";
        sqlx::query(delete)
            .bind(account.id())
            .execute(&mut **tx)
            .instrument(query_span("DELETE", delete))
            .await
            .context("clearing linked identities")
            .map_err(AuthError::Storage)?;

        let insert = "INSERT INTO linked_identities \
                      (account_id, provider, provider_user_id, connected_at) \
                      VALUES ($1, $2, $3, $4)";
        for link in account.providers() {
            sqlx::query(insert)
                .bind(account.id())
                .bind(link.provider.as_str())
                .bind(&link.provider_user_id)
                .bind(link.connected_at)
                .execute(&mut **tx)
                .instrument(query_span("INSERT", insert))
                .await
                .context("inserting linked identity")
                .map_err(AuthError::Storage)?;
        }
        Ok(())
    }

    async fn hydrate(&self, row: Option<PgRow>) -> Result<Option<Account>, AuthError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.try_get("id").map_err(AuthError::storage)?;
        let providers = self.load_providers(id).await?;
        account_from_row(&row, providers).map(Some)
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn insert(&self, account: &Account) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting account insert")
            .map_err(AuthError::Storage)?;

        let query = "INSERT INTO accounts \
                     (id, email, role, password, status, failed_login_count, last_login_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)";

        let result = sqlx::query(query)
            .bind(account.id())
            .bind(account.email())
            .bind(account.role().as_str())
            .bind(account.password().as_str())
            .bind(account.status().as_str())
            .bind(i32::try_from(account.failed_login_count()).unwrap_or(i32::MAX))
            .bind(account.last_login_at())
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await;

        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(AuthError::EmailAlreadyExists);
            }
            return Err(AuthError::storage(err));
        }

        Self::replace_providers(&mut tx, account).await?;

        tx.commit()
            .await
            .context("committing account insert")
            .map_err(AuthError::Storage)
    }

    async fn update(&self, account: &Account) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting account update")
            .map_err(AuthError::Storage)?;

        let query = "UPDATE accounts SET password = $2, status = $3, \
                     failed_login_count = $4, last_login_at = $5 WHERE id = $1";

        let result = sqlx::query(query)
            .bind(account.id())
            .bind(account.password().as_str())
            .bind(account.status().as_str())
            .bind(i32::try_from(account.failed_login_count()).unwrap_or(i32::MAX))
            .bind(account.last_login_at())
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("updating account")
            .map_err(AuthError::Storage)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AccountNotFound);
        }

        Self::replace_providers(&mut tx, account).await?;

        tx.commit()
            .await
            .context("committing account update")
            .map_err(AuthError::Storage)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError> {
        let query = "SELECT id, email, role, password, status, failed_login_count, \
                     last_login_at FROM accounts WHERE id = $1";

        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("fetching account by id")
            .map_err(AuthError::Storage)?;

        self.hydrate(row).await
    }

    async fn find_by_email_and_role(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<Account>, AuthError> {
        let query = "SELECT id, email, role, password, status, failed_login_count, \
                     last_login_at FROM accounts WHERE email = $1 AND role = $2";

        let row = sqlx::query(query)
            .bind(email)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("fetching account by email and role")
            .map_err(AuthError::Storage)?;

        self.hydrate(row).await
    }

    async fn find_by_provider(
        &self,
        provider: ProviderType,
        provider_user_id: &str,
    ) -> Result<Option<Account>, AuthError> {
        let query = "SELECT a.id, a.email, a.role, a.password, a.status, \
                     a.failed_login_count, a.last_login_at \
                     FROM accounts a JOIN linked_identities l ON l.account_id = a.id \
                     WHERE l.provider = $1 AND l.provider_user_id = $2";

        let row = sqlx::query(query)
            .bind(provider.as_str())
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("fetching account by provider")
            .map_err(AuthError::Storage)?;

        self.hydrate(row).await
    }

    async fn exists_by_email_and_role(&self, email: &str, role: Role) -> Result<bool, AuthError> {
        let query = "SELECT EXISTS (SELECT 1 FROM accounts WHERE email = $1 AND role = $2)";

        let row = sqlx::query(query)
            .bind(email)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("checking email availability")
            .map_err(AuthError::Storage)?;

        row.try_get(0).map_err(AuthError::storage)
    }
}

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, token: &SessionToken) -> Result<(), AuthError> {
        let query = "INSERT INTO session_tokens \
                     (id, account_id, value, device_label, created_at, expires_at, \
                     revoked, remember_me) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

        sqlx::query(query)
            .bind(token.id())
            .bind(token.account_id())
            .bind(token.value())
            .bind(token.device_label())
            .bind(token.created_at())
            .bind(token.expires_at())
            .bind(token.is_revoked())
            .bind(token.remember_me())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("inserting session token")
            .map_err(AuthError::Storage)?;

        Ok(())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<SessionToken>, AuthError> {
        let query = "SELECT id, account_id, value, device_label, created_at, expires_at, \
                     revoked, remember_me FROM session_tokens WHERE value = $1";

        let row = sqlx::query(query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("fetching session token")
            .map_err(AuthError::Storage)?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn rotate(&self, old_value: &str, rotated: &SessionToken) -> Result<bool, AuthError> {
        // First writer wins: the WHERE clause only matches while the row
        // still carries the pre-rotation value unrevoked.
        let query = "UPDATE session_tokens \
                     SET value = $1, created_at = $2, expires_at = $3 \
                     WHERE id = $4 AND value = $5 AND NOT revoked";

        let result = sqlx::query(query)
            .bind(rotated.value())
            .bind(rotated.created_at())
            .bind(rotated.expires_at())
            .bind(rotated.id())
            .bind(old_value)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("rotating session token")
            .map_err(AuthError::Storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, value: &str) -> Result<(), AuthError> {
        let query = "UPDATE session_tokens SET revoked = TRUE WHERE value = $1";

        sqlx::query(query)
            .bind(value)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("revoking session token")
            .map_err(AuthError::Storage)?;

        Ok(())
    }

    async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError> {
        let query = "UPDATE session_tokens SET revoked = TRUE \
                     WHERE account_id = $1 AND NOT revoked";

        sqlx::query(query)
            .bind(account_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("revoking account session tokens")
            .map_err(AuthError::Storage)?;

        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError> {
        let query = "DELETE FROM session_tokens WHERE account_id = $1";

        sqlx::query(query)
            .bind(account_id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("deleting account session tokens")
            .map_err(AuthError::Storage)?;

        Ok(())
    }

    async fn sweep_expired_or_revoked(&self) -> Result<u64, AuthError> {
        let query = "DELETE FROM session_tokens WHERE revoked OR expires_at <= NOW()";

        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("sweeping session tokens")
            .map_err(AuthError::Storage)?;

        Ok(result.rows_affected())
    }

    async fn find_all_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<SessionToken>, AuthError> {
        let query = "SELECT id, account_id, value, device_label, created_at, expires_at, \
                     revoked, remember_me FROM session_tokens \
                     WHERE account_id = $1 ORDER BY created_at";

        let rows = sqlx::query(query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("listing account session tokens")
            .map_err(AuthError::Storage)?;

        rows.iter().map(token_from_row).collect()
    }
}
