//! # Tessera Auth (Authentication & Session Lifecycle Engine)
//!
//! `tessera-auth` is the authentication core of the Tessera ticketing
//! platform. It owns account identity, credential verification, lockout
//! policy, social-identity linking, and refresh-token issuance and rotation
//! with reuse (breach) detection.
//!
//! ## Account Model
//!
//! The platform distinguishes three account classes (`customer`, `seller`,
//! `admin`) that may share an email address across classes: the uniqueness
//! key is the pair (email, role). Accounts move through a small state
//! machine (`active` / `locked` / `withdrawn`); withdrawal is terminal.
//!
//! - **Lockout:** five consecutive login failures lock the account.
//! - **Social sign-in:** only customer accounts may link an OAuth provider,
//!   and every account keeps a password hash so a non-social login path
//!   always exists, even for accounts created through OAuth.
//!
//! ## Sessions (Refresh-Token Rotation)
//!
//! Login issues a short-lived signed access token plus a durable refresh
//! token. Refresh tokens are single-use: each refresh rotates the stored
//! value and recomputes expiry (1 hour, or 30 days with remember-me).
//! Presenting an already-revoked value is treated as replay of a stolen
//! token and revokes every session of the owning account.
//!
//! ## Boundaries
//!
//! HTTP routing, message-bus wiring, signing-key management, and outbound
//! identity-provider calls live outside this crate, behind the
//! [`oauth::IdentityProvider`], [`signer::TokenSigner`], [`audit::AuditSink`],
//! [`store::AccountDirectory`], and [`store::SessionStore`] traits. Postgres
//! and in-memory store implementations ship in [`store`].

pub mod account;
pub mod audit;
pub mod error;
pub mod oauth;
pub mod seed;
pub mod service;
pub mod signer;
pub mod store;
pub mod token;

pub use error::{AuthError, ErrorKind};
pub use service::oauth::OAuthOutcome;
pub use service::{AccountInfo, AuthService, AuthSession, OAuthService};
