//! Refresh-token records with single-use rotation.

mod models;

pub use models::{generate_token_value, SessionToken, REMEMBER_ME_TTL, STANDARD_TTL};
