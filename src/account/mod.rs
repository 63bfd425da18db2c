//! Account aggregate: identity, credential, lockout state machine, and
//! linked social identities.

mod models;
mod password;

pub use models::{
    normalize_email, Account, AccountStatus, LinkedIdentity, ProviderType, Role,
    MAX_LOGIN_FAILURES,
};
pub use password::{PasswordHash, PasswordPolicy};
