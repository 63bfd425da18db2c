//! Social sign-in plumbing: the redirect state codec and the identity
//! provider boundary.

mod provider;
mod state;

pub use provider::{IdentityProvider, ProviderUserInfo};
pub use state::OAuthState;
