//! The identity-provider collaborator boundary.

use async_trait::async_trait;
use url::Url;

use crate::account::ProviderType;
use crate::error::AuthError;

/// Normalized user info returned by a provider after code exchange.
///
/// Some providers omit the email depending on user consent; login requires
/// it, so the orchestrator rejects a `None` email with `OauthEmailRequired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUserInfo {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Outbound calls to the social identity providers.
///
/// Implementations own transport, timeouts, and retries; this crate treats
/// the collaborator as opaque and maps its failures to
/// `ProviderUnavailable`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the provider's authorization URL carrying the encoded state.
    ///
    /// # Errors
    /// `ProviderNotConfigured` or `ProviderUnavailable`.
    fn authorization_url(
        &self,
        provider: ProviderType,
        encoded_state: &str,
    ) -> Result<Url, AuthError>;

    /// Exchange an authorization code for normalized user info.
    ///
    /// # Errors
    /// `ProviderUnavailable` on transport or provider-side failure.
    async fn user_info(
        &self,
        provider: ProviderType,
        code: &str,
    ) -> Result<ProviderUserInfo, AuthError>;

    /// Whether credentials for this provider are configured.
    fn is_configured(&self, provider: ProviderType) -> bool;
}
