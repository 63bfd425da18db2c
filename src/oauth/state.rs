//! The opaque state blob carried through an OAuth redirect round trip.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Transfer state distinguishing a login round trip from an account-link
/// round trip. Ephemeral; never persisted.
///
/// Social sign-in is customer-only, so no role travels in the state.
///
/// The `nonce` is generated per round trip but is not verified against a
/// server-side store on callback, so it does not provide replay protection
/// as implemented. See DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthState {
    pub nonce: String,
    pub remember_me: bool,
    pub device_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_account_id: Option<Uuid>,
}

impl OAuthState {
    /// State for a login round trip.
    #[must_use]
    pub fn for_login(remember_me: bool, device_label: &str) -> Self {
        Self {
            nonce: Uuid::new_v4().to_string(),
            remember_me,
            device_label: device_label.to_string(),
            link_account_id: None,
        }
    }

    /// State for an account-link round trip. Linking never extends the
    /// session, so remember-me is forced off.
    #[must_use]
    pub fn for_link(account_id: Uuid, device_label: &str) -> Self {
        Self {
            nonce: Uuid::new_v4().to_string(),
            remember_me: false,
            device_label: device_label.to_string(),
            link_account_id: Some(account_id),
        }
    }

    /// Serialize to a transport-safe opaque token (JSON, URL-safe base64,
    /// no padding).
    ///
    /// # Errors
    /// `InvalidOauthState` if serialization fails (it cannot for this type,
    /// but the codec keeps a single failure mode).
    pub fn encode(&self) -> Result<String, AuthError> {
        let json = serde_json::to_vec(self).map_err(|_| AuthError::InvalidOauthState)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Reverse [`Self::encode`].
    ///
    /// Malformed base64 and malformed JSON fail identically so a caller
    /// probing the endpoint learns nothing about the blob's structure.
    ///
    /// # Errors
    /// `InvalidOauthState`.
    pub fn decode(encoded: &str) -> Result<Self, AuthError> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(AuthError::InvalidOauthState);
        }
        let json = URL_SAFE_NO_PAD
            .decode(trimmed.as_bytes())
            .map_err(|_| AuthError::InvalidOauthState)?;
        serde_json::from_slice(&json).map_err(|_| AuthError::InvalidOauthState)
    }

    #[must_use]
    pub fn is_link_request(&self) -> bool {
        self.link_account_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_state_round_trips() {
        let state = OAuthState::for_login(true, "ios-app");
        let decoded = OAuthState::decode(&state.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, state);
        assert!(!decoded.is_link_request());
        assert!(decoded.remember_me);
    }

    #[test]
    fn link_state_forces_remember_me_off() {
        let account_id = Uuid::new_v4();
        let state = OAuthState::for_link(account_id, "web");
        assert!(!state.remember_me);
        assert_eq!(state.link_account_id, Some(account_id));

        let decoded = OAuthState::decode(&state.encode().expect("encode")).expect("decode");
        assert!(decoded.is_link_request());
        assert_eq!(decoded.link_account_id, Some(account_id));
    }

    #[test]
    fn nonces_differ_per_round_trip() {
        let first = OAuthState::for_login(false, "web");
        let second = OAuthState::for_login(false, "web");
        assert_ne!(first.nonce, second.nonce);
    }

    #[test]
    fn malformed_input_fails_uniformly() {
        let valid = OAuthState::for_login(false, "web").encode().expect("encode");
        let truncated = &valid[..valid.len() - 4];

        for input in [
            "",
            "   ",
            "%%%not-base64%%%",
            truncated,
            &URL_SAFE_NO_PAD.encode(b"{\"not\":\"this-shape\"}"),
            &URL_SAFE_NO_PAD.encode(b"not json at all"),
        ] {
            assert!(
                matches!(OAuthState::decode(input), Err(AuthError::InvalidOauthState)),
                "expected uniform failure for {input:?}"
            );
        }
    }
}
