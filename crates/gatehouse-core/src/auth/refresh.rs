//! Exchange of the long-lived refresh credential for a new access credential.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::role::{refresh_path, tier_of, Role};
use crate::api::transport::{HttpRequest, HttpTransport, RequestOptions};
use crate::api::RefreshError;
use crate::store::{CredentialStore, StoreKey};

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    /// Some backends rotate the refresh credential on every exchange
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

/// Performs token refresh against the tier-specific endpoint.
///
/// Writes only the access credential (and a rotated refresh credential, if
/// the server issues one). Never clears storage and never navigates; what to
/// do about a failed refresh is the caller's decision.
pub struct TokenRefresher<T: HttpTransport> {
    transport: Arc<T>,
    store: CredentialStore,
    base_url: String,
    via_cookie: bool,
}

impl<T: HttpTransport> TokenRefresher<T> {
    pub fn new(
        transport: Arc<T>,
        store: CredentialStore,
        base_url: impl Into<String>,
        via_cookie: bool,
    ) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            via_cookie,
        }
    }

    /// Whether there is anything to refresh with. With cookie transport the
    /// credential is invisible to us, so it is assumed present.
    pub fn has_refresh_credential(&self) -> bool {
        self.via_cookie || self.store.refresh_token().is_some()
    }

    /// Exchange the refresh credential for a new access credential.
    ///
    /// On success the new token is stored under the role's tier and returned.
    pub async fn refresh(&self, role: Option<Role>) -> Result<String, RefreshError> {
        let url = format!("{}{}", self.base_url, refresh_path(role));
        debug!(url = %url, role = ?role, "Refreshing access token");

        let request = HttpRequest::new(url.as_str(), RequestOptions::post())
            .bearer(self.store.refresh_token());

        let response = self.transport.send(request).await.map_err(|e| {
            warn!(url = %url, error = %e, "Refresh request failed");
            RefreshError::Network(e)
        })?;

        if !response.is_success() {
            warn!(url = %url, status = response.status, "Refresh rejected");
            return Err(RefreshError::Rejected(response.status));
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::NoCredential)?;

        self.store.set(StoreKey::AccessToken(tier_of(role)), &token)?;
        if let Some(rotated) = body.refresh_token.filter(|t| !t.is_empty()) {
            self.store.set(StoreKey::RefreshToken, &rotated)?;
        }

        info!(role = ?role, "Access token refreshed");
        Ok(token)
    }
}
