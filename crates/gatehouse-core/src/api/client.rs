//! Authenticated request wrapper.
//!
//! Every data call made by a guarded view goes through `AuthClient`. A 401
//! triggers at most one refresh and one retry; a failed refresh ends the
//! session.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::transport::{HttpRequest, HttpResponse, HttpTransport, RequestOptions};
use super::ApiError;
use crate::auth::AuthStore;
use crate::navigate::{Navigator, Route};

pub struct AuthClient<T: HttpTransport, N: Navigator> {
    transport: Arc<T>,
    auth: Arc<AuthStore<T>>,
    navigator: Arc<N>,
}

impl<T: HttpTransport, N: Navigator> Clone for AuthClient<T, N> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            auth: self.auth.clone(),
            navigator: self.navigator.clone(),
        }
    }
}

impl<T: HttpTransport, N: Navigator> AuthClient<T, N> {
    pub fn new(transport: Arc<T>, auth: Arc<AuthStore<T>>, navigator: Arc<N>) -> Self {
        Self {
            transport,
            auth,
            navigator,
        }
    }

    /// Access token read fresh from the store on every call
    fn current_token(&self) -> Option<String> {
        self.auth.credentials().access_token(self.auth.tier())
    }

    async fn send(
        &self,
        url: &str,
        options: RequestOptions,
        token: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        let request = HttpRequest::new(url, options).bearer(token);
        Ok(self.transport.send(request).await?)
    }

    /// Issue a request with the current access credential.
    ///
    /// Non-2xx responses are returned as-is, except a 401 while a refresh
    /// credential exists: that is refreshed and retried exactly once, and
    /// the retry's response is returned whatever it is. If the refresh fails,
    /// storage is cleared, the caller is sent to the entry route and
    /// `ApiError::SessionExpired` is returned.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<HttpResponse, ApiError> {
        let url = self.auth.url(url);
        let response = self
            .send(&url, options.clone(), self.current_token())
            .await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }
        if !self.auth.refresher().has_refresh_credential() {
            debug!(url = %url, "Unauthorized and no refresh credential");
            return Ok(response);
        }

        if let Err(e) = self.auth.refresher().refresh(self.auth.role()).await {
            warn!(url = %url, error = %e, "Token refresh failed, ending session");
            self.auth.sign_out_local();
            self.navigator.navigate(Route::Entry);
            return Err(ApiError::SessionExpired);
        }

        debug!(url = %url, "Retrying with refreshed token");
        self.send(&url, options, self.current_token()).await
    }

    /// GET and decode a JSON body, mapping non-2xx statuses to errors.
    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R, ApiError> {
        let response = self.request(url, RequestOptions::get()).await?;
        Self::decode(response)
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<R: DeserializeOwned>(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<R, ApiError> {
        let response = self.request(url, RequestOptions::post().json(body)).await?;
        Self::decode(response)
    }

    fn decode<R: DeserializeOwned>(response: HttpResponse) -> Result<R, ApiError> {
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        response
            .json()
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}
