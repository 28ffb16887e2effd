//! Session establishment: password login with an optional OTP step.
//!
//! When the backend asks for a one-time code, the pending email and
//! challenge id are parked in the tab scope until `verify_otp` completes.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::role::Role;
use super::state::{AuthStore, EstablishedSession, Identity};
use crate::api::transport::{HttpRequest, HttpTransport, RequestOptions};
use crate::api::ApiError;
use crate::store::StoreKey;

const LOGIN_PATH: &str = "/api/auth/login";
const VERIFY_OTP_PATH: &str = "/api/auth/verify-otp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    OtpRequired { email: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    role: Option<String>,
    user: Option<Identity>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    requires_otp: bool,
    challenge_id: Option<String>,
}

impl LoginResponse {
    fn into_session(self, email: &str) -> Result<EstablishedSession, ApiError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("login response carried no access token".into()))?;

        Ok(EstablishedSession {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            role: self.role.as_deref().and_then(Role::parse),
            user: self.user.unwrap_or_else(|| Identity {
                name: String::new(),
                email: email.to_string(),
            }),
            permissions: self.permissions,
        })
    }
}

impl<T: HttpTransport> AuthStore<T> {
    async fn post_credentials(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<LoginResponse, ApiError> {
        let request = HttpRequest::new(self.url(path), RequestOptions::post().json(body));
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        response
            .json()
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Authenticate with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        let response = self
            .post_credentials(LOGIN_PATH, json!({ "email": email, "password": password }))
            .await?;

        if response.requires_otp {
            debug!(email = %email, "Login requires OTP");
            self.store.set(StoreKey::PendingEmail, email)?;
            match response.challenge_id {
                Some(ref challenge) => self.store.set(StoreKey::OtpChallenge, challenge)?,
                None => self.store.remove(StoreKey::OtpChallenge)?,
            }
            return Ok(LoginOutcome::OtpRequired {
                email: email.to_string(),
            });
        }

        self.establish(response.into_session(email)?)?;
        Ok(LoginOutcome::Authenticated)
    }

    /// Complete a login that was answered with `OtpRequired`.
    pub async fn verify_otp(&self, code: &str) -> Result<(), ApiError> {
        let email = self
            .store
            .get(StoreKey::PendingEmail)
            .ok_or(ApiError::NoPendingLogin)?;
        let challenge = self.store.get(StoreKey::OtpChallenge);

        let response = self
            .post_credentials(
                VERIFY_OTP_PATH,
                json!({ "email": email, "otp": code, "challengeId": challenge }),
            )
            .await?;

        self.establish(response.into_session(&email)?)?;
        self.store.clear_handoff()?;
        info!(email = %email, "OTP verified");
        Ok(())
    }

    /// Email of a login waiting on its OTP step, if any
    pub fn pending_login(&self) -> Option<String> {
        self.store.get(StoreKey::PendingEmail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::tests::auth_store;
    use crate::auth::Tier;

    const LOGIN: &str = "http://dash.test/api/auth/login";
    const VERIFY: &str = "http://dash.test/api/auth/verify-otp";

    #[tokio::test]
    async fn test_direct_login_establishes_session() {
        let (transport, auth) = auth_store(false);
        transport.respond(
            LOGIN,
            200,
            r#"{"accessToken":"S1","refreshToken":"R1","role":"superadmin","user":{"name":"Root","email":"root@example.com"}}"#,
        );

        let outcome = auth.login("root@example.com", "hunter2").await.unwrap();

        assert_eq!(outcome, LoginOutcome::Authenticated);
        assert_eq!(auth.credentials().access_token(Tier::Elevated).as_deref(), Some("S1"));
        assert_eq!(auth.credentials().refresh_token().as_deref(), Some("R1"));
        let snapshot = auth.snapshot();
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.role, Some(Role::SuperAdmin));

        let body = transport.sent()[0].options.body.clone().unwrap();
        assert_eq!(body["email"], "root@example.com");
    }

    #[tokio::test]
    async fn test_otp_handoff_round_trip() {
        let (transport, auth) = auth_store(false);
        transport.respond(LOGIN, 200, r#"{"requiresOtp":true,"challengeId":"c-9"}"#);
        transport.respond(VERIFY, 200, r#"{"accessToken":"A1","role":"admin"}"#);

        let outcome = auth.login("ops@example.com", "pw").await.unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::OtpRequired {
                email: "ops@example.com".to_string()
            }
        );
        assert!(!auth.snapshot().is_authenticated);
        assert_eq!(auth.pending_login().as_deref(), Some("ops@example.com"));

        auth.verify_otp("123456").await.unwrap();

        let sent = transport.sent_to(VERIFY);
        let body = sent[0].options.body.clone().unwrap();
        assert_eq!(body["otp"], "123456");
        assert_eq!(body["challengeId"], "c-9");

        assert_eq!(auth.pending_login(), None);
        assert_eq!(auth.credentials().get(StoreKey::OtpChallenge), None);
        assert_eq!(auth.credentials().access_token(Tier::Standard).as_deref(), Some("A1"));
        assert_eq!(auth.snapshot().identity_key(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn test_verify_otp_without_pending_login() {
        let (transport, auth) = auth_store(false);
        let err = auth.verify_otp("000000").await.unwrap_err();
        assert!(matches!(err, ApiError::NoPendingLogin));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_bad_password_is_reported() {
        let (transport, auth) = auth_store(false);
        transport.respond(LOGIN, 401, r#"{"message":"invalid credentials"}"#);

        let err = auth.login("ops@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(!auth.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn test_login_without_token_is_invalid() {
        let (transport, auth) = auth_store(false);
        transport.respond(LOGIN, 200, r#"{"role":"admin"}"#);

        let err = auth.login("ops@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
