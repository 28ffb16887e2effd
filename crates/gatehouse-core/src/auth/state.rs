//! Process-wide authentication state.
//!
//! `AuthStore` is the single owner of "who is signed in". Views observe it
//! through `subscribe()`; the guard drives it through `check_auth()`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::refresh::TokenRefresher;
use super::role::{tier_of, Role, Tier};
use crate::api::transport::{HttpRequest, HttpTransport, RequestOptions};
use crate::api::ApiError;
use crate::config::Config;
use crate::navigate::{Navigator, Route};
use crate::store::{CredentialStore, StoreError, StoreKey};

/// Permission token granting every capability
const WILDCARD_PERMISSION: &str = "*";

/// Endpoint notified on explicit logout
const LOGOUT_PATH: &str = "/api/auth/logout";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

/// Observable authentication state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub user: Option<Identity>,
    pub role: Option<Role>,
    pub permissions: Vec<String>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub established_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl AuthSnapshot {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn tier(&self) -> Tier {
        tier_of(self.role)
    }

    /// Stable key for "which account is this". Changes only on sign-in,
    /// sign-out or account switch.
    pub fn identity_key(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.email.as_str())
    }

    /// Capability predicate. Elevated accounts hold every permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        if !self.is_authenticated {
            return false;
        }
        self.tier() == Tier::Elevated
            || self
                .permissions
                .iter()
                .any(|p| p == permission || p == WILDCARD_PERMISSION)
    }
}

/// Everything a successful login hands over.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub role: Option<Role>,
    pub user: Identity,
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: Option<Identity>,
    role: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
}

pub struct AuthStore<T: HttpTransport> {
    pub(super) transport: Arc<T>,
    pub(super) store: CredentialStore,
    refresher: TokenRefresher<T>,
    base_url: String,
    verify_path: String,
    state: watch::Sender<AuthSnapshot>,
}

impl<T: HttpTransport> AuthStore<T> {
    pub fn new(transport: Arc<T>, store: CredentialStore, config: &Config) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let refresher = TokenRefresher::new(
            transport.clone(),
            store.clone(),
            base_url.clone(),
            config.refresh_via_cookie,
        );
        let (state, _) = watch::channel(AuthSnapshot::loading());

        Self {
            transport,
            store,
            refresher,
            base_url,
            verify_path: config.verify_path.clone(),
            state,
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    pub fn refresher(&self) -> &TokenRefresher<T> {
        &self.refresher
    }

    /// Role resolved when the session was established
    pub fn role(&self) -> Option<Role> {
        self.state.borrow().role
    }

    pub fn tier(&self) -> Tier {
        tier_of(self.role())
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.state.borrow().has_permission(permission)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Hydrate from the profile store, then verify against the server.
    ///
    /// The snapshot reports `is_loading` until this returns.
    pub async fn init(&self) -> bool {
        self.restore_hints(true);
        let authenticated = self.check_auth().await;
        self.state.send_modify(|s| s.is_loading = false);
        authenticated
    }

    /// Publish the stored session hints without contacting the server.
    /// Leaves verification to the first `check_auth`, typically a guard's.
    pub fn hydrate(&self) {
        self.restore_hints(false);
    }

    fn restore_hints(&self, loading: bool) {
        let role = self.store.get(StoreKey::Role).and_then(|r| Role::parse(&r));
        let user = self.store.get(StoreKey::UserEmail).map(|email| Identity {
            name: self.store.get(StoreKey::UserName).unwrap_or_default(),
            email,
        });
        let permissions = self
            .store
            .get(StoreKey::Permissions)
            .map(|p| split_permissions(&p))
            .unwrap_or_default();
        debug!(role = ?role, has_user = user.is_some(), "Hydrated session hints");

        self.state.send_modify(|s| {
            s.is_loading = loading;
            s.role = role;
            s.user = user;
            s.permissions = permissions;
        });
    }

    /// Is the stored session still valid?
    ///
    /// A rejected or missing access credential is renewed once through the
    /// refresh client. If renewal fails the session is cleared. Network
    /// trouble only marks the snapshot unauthenticated; stored credentials
    /// are kept.
    pub async fn check_auth(&self) -> bool {
        let role = self.role();
        let Some(token) = self.store.access_token(tier_of(role)) else {
            if self.refresher.has_refresh_credential() {
                debug!("No access token stored, trying the refresh credential");
                return self.recover(role).await;
            }
            debug!("No access token stored");
            self.state.send_modify(|s| {
                s.is_authenticated = false;
                s.user = None;
            });
            return false;
        };

        match self.fetch_profile(&token).await {
            Ok(Some(profile)) => {
                self.apply_profile(profile);
                true
            }
            Ok(None) => self.recover(role).await,
            Err(e) => {
                warn!(error = %e, "Session verification failed");
                self.state.send_modify(|s| s.is_authenticated = false);
                false
            }
        }
    }

    /// Access token was rejected or missing: refresh once and re-verify.
    async fn recover(&self, role: Option<Role>) -> bool {
        if !self.refresher.has_refresh_credential() {
            debug!("Access token rejected and no refresh credential");
            self.sign_out_local();
            return false;
        }

        let token = match self.refresher.refresh(role).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Refresh failed during verification, ending session");
                self.sign_out_local();
                return false;
            }
        };
        self.state.send_modify(|s| s.refreshed_at = Some(Utc::now()));

        match self.fetch_profile(&token).await {
            Ok(Some(profile)) => {
                self.apply_profile(profile);
                true
            }
            Ok(None) => {
                warn!("Refreshed token rejected, ending session");
                self.sign_out_local();
                false
            }
            Err(e) => {
                warn!(error = %e, "Session verification failed after refresh");
                self.state.send_modify(|s| s.is_authenticated = false);
                false
            }
        }
    }

    /// `Ok(None)` means the credential was rejected (401).
    async fn fetch_profile(&self, token: &str) -> Result<Option<ProfileResponse>, ApiError> {
        let request = HttpRequest::new(self.url(&self.verify_path), RequestOptions::get())
            .bearer(Some(token.to_string()));
        let response = self.transport.send(request).await?;

        if response.is_unauthorized() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        response
            .json()
            .map(Some)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    fn apply_profile(&self, profile: ProfileResponse) {
        let role = match self.role() {
            Some(role) => Some(role),
            None => profile
                .role
                .as_deref()
                .and_then(Role::parse)
                .and_then(|role| self.adopt_role(role)),
        };
        if let Some(ref user) = profile.user {
            self.persist(StoreKey::UserEmail, &user.email);
            self.persist(StoreKey::UserName, &user.name);
        }
        if !profile.permissions.is_empty() {
            self.persist(StoreKey::Permissions, &profile.permissions.join(","));
        }

        self.state.send_modify(|s| {
            s.is_authenticated = true;
            s.role = role;
            if profile.user.is_some() {
                s.user = profile.user;
            }
            if !profile.permissions.is_empty() {
                s.permissions = profile.permissions;
            }
            if s.established_at.is_none() {
                s.established_at = Some(Utc::now());
            }
        });
    }

    /// Take on a role first learned from the profile. The access token moves
    /// to the role's tier key so later reads still find it. Returns `None`
    /// if the move could not be stored.
    fn adopt_role(&self, role: Role) -> Option<Role> {
        let from = tier_of(None);
        let to = role.tier();
        if from != to {
            if let Some(token) = self.store.access_token(from) {
                let moved = self
                    .store
                    .set(StoreKey::AccessToken(to), &token)
                    .and_then(|()| self.store.remove(StoreKey::AccessToken(from)));
                if let Err(e) = moved {
                    warn!(role = role.as_str(), error = %e, "Failed to move access token to role tier");
                    return None;
                }
            }
        }
        self.persist(StoreKey::Role, role.as_str());
        info!(role = role.as_str(), "Role learned from profile");
        Some(role)
    }

    fn persist(&self, key: StoreKey, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key = key.name(), error = %e, "Failed to persist session hint");
        }
    }

    /// Record a freshly issued session and publish it.
    pub fn establish(&self, session: EstablishedSession) -> Result<(), StoreError> {
        let tier = tier_of(session.role);
        self.store.clear_session()?;
        self.store.set(StoreKey::AccessToken(tier), &session.access_token)?;
        if let Some(ref refresh) = session.refresh_token {
            self.store.set(StoreKey::RefreshToken, refresh)?;
        }
        if let Some(role) = session.role {
            self.store.set(StoreKey::Role, role.as_str())?;
        }
        self.store.set(StoreKey::UserEmail, &session.user.email)?;
        self.store.set(StoreKey::UserName, &session.user.name)?;
        if !session.permissions.is_empty() {
            self.store.set(StoreKey::Permissions, &session.permissions.join(","))?;
        }

        info!(email = %session.user.email, role = ?session.role, "Session established");
        let now = Utc::now();
        self.state.send_replace(AuthSnapshot {
            is_authenticated: true,
            is_loading: false,
            user: Some(session.user),
            role: session.role,
            permissions: session.permissions,
            established_at: Some(now),
            refreshed_at: None,
        });
        Ok(())
    }

    /// Clear all stored session state and publish a signed-out snapshot.
    ///
    /// Mounted guards stand down without redirecting, so callers own the
    /// navigation that follows.
    pub fn sign_out_local(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }
        self.state.send_replace(AuthSnapshot::default());
    }

    /// Explicit logout. The server is told on a best-effort basis; local
    /// state is cleared regardless.
    pub async fn logout(&self) {
        if let Some(token) = self.store.access_token(self.tier()) {
            let request = HttpRequest::new(self.url(LOGOUT_PATH), RequestOptions::post())
                .bearer(Some(token));
            if let Err(e) = self.transport.send(request).await {
                debug!(error = %e, "Logout notification failed");
            }
        }
        self.sign_out_local();
        info!("Logged out");
    }
}

impl<T: HttpTransport> AuthStore<T> {
    /// Renew the access credential every `every` while authenticated.
    /// A failed renewal ends the session and navigates to the entry route.
    pub fn spawn_renewal<N: Navigator>(
        self: Arc<Self>,
        every: Duration,
        navigator: Arc<N>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !self.state.borrow().is_authenticated {
                    continue;
                }
                match self.refresher.refresh(self.role()).await {
                    Ok(_) => {
                        self.state.send_modify(|s| s.refreshed_at = Some(Utc::now()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Scheduled renewal failed, ending session");
                        self.sign_out_local();
                        navigator.navigate(Route::Entry);
                    }
                }
            }
        })
    }
}

fn split_permissions(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
