//! View-level session guard.
//!
//! A `SessionGuard` is mounted in front of a protected view. It runs one
//! debounced hard verification, gates rendering on the result, checks the
//! view's required permissions, and re-verifies in the background while
//! authorized.
//!
//! ```text
//! Unverified --debounce--> Verifying --+--> Authorized --(every interval)--+
//!                                      |        ^                          |
//!                                      |        +------- still valid ------+
//!                                      +--> Unauthorized <-- check failed -+
//! ```

pub mod budget;
pub mod flight;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::HttpTransport;
use crate::auth::{AuthSnapshot, AuthStore};
use crate::config::Config;
use crate::navigate::{Navigator, Route};

pub use budget::RedirectBudget;
pub use flight::{InFlight, InFlightPermit};

/// Session-validation collaborator consulted by the guard.
pub trait Verifier: Send + Sync + 'static {
    /// Is the current session valid? May hit the network.
    fn check_auth(&self) -> impl Future<Output = bool> + Send;

    fn has_permission(&self, permission: &str) -> bool;

    /// True while the collaborator is still initializing.
    fn is_loading(&self) -> bool;

    /// Stable identity of the signed-in account, if any.
    fn identity_key(&self) -> Option<String>;

    fn subscribe(&self) -> watch::Receiver<AuthSnapshot>;
}

impl<T: HttpTransport> Verifier for AuthStore<T> {
    async fn check_auth(&self) -> bool {
        AuthStore::check_auth(self).await
    }

    fn has_permission(&self, permission: &str) -> bool {
        AuthStore::has_permission(self, permission)
    }

    fn is_loading(&self) -> bool {
        AuthStore::is_loading(self)
    }

    fn identity_key(&self) -> Option<String> {
        self.snapshot().identity_key().map(str::to_string)
    }

    fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        AuthStore::subscribe(self)
    }
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub debounce: Duration,
    pub background_interval: Duration,
    pub redirect_budget: u32,
    pub verify_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig::from(&Config::default())
    }
}

impl From<&Config> for GuardConfig {
    fn from(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            background_interval: Duration::from_secs(config.background_interval_secs),
            redirect_budget: config.redirect_budget,
            verify_timeout: Duration::from_secs(config.verify_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum GuardState {
    Unverified,
    Verifying,
    Authorized,
    Unauthorized,
}

/// What the guarded view should draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    Nothing,
    Loading,
    Children,
}

impl GuardState {
    pub fn render(&self) -> Render {
        match self {
            GuardState::Unverified | GuardState::Verifying => Render::Loading,
            GuardState::Authorized => Render::Children,
            // The redirect takes care of navigation
            GuardState::Unauthorized => Render::Nothing,
        }
    }
}

struct Shared<V: Verifier, N: Navigator> {
    verifier: Arc<V>,
    navigator: Arc<N>,
    config: GuardConfig,
    permissions: Vec<String>,
    state: watch::Sender<GuardState>,
    in_flight: InFlight,
    budget: Mutex<RedirectBudget>,
    /// Identity observed at the end of the last verification
    verified_identity: Mutex<Option<String>>,
    mounted: AtomicBool,
    /// Bumped on every arm and on unmount; stale lifecycles check it before
    /// touching state.
    generation: AtomicU64,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Verifier, N: Navigator> Shared<V, N> {
    fn is_current(&self, generation: u64) -> bool {
        self.mounted.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    fn set_state(&self, generation: u64, next: GuardState) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Guard transition");
        }
        true
    }

    /// Start (or restart) the lifecycle: debounce, hard verification, then
    /// background re-verification. A no-op while a verification is in flight.
    fn arm(self: &Arc<Self>) {
        if !self.mounted.load(Ordering::Acquire) {
            return;
        }
        if self.in_flight.is_busy() {
            debug!("Verification in flight, trigger ignored");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_replace(GuardState::Unverified);

        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move { shared.run(generation).await });
        if let Some(previous) = lock(&self.lifecycle).replace(handle) {
            previous.abort();
        }
    }

    async fn run(&self, generation: u64) {
        loop {
            tokio::time::sleep(self.config.debounce).await;
            if !self.verifier.is_loading() {
                break;
            }
            debug!("Auth store still initializing, deferring verification");
        }

        let Some(permit) = self.in_flight.try_acquire() else {
            debug!("Verification already in flight");
            return;
        };
        if !self.set_state(generation, GuardState::Verifying) {
            return;
        }

        let authenticated = self.verify().await;
        if !self.is_current(generation) {
            return;
        }
        let authorized = self.decide(generation, authenticated);
        drop(permit);

        if authorized {
            self.reverify_periodically(generation).await;
        }
    }

    async fn verify(&self) -> bool {
        let outcome =
            tokio::time::timeout(self.config.verify_timeout, self.verifier.check_auth()).await;
        *lock(&self.verified_identity) = self.verifier.identity_key();

        match outcome {
            Ok(authenticated) => authenticated,
            Err(_) => {
                warn!(timeout = ?self.config.verify_timeout, "Session verification timed out");
                false
            }
        }
    }

    /// Apply a hard verification result. Returns true when authorized.
    fn decide(&self, generation: u64, authenticated: bool) -> bool {
        if !authenticated {
            let (allowed, used) = {
                let mut budget = lock(&self.budget);
                (budget.spend(), budget.used())
            };
            if allowed {
                info!(attempt = used, "Session invalid, redirecting to entry");
                self.navigator.navigate(Route::Entry);
            } else {
                warn!(attempts = used, "Redirect budget exhausted, no longer redirecting");
            }
            self.set_state(generation, GuardState::Unauthorized);
            return false;
        }

        if !self.permissions.is_empty()
            && !self
                .permissions
                .iter()
                .any(|p| self.verifier.has_permission(p))
        {
            info!(required = ?self.permissions, "Missing permission, redirecting to forbidden");
            self.navigator.navigate(Route::Forbidden);
            self.set_state(generation, GuardState::Unauthorized);
            return false;
        }

        lock(&self.budget).reset();
        self.set_state(generation, GuardState::Authorized)
    }

    /// Background checks keep the view rendered; the state stays
    /// `Authorized` until one fails.
    async fn reverify_periodically(&self, generation: u64) {
        let every = self.config.background_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(_permit) = self.in_flight.try_acquire() else {
                continue;
            };

            let authenticated = self.verify().await;
            if !self.is_current(generation) {
                return;
            }
            if !authenticated {
                // Authoritative: no budget check
                warn!("Background verification failed, redirecting to entry");
                self.navigator.navigate(Route::Entry);
                self.set_state(generation, GuardState::Unauthorized);
                return;
            }
        }
    }

    /// The verified session was ended elsewhere. Whoever ended it has
    /// already navigated, so the guard only stops and hides the view.
    fn stand_down(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = lock(&self.lifecycle).take() {
            handle.abort();
        }
        *lock(&self.verified_identity) = None;
        self.state.send_replace(GuardState::Unauthorized);
    }

    /// Re-arm when the signed-in account changes; stand down when the
    /// verified account signs out. Other store updates are ignored.
    async fn follow_identity(shared: Arc<Self>, mut changes: watch::Receiver<AuthSnapshot>) {
        while changes.changed().await.is_ok() {
            let (identity, authenticated) = {
                let snapshot = changes.borrow_and_update();
                (
                    snapshot.identity_key().map(str::to_string),
                    snapshot.is_authenticated,
                )
            };
            if shared.in_flight.is_busy() {
                continue;
            }
            let verified = lock(&shared.verified_identity).clone();
            if identity == verified {
                continue;
            }
            if identity.is_none() && !authenticated {
                debug!(from = ?verified, "Signed out elsewhere, guard standing down");
                shared.stand_down();
            } else {
                debug!(from = ?verified, to = ?identity, "Identity changed, re-verifying");
                shared.arm();
            }
        }
    }
}

/// A mounted guard. Dropping it unmounts.
pub struct SessionGuard<V: Verifier, N: Navigator> {
    shared: Arc<Shared<V, N>>,
    watcher: Option<JoinHandle<()>>,
}

impl<V: Verifier, N: Navigator> SessionGuard<V, N> {
    /// Mount a guard requiring any one of `permissions` (none if empty).
    /// Must be called from within a tokio runtime.
    pub fn mount(
        verifier: Arc<V>,
        navigator: Arc<N>,
        permissions: Vec<String>,
        config: GuardConfig,
    ) -> Self {
        let (state, _) = watch::channel(GuardState::Unverified);
        let budget = RedirectBudget::new(config.redirect_budget);
        let changes = verifier.subscribe();

        let shared = Arc::new(Shared {
            verifier,
            navigator,
            config,
            permissions,
            state,
            in_flight: InFlight::new(),
            budget: Mutex::new(budget),
            verified_identity: Mutex::new(None),
            mounted: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            lifecycle: Mutex::new(None),
        });

        let watcher = tokio::spawn(Shared::follow_identity(shared.clone(), changes));
        shared.arm();

        Self {
            shared,
            watcher: Some(watcher),
        }
    }

    /// Re-render notification. Restarts the debounce unless the view is
    /// already authorized or a verification is in flight.
    pub fn trigger(&self) {
        if self.state() == GuardState::Authorized {
            return;
        }
        self.shared.arm();
    }

    pub fn state(&self) -> GuardState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.shared.state.subscribe()
    }

    pub fn render(&self) -> Render {
        self.state().render()
    }

    /// Failed hard verifications since the last success
    pub fn redirects_used(&self) -> u32 {
        lock(&self.shared.budget).used()
    }

    pub fn is_verifying(&self) -> bool {
        self.shared.in_flight.is_busy()
    }

    /// Cancel pending timers and background checks. A verification that
    /// resolves afterwards changes nothing.
    pub fn unmount(&mut self) {
        if !self.shared.mounted.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = lock(&self.shared.lifecycle).take() {
            handle.abort();
        }
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
        debug!("Guard unmounted");
    }
}

impl<V: Verifier, N: Navigator> Drop for SessionGuard<V, N> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::auth::Identity;
    use crate::navigate::testing::RecordingNavigator;

    struct FakeVerifier {
        outcomes: Mutex<VecDeque<bool>>,
        fallback: bool,
        calls: AtomicUsize,
        delay: Duration,
        loading: AtomicBool,
        permissions: Vec<String>,
        snapshot: watch::Sender<AuthSnapshot>,
    }

    impl FakeVerifier {
        fn new(fallback: bool) -> Self {
            let (snapshot, _) = watch::channel(AuthSnapshot::default());
            Self {
                outcomes: Mutex::new(VecDeque::new()),
                fallback,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                loading: AtomicBool::new(false),
                permissions: Vec::new(),
                snapshot,
            }
        }

        fn outcomes(self, outcomes: &[bool]) -> Self {
            *self.outcomes.lock().unwrap() = outcomes.iter().copied().collect();
            self
        }

        fn delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn permissions(mut self, permissions: &[&str]) -> Self {
            self.permissions = permissions.iter().map(|p| p.to_string()).collect();
            self
        }

        fn set_user(&self, email: Option<&str>) {
            self.snapshot.send_modify(|s| {
                s.user = email.map(|e| Identity {
                    name: String::new(),
                    email: e.to_string(),
                })
            });
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Verifier for FakeVerifier {
        async fn check_auth(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.outcomes.lock().unwrap().pop_front();
            next.unwrap_or(self.fallback)
        }

        fn has_permission(&self, permission: &str) -> bool {
            self.permissions.iter().any(|p| p == permission)
        }

        fn is_loading(&self) -> bool {
            self.loading.load(Ordering::SeqCst)
        }

        fn identity_key(&self) -> Option<String> {
            self.snapshot.borrow().identity_key().map(str::to_string)
        }

        fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
            self.snapshot.subscribe()
        }
    }

    type Guard = SessionGuard<FakeVerifier, RecordingNavigator>;

    fn mount_with(
        verifier: &Arc<FakeVerifier>,
        permissions: &[&str],
        config: GuardConfig,
    ) -> (Guard, Arc<RecordingNavigator>) {
        let navigator = Arc::new(RecordingNavigator::new());
        let guard = SessionGuard::mount(
            verifier.clone(),
            navigator.clone(),
            permissions.iter().map(|p| p.to_string()).collect(),
            config,
        );
        (guard, navigator)
    }

    fn mount(verifier: &Arc<FakeVerifier>, permissions: &[&str]) -> (Guard, Arc<RecordingNavigator>) {
        mount_with(verifier, permissions, GuardConfig::default())
    }

    /// Past the debounce window
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_session_renders_children() {
        let verifier = Arc::new(FakeVerifier::new(true));
        let (guard, nav) = mount(&verifier, &[]);
        assert_eq!(guard.render(), Render::Loading);

        settle().await;

        assert_eq!(guard.state(), GuardState::Authorized);
        assert_eq!(guard.render(), Render::Children);
        assert_eq!(guard.redirects_used(), 0);
        assert_eq!(verifier.calls(), 1);
        assert!(nav.routes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_session_redirects_to_entry_once() {
        let verifier = Arc::new(FakeVerifier::new(false));
        let (guard, nav) = mount(&verifier, &[]);

        settle().await;

        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(guard.render(), Render::Nothing);
        assert_eq!(nav.routes(), vec![Route::Entry]);

        // No background checks while unauthorized
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(verifier.calls(), 1);
        assert_eq!(nav.routes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_permission_redirects_to_forbidden() {
        let verifier = Arc::new(FakeVerifier::new(true));
        let (guard, nav) = mount(&verifier, &["billing:write"]);

        settle().await;

        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(nav.routes(), vec![Route::Forbidden]);
        assert_eq!(guard.redirects_used(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_listed_permission_grants_access() {
        let verifier = Arc::new(FakeVerifier::new(true).permissions(&["billing:read"]));
        let (guard, nav) = mount(&verifier, &["billing:write", "billing:read"]);

        settle().await;

        assert_eq!(guard.state(), GuardState::Authorized);
        assert!(nav.routes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_triggers_issue_one_verification() {
        let verifier = Arc::new(FakeVerifier::new(true));
        let (guard, _nav) = mount(&verifier, &[]);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            guard.trigger();
        }
        assert_eq!(verifier.calls(), 0);

        settle().await;
        assert_eq!(verifier.calls(), 1);
        assert_eq!(guard.state(), GuardState::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_remounts_issue_one_verification() {
        let verifier = Arc::new(FakeVerifier::new(true));
        for _ in 0..4 {
            let (guard, _nav) = mount(&verifier, &[]);
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        }
        let (guard, _nav) = mount(&verifier, &[]);

        settle().await;
        assert_eq!(verifier.calls(), 1);
        assert_eq!(guard.state(), GuardState::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_budget_stops_redirect_loop() {
        let verifier = Arc::new(FakeVerifier::new(false));
        let (guard, nav) = mount(&verifier, &[]);
        settle().await;

        for _ in 0..4 {
            guard.trigger();
            settle().await;
        }

        assert_eq!(verifier.calls(), 5);
        assert_eq!(nav.count(Route::Entry), 3);
        assert_eq!(guard.redirects_used(), 5);
        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(guard.render(), Render::Nothing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_redirect_budget() {
        let verifier = Arc::new(FakeVerifier::new(true).outcomes(&[false, false, true]));
        let (guard, nav) = mount(&verifier, &[]);
        settle().await;
        guard.trigger();
        settle().await;
        assert_eq!(guard.redirects_used(), 2);

        guard.trigger();
        settle().await;

        assert_eq!(guard.state(), GuardState::Authorized);
        assert_eq!(guard.redirects_used(), 0);
        assert_eq!(nav.count(Route::Entry), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failure_redirects_immediately() {
        let verifier = Arc::new(FakeVerifier::new(true).outcomes(&[true, true, false]));
        let (guard, nav) = mount(&verifier, &[]);
        settle().await;
        assert_eq!(guard.state(), GuardState::Authorized);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(verifier.calls(), 2);
        assert_eq!(guard.state(), GuardState::Authorized);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(verifier.calls(), 3);
        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(nav.routes(), vec![Route::Entry]);
        assert_eq!(guard.redirects_used(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(verifier.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_redirect_ignores_budget() {
        let verifier = Arc::new(FakeVerifier::new(false).outcomes(&[true]));
        let config = GuardConfig {
            redirect_budget: 0,
            ..GuardConfig::default()
        };
        let (guard, nav) = mount_with(&verifier, &[], config);
        settle().await;
        assert_eq!(guard.state(), GuardState::Authorized);

        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(nav.routes(), vec![Route::Entry]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defers_while_auth_store_loading() {
        let verifier = Arc::new(FakeVerifier::new(true));
        verifier.loading.store(true, Ordering::SeqCst);
        let (guard, _nav) = mount(&verifier, &[]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(verifier.calls(), 0);
        assert_eq!(guard.render(), Render::Loading);

        verifier.loading.store(false, Ordering::SeqCst);
        settle().await;
        assert_eq!(verifier.calls(), 1);
        assert_eq!(guard.state(), GuardState::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_verification() {
        let verifier = Arc::new(FakeVerifier::new(true));
        let (mut guard, nav) = mount(&verifier, &[]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        guard.unmount();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(verifier.calls(), 0);
        assert!(nav.routes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_after_unmount_is_ignored() {
        let verifier = Arc::new(FakeVerifier::new(false).delay(Duration::from_secs(1)));
        let (mut guard, nav) = mount(&verifier, &[]);
        settle().await;
        assert_eq!(guard.state(), GuardState::Verifying);
        assert!(guard.is_verifying());

        guard.unmount();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(verifier.calls(), 1);
        assert!(nav.routes().is_empty());
        assert_eq!(guard.state(), GuardState::Verifying);
        assert!(!guard.is_verifying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_verification_is_noop() {
        let verifier = Arc::new(FakeVerifier::new(true).delay(Duration::from_secs(1)));
        let (guard, _nav) = mount(&verifier, &[]);
        settle().await;
        assert_eq!(guard.state(), GuardState::Verifying);

        guard.trigger();
        assert_eq!(guard.state(), GuardState::Verifying);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(verifier.calls(), 1);
        assert_eq!(guard.state(), GuardState::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_change_rearms_verification() {
        let verifier = Arc::new(FakeVerifier::new(true));
        verifier.set_user(Some("ada@example.com"));
        let (guard, _nav) = mount(&verifier, &[]);
        settle().await;
        assert_eq!(verifier.calls(), 1);

        verifier.set_user(Some("grace@example.com"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(guard.state(), GuardState::Unverified);
        settle().await;
        assert_eq!(verifier.calls(), 2);
        assert_eq!(guard.state(), GuardState::Authorized);

        // Same account, unrelated field
        verifier.snapshot.send_modify(|s| s.permissions.push("x".into()));
        settle().await;
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_elsewhere_stands_down_without_redirect() {
        let verifier = Arc::new(FakeVerifier::new(true));
        verifier.set_user(Some("ada@example.com"));
        let (guard, nav) = mount(&verifier, &[]);
        settle().await;
        assert_eq!(guard.state(), GuardState::Authorized);

        verifier.set_user(None);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(guard.render(), Render::Nothing);
        assert!(nav.routes().is_empty());
        assert_eq!(guard.redirects_used(), 0);

        // No verification and no background checks after standing down
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(verifier.calls(), 1);

        // Signing back in re-arms
        verifier.set_user(Some("ada@example.com"));
        settle().await;
        assert_eq!(verifier.calls(), 2);
        assert_eq!(guard.state(), GuardState::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_verification_times_out() {
        let verifier = Arc::new(FakeVerifier::new(true).delay(Duration::from_secs(120)));
        let (guard, nav) = mount(&verifier, &[]);

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(nav.routes(), vec![Route::Entry]);
        assert!(!guard.is_verifying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_over_auth_store() {
        use crate::auth::state::tests::{ada, auth_store, ME};
        use crate::auth::Role;

        let (transport, auth) = auth_store(false);
        auth.establish(ada(Some(Role::Admin))).unwrap();
        transport.respond(ME, 200, r#"{"permissions":["billing:read"]}"#);

        let navigator = Arc::new(RecordingNavigator::new());
        let guard = SessionGuard::mount(
            auth.clone(),
            navigator.clone(),
            vec!["billing:read".to_string()],
            GuardConfig::default(),
        );
        settle().await;

        assert_eq!(guard.state(), GuardState::Authorized);
        assert_eq!(transport.sent_to(ME).len(), 1);
        assert!(navigator.routes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_data_call_redirects_once() {
        use crate::api::{AuthClient, RequestOptions};
        use crate::auth::state::tests::{ada, auth_store, ME};
        use crate::auth::Role;

        let (transport, auth) = auth_store(false);
        auth.establish(ada(Some(Role::Admin))).unwrap();
        transport.respond(ME, 200, r#"{"permissions":["billing:read"]}"#);
        let navigator = Arc::new(RecordingNavigator::new());
        let guard = SessionGuard::mount(
            auth.clone(),
            navigator.clone(),
            Vec::new(),
            GuardConfig::default(),
        );
        settle().await;
        assert_eq!(guard.state(), GuardState::Authorized);

        let users = "http://dash.test/api/users";
        transport.respond(users, 401, "");
        transport.respond("http://dash.test/api/admin/refresh", 401, "");
        let client = AuthClient::new(transport.clone(), auth.clone(), navigator.clone());
        assert!(client.request(users, RequestOptions::get()).await.is_err());
        settle().await;

        assert_eq!(navigator.routes(), vec![Route::Entry]);
        assert_eq!(guard.state(), GuardState::Unauthorized);
        assert_eq!(guard.redirects_used(), 0);
        assert_eq!(transport.sent_to(ME).len(), 1);
    }
}
