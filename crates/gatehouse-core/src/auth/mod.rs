//! Authentication: account tiers, token refresh, and session state.
//!
//! This module provides:
//! - `Role` / `Tier`: account classes and the refresh endpoint table
//! - `TokenRefresher`: exchanges the refresh credential for a new access token
//! - `AuthStore`: process-wide session state with init/check/logout lifecycle
//! - Login and OTP establishment on `AuthStore`
//!
//! Access tokens live ~15 minutes and are renewed every 14.

pub mod login;
pub mod refresh;
pub mod role;
pub mod state;

pub use login::LoginOutcome;
pub use refresh::TokenRefresher;
pub use role::{refresh_path, tier_of, Role, Tier, DEFAULT_REFRESH_PATH};
pub use state::{AuthSnapshot, AuthStore, EstablishedSession, Identity};
