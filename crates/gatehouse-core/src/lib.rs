//! Gatehouse core - client-side session guard for a two-tier operator dashboard.
//!
//! This crate decides, for every protected view, whether the caller holds a
//! valid session and the required permission, and keeps the access
//! credential renewed in the background.
//!
//! - `store`: tab- and profile-scoped credential storage
//! - `auth`: refresh client, login, and the process-wide `AuthStore`
//! - `api`: HTTP transport and the refresh-and-retry `AuthClient`
//! - `guard`: the per-view `SessionGuard` state machine
//! - `navigate`: routes a failed check can force
//! - `config`: file-backed configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod navigate;
pub mod store;

pub use api::{ApiError, AuthClient, HttpTransport, ReqwestTransport, RequestOptions};
pub use auth::{AuthSnapshot, AuthStore, LoginOutcome, Role, Tier};
pub use config::Config;
pub use guard::{GuardConfig, GuardState, Render, SessionGuard, Verifier};
pub use navigate::{Navigator, Route};
pub use store::{CredentialStore, FileStore, MemoryStore};
