//! HTTP access to the dashboard backend.
//!
//! `AuthClient` wraps every authenticated call with one-shot token refresh.
//! `HttpTransport` is the seam to the network; `ReqwestTransport` is the
//! production implementation.

pub mod client;
pub mod error;
pub mod transport;

pub use client::AuthClient;
pub use error::{ApiError, RefreshError};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, RequestOptions,
    TransportError,
};
