//! Lazily authenticated `reqwest` clients for services protected by the OAuth2
//! _client credentials_ flow
//!
//! An [`ApiClient`] trades its client ID and secret for an access token the
//! first time it is used, and builds an [`AuthenticatedTransport`] that sends
//! the token as a bearer token with every request. The transport is kept for
//! later calls. When a service answers `401 Unauthorized`, the client obtains a
//! new token and runs the failed action once more.
//!
//! ```no_run
//! use svcauth_reqwest::{ApiClient, ClientOptions, TransportError};
//! use svcauth_tokens::oauth2::dto::ClientCredentials;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(
//!     ClientOptions::new(
//!         ClientCredentials::new("my-client-id", "my-client-secret"),
//!         "https://api.example.com/",
//!     )
//!     .with_path_prefix("orders/v1")
//!     .with_language("de"),
//! );
//!
//! // GET https://api.example.com/orders/v1/orders
//! let orders: serde_json::Value = api
//!     .with_client(|client| async move {
//!         let resp = client.get("/orders").send().await?;
//!         Ok::<_, TransportError>(resp.json().await?)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Only a `401 Unauthorized` response is turned into an error by the
//! transport. Every other status is handed to the action as a normal response.
//! The action's error type decides how a rejection is recognized, through
//! [`ResponseStatus`]; the error types of `reqwest`, `reqwest-middleware` and
//! `anyhow` are supported, as is [`TransportError`].
//!
//! Clients for a single versioned service are built with
//! [`create_service_client()`]:
//!
//! ```
//! use svcauth_reqwest::{create_service_client, ClientOptions, ServiceClientOptions};
//! use svcauth_tokens::oauth2::dto::ClientCredentials;
//!
//! let client = create_service_client(ServiceClientOptions::new(
//!     "orders",
//!     ClientOptions::new(
//!         ClientCredentials::new("my-client-id", "my-client-secret"),
//!         "https://api.example.com/",
//!     ),
//! ))?;
//!
//! assert_eq!(client.options().path_prefix.as_deref(), Some("orders/v1"));
//! # Ok::<_, svcauth_reqwest::ConfigError>(())
//! ```
//!
//! # Features
//!
//! * `rustls-tls` (default): Uses `rustls` for HTTPS connections.
//! * `native-tls`: Uses the platform TLS implementation instead.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod client;
mod error;
mod merge;
mod middleware;
mod options;
mod service;
mod transport;

pub use client::ApiClient;
pub use error::{
    AuthenticationError, ConfigError, Error, InvalidHeader, ResponseStatus, TransportError,
};
pub use merge::{layered_headers, resolve_base_url};
pub use middleware::{InjectHeaders, RejectStatus, RejectedResponse, StatusPredicate, Unauthorized};
pub use options::{ClientOptions, TransportOverrides};
pub use service::{create_service_client, ServiceClientOptions, DEFAULT_SERVICE_VERSION};
pub use transport::AuthenticatedTransport;
