//! Acquisition of access tokens via the OAuth2 _client credentials_ flow
//!
//! This crate covers the narrow job of trading a client ID and secret for an
//! access token. It makes one request per call and holds no state between
//! calls; deciding when a token must be replaced is left to the consumer (see
//! the `svcauth_reqwest` crate, which re-authenticates when a service rejects
//! the current token).
//!
//! Secrets and tokens are held in newtypes that redact their values from
//! `Debug` and `Display` output. Use the alternate form (`{:#?}`) to reveal a
//! short prefix while debugging.
//!
//! ```
//! use svcauth_tokens::{oauth2, ClientId, ClientSecret};
//!
//! let credentials = oauth2::dto::ClientCredentials {
//!     client_id: ClientId::from_static("my-client-id"),
//!     client_secret: ClientSecret::from_static("my-client-secret"),
//! };
//!
//! let source = oauth2::ClientCredentialsTokenSource::for_base_url(
//!     reqwest::Client::new(),
//!     "https://api.example.com/",
//!     None,
//!     credentials,
//! );
//!
//! assert_eq!(source.token_url(), "https://api.example.com/auth/v1/oauth2/token");
//! # let _ = async move {
//! let token = source.request_token().await?;
//! tracing::info!(token = format_args!("{:#?}", token), "obtained access token");
//! # Ok::<_, oauth2::TokenRequestError>(())
//! # };
//! ```
//!
//! # Features
//!
//! * `rustls-tls` (default): Uses `rustls` for HTTPS connections to the authority.
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
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod oauth2;

pub use braids::*;
pub use oauth2::{ClientCredentialsTokenSource, TokenRequestError, DEFAULT_OAUTH_PATH};
