//! Errors raised while authenticating and while calling services

use std::{convert::Infallible, error::Error as StdError};

use reqwest::StatusCode;
use svcauth_tokens::TokenRequestError;
use thiserror::Error;

use crate::RejectedResponse;

/// An error returned from [`ApiClient::with_client()`][crate::ApiClient::with_client()]
#[derive(Debug, Error)]
pub enum Error<E> {
    /// Unable to obtain an authenticated transport
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    /// The action failed; the error is passed through untouched
    #[error(transparent)]
    Upstream(E),
}

impl<E> Error<E> {
    /// The authentication failure, if that is what this error is
    pub fn authentication(&self) -> Option<&AuthenticationError> {
        match self {
            Self::Authentication(err) => Some(err),
            Self::Upstream(_) => None,
        }
    }

    /// The error raised by the action, if that is what this error is
    pub fn upstream(&self) -> Option<&E> {
        match self {
            Self::Authentication(_) => None,
            Self::Upstream(err) => Some(err),
        }
    }

    /// Extracts the error raised by the action
    ///
    /// Gives the error back unchanged if it was an authentication failure.
    pub fn into_upstream(self) -> Result<E, Self> {
        match self {
            Self::Upstream(err) => Ok(err),
            other => Err(other),
        }
    }
}

/// An error while obtaining a token or building a transport around it
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The authority did not issue a token
    #[error(transparent)]
    Token(#[from] TokenRequestError),
    /// A configured or issued header could not be used
    #[error(transparent)]
    InvalidHeader(#[from] InvalidHeader),
    /// The HTTP client could not be constructed
    #[error("unable to build authenticated transport")]
    Build(#[source] reqwest::Error),
}

impl AuthenticationError {
    /// The token request failure, if that is what this error is
    pub fn token_error(&self) -> Option<&TokenRequestError> {
        match self {
            Self::Token(err) => Some(err),
            _ => None,
        }
    }
}

/// A header that cannot be sent over HTTP
#[derive(Debug, Error)]
pub enum InvalidHeader {
    /// The header name is not valid
    #[error("invalid header name `{name}`")]
    Name {
        /// The offending name
        name: String,
        /// The parse failure
        #[source]
        source: reqwest::header::InvalidHeaderName,
    },
    /// The header value is not valid
    #[error("invalid value for header `{name}`")]
    Value {
        /// The header whose value was rejected
        name: String,
        /// The parse failure
        #[source]
        source: reqwest::header::InvalidHeaderValue,
    },
}

/// An error raised while sending a request through an
/// [`AuthenticatedTransport`][crate::AuthenticatedTransport]
///
/// Rejections produced by the transport's status guard are surfaced as their
/// own variant so that the response status can be inspected without
/// downcasting.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The response was rejected by the status guard
    #[error(transparent)]
    Rejected(RejectedResponse),
    /// The request failed inside `reqwest`
    #[error(transparent)]
    Request(reqwest::Error),
    /// Some other middleware failed
    #[error(transparent)]
    Middleware(anyhow::Error),
}

impl TransportError {
    /// The status of the response that caused this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected(rejected) => Some(rejected.status()),
            Self::Request(err) => err.status(),
            Self::Middleware(err) => status_in_chain(err.as_ref()),
        }
    }
}

impl From<reqwest_middleware::Error> for TransportError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Middleware(err) => match err.downcast::<RejectedResponse>() {
                Ok(rejected) => Self::Rejected(rejected),
                Err(err) => Self::Middleware(err),
            },
            reqwest_middleware::Error::Reqwest(err) => Self::Request(err),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err)
    }
}

impl From<RejectedResponse> for TransportError {
    fn from(rejected: RejectedResponse) -> Self {
        Self::Rejected(rejected)
    }
}

/// Errors that may carry the status of the HTTP response that caused them
///
/// [`ApiClient::with_client()`][crate::ApiClient::with_client()] uses this to
/// recognize when a service rejected the current access token. Implement it
/// for your own error types by forwarding to the transport error they wrap.
pub trait ResponseStatus {
    /// The status of the response that caused this error, if any
    fn response_status(&self) -> Option<StatusCode>;

    /// Whether the error was caused by a `401 Unauthorized` response
    fn is_unauthorized(&self) -> bool {
        self.response_status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl ResponseStatus for TransportError {
    fn response_status(&self) -> Option<StatusCode> {
        self.status()
    }
}

impl ResponseStatus for RejectedResponse {
    fn response_status(&self) -> Option<StatusCode> {
        Some(self.status())
    }
}

impl ResponseStatus for reqwest_middleware::Error {
    fn response_status(&self) -> Option<StatusCode> {
        match self {
            reqwest_middleware::Error::Middleware(err) => status_in_chain(err.as_ref()),
            reqwest_middleware::Error::Reqwest(err) => err.status(),
        }
    }
}

impl ResponseStatus for reqwest::Error {
    fn response_status(&self) -> Option<StatusCode> {
        self.status()
    }
}

impl ResponseStatus for anyhow::Error {
    fn response_status(&self) -> Option<StatusCode> {
        status_in_chain(self.as_ref())
    }
}

impl ResponseStatus for Box<dyn StdError + Send + Sync> {
    fn response_status(&self) -> Option<StatusCode> {
        status_in_chain(&**self)
    }
}

impl ResponseStatus for Infallible {
    fn response_status(&self) -> Option<StatusCode> {
        match *self {}
    }
}

/// Walks an error's source chain looking for a transport-level status
fn status_in_chain(err: &(dyn StdError + 'static)) -> Option<StatusCode> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(rejected) = err.downcast_ref::<RejectedResponse>() {
            return Some(rejected.status());
        }
        if let Some(err) = err.downcast_ref::<TransportError>() {
            return err.status();
        }
        if let Some(err) = err.downcast_ref::<reqwest_middleware::Error>() {
            return err.response_status();
        }
        if let Some(status) = err.downcast_ref::<reqwest::Error>().and_then(|e| e.status()) {
            return Some(status);
        }
        current = err.source();
    }
    None
}

/// An error in the configuration of a service client
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No service name was given
    #[error("service name must not be empty")]
    EmptyService,
    /// The base URL cannot be parsed
    #[error("base URL `{base_url}` is not a valid URL")]
    InvalidBaseUrl {
        /// The configured base URL
        base_url: String,
        /// The parse failure
        #[source]
        source: url::ParseError,
    },
    /// The options are not shaped as expected
    #[error("invalid service client options")]
    Deserialize(#[from] serde_json::Error),
}
