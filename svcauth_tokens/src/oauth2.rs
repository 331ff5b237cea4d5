//! A token source that uses an OAuth2 server as an authority

use std::{fmt, sync::Arc};

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::AccessToken;

pub mod dto;

/// The path of the token endpoint used when none is configured
pub const DEFAULT_OAUTH_PATH: &str = "/auth/v1/oauth2/token";

/// A token source for the client credentials flow
///
/// Each call to [`request_token()`][Self::request_token()] performs exactly one
/// exchange with the authority. Caching and renewal are left to the caller.
#[derive(Clone, Debug)]
pub struct ClientCredentialsTokenSource {
    client: reqwest::Client,
    token_url: String,
    credentials: Arc<dto::ClientCredentials>,
}

impl ClientCredentialsTokenSource {
    /// Constructs a new client credentials source
    ///
    /// The token URL is not validated until a token is requested.
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        credentials: impl Into<Arc<dto::ClientCredentials>>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            credentials: credentials.into(),
        }
    }

    /// Constructs a source whose token endpoint is `oauth_path` relative to `base_url`
    ///
    /// When `oauth_path` is `None` or empty, [`DEFAULT_OAUTH_PATH`] is used.
    pub fn for_base_url(
        client: reqwest::Client,
        base_url: &str,
        oauth_path: Option<&str>,
        credentials: impl Into<Arc<dto::ClientCredentials>>,
    ) -> Self {
        let oauth_path = oauth_path
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_OAUTH_PATH);

        Self::new(client, combine_url(base_url, oauth_path), credentials)
    }

    /// The URL that token requests are sent to
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// The credentials presented to the authority
    pub fn credentials(&self) -> &dto::ClientCredentials {
        &self.credentials
    }

    /// Requests a new access token from the authority
    #[tracing::instrument(
        err,
        skip(self),
        fields(
            token_url = %self.token_url,
            credentials.grant_type = "client_credentials",
            credentials.client_id = %self.credentials.client_id,
        ),
    )]
    pub async fn request_token(&self) -> Result<AccessToken, TokenRequestError> {
        tracing::trace!("requesting token from authority");

        let resp = self
            .client
            .post(&self.token_url)
            .form(&*self.credentials)
            .send()
            .await
            .map_err(TokenRequestError::RequestSend)?;

        let status = resp.status();
        tracing::debug!(
            response.status = status.as_u16(),
            "received token response from issuing authority"
        );

        let body = resp
            .bytes()
            .await
            .map_err(TokenRequestError::BodyReadError)?;

        match status {
            StatusCode::OK => {}
            StatusCode::BAD_REQUEST => {
                return Err(TokenRequestError::InvalidRequest {
                    body: dto::serialize_error_body(&body),
                })
            }
            status => return Err(TokenRequestError::UnexpectedStatus { status }),
        }

        let access_token = dto::access_token_from_body(&body)?;

        tracing::info!("received new access token");

        Ok(access_token)
    }
}

/// Joins a base URL and a path with exactly one `/` between them
///
/// An absolute `path` replaces the base entirely.
pub fn combine_url(base_url: &str, path: &str) -> String {
    if is_absolute_url(path) {
        return path.to_owned();
    }

    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{}/{}", base, path)
    }
}

fn is_absolute_url(path: &str) -> bool {
    match path.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => path.starts_with("//"),
    }
}

/// An error while attempting to request a new token from the authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// The authority rejected the request as invalid
    #[error("invalid token request: {body}")]
    InvalidRequest {
        /// The serialized body of the rejection
        body: String,
    },
    /// The authority responded with a status other than 200 or 400
    #[error("unexpected token response status: {status}")]
    UnexpectedStatus {
        /// The status returned by the authority
        status: StatusCode,
    },
    /// The authority responded with success, but the body does not carry a token
    #[error(transparent)]
    MalformedBody(#[from] MalformedTokenBody),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(#[source] reqwest::Error),
    /// Unable to send a token request to the authority
    #[error("error sending request to authority")]
    RequestSend(#[source] reqwest::Error),
}

impl TokenRequestError {
    /// The HTTP status reported by the authority, if a response was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::InvalidRequest { .. } => Some(StatusCode::BAD_REQUEST),
            Self::UnexpectedStatus { status } => Some(*status),
            Self::MalformedBody(_) => Some(StatusCode::OK),
            Self::BodyReadError(e) | Self::RequestSend(e) => e.status(),
        }
    }
}

/// A successful token response whose body does not match expectations
#[derive(Debug, Error)]
pub enum MalformedTokenBody {
    /// The body is not a JSON object
    #[error("unexpected token response data: {body}")]
    NotAnObject {
        /// The raw body
        body: String,
    },
    /// The `access_token` field is missing or is not a string
    #[error("unexpected type of access_token: {}", DisplayFound(.found))]
    AccessTokenNotAString {
        /// The value found in place of the token, if any
        found: Option<Value>,
    },
}

struct DisplayFound<'a>(&'a Option<Value>);

impl fmt::Display for DisplayFound<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("<missing>"),
        }
    }
}
