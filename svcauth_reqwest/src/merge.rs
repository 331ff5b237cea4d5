//! Layered merging of configuration into an authenticated transport
//!
//! Settings are applied in the following order, with later layers replacing
//! earlier ones:
//!
//! 1. transport defaults: the `reqwest` defaults and the status guard that
//!    rejects `401 Unauthorized`
//! 2. `Authorization: Bearer <token>`, and `Accept-Language` if a non-empty
//!    language is configured
//! 3. caller headers from [`ClientOptions::headers`]
//! 4. [`TransportOverrides`][crate::TransportOverrides]: base URL, headers,
//!    timeouts, user agent, status predicate and extra middleware

use bytes::{BufMut, BytesMut};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, AUTHORIZATION, USER_AGENT,
};
use svcauth_tokens::AccessTokenRef;

use crate::{
    AuthenticatedTransport, AuthenticationError, ClientOptions, InjectHeaders, InvalidHeader,
    RejectStatus,
};

/// Resolves the base URL of service requests
///
/// The base URL is made to end with `/`, and the path prefix is appended with
/// its leading and trailing `/` characters removed.
///
/// ```
/// use svcauth_reqwest::resolve_base_url;
///
/// assert_eq!(
///     resolve_base_url("https://api.example.com/", Some("/my-service/")),
///     "https://api.example.com/my-service"
/// );
/// assert_eq!(
///     resolve_base_url("https://api.example.com", None),
///     "https://api.example.com/"
/// );
/// ```
pub fn resolve_base_url(base_url: &str, path_prefix: Option<&str>) -> String {
    let prefix = path_prefix.unwrap_or_default().trim_matches('/');

    let mut resolved = String::with_capacity(base_url.len() + prefix.len() + 1);
    resolved.push_str(base_url);
    if !resolved.ends_with('/') {
        resolved.push('/');
    }
    resolved.push_str(prefix);
    resolved
}

/// Merges the header layers for a transport using `access_token`
pub fn layered_headers(
    access_token: &AccessTokenRef,
    options: &ClientOptions,
) -> Result<HeaderMap, InvalidHeader> {
    let mut headers = HeaderMap::new();

    headers.insert(AUTHORIZATION, bearer(access_token)?);

    if let Some(language) = options.language.as_deref().filter(|l| !l.is_empty()) {
        let value = HeaderValue::from_str(language).map_err(|source| InvalidHeader::Value {
            name: ACCEPT_LANGUAGE.to_string(),
            source,
        })?;
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    for (name, value) in &options.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|source| InvalidHeader::Name {
                name: name.clone(),
                source,
            })?;
        let mut header_value =
            HeaderValue::from_str(value).map_err(|source| InvalidHeader::Value {
                name: name.clone(),
                source,
            })?;
        header_value.set_sensitive(header_name == AUTHORIZATION);
        headers.insert(header_name, header_value);
    }

    let overrides = &options.transport;
    if let Some(user_agent) = &overrides.user_agent {
        let value = HeaderValue::from_str(user_agent).map_err(|source| InvalidHeader::Value {
            name: USER_AGENT.to_string(),
            source,
        })?;
        headers.insert(USER_AGENT, value);
    }

    for name in overrides.headers.keys() {
        headers.remove(name);
        for value in overrides.headers.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    Ok(headers)
}

fn bearer(access_token: &AccessTokenRef) -> Result<HeaderValue, InvalidHeader> {
    let token = access_token.as_str();

    let mut header_value = BytesMut::with_capacity(token.len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_bytes());

    let mut value =
        HeaderValue::from_maybe_shared(header_value.freeze()).map_err(|source| {
            InvalidHeader::Value {
                name: AUTHORIZATION.to_string(),
                source,
            }
        })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Builds a transport that presents `access_token` to the services
pub(crate) fn build_transport(
    options: &ClientOptions,
    access_token: &AccessTokenRef,
) -> Result<AuthenticatedTransport, AuthenticationError> {
    let headers = layered_headers(access_token, options)?;
    let overrides = &options.transport;

    let base_url = match &overrides.base_url {
        Some(base_url) => base_url.clone(),
        None => resolve_base_url(&options.base_url, options.path_prefix.as_deref()),
    };

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = overrides.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(connect_timeout) = overrides.connect_timeout {
        builder = builder.connect_timeout(connect_timeout);
    }
    let client = builder.build().map_err(AuthenticationError::Build)?;

    let guard = match &overrides.reject_status {
        Some(predicate) => RejectStatus::from_shared(predicate.clone()),
        None => RejectStatus::new(),
    };

    let mut pipeline = reqwest_middleware::ClientBuilder::new(client)
        .with(guard)
        .with(InjectHeaders::new(headers));
    for middleware in &overrides.middleware {
        pipeline = pipeline.with_arc(middleware.clone());
    }

    tracing::debug!(base_url = %base_url, "built authenticated transport");

    Ok(AuthenticatedTransport::new(pipeline.build(), base_url))
}
