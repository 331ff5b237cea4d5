use std::{fmt, sync::Arc};

use reqwest::Method;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use svcauth_tokens::oauth2::combine_url;

/// An HTTP client that is already authenticated against the services
///
/// Requests are addressed relative to the transport's base URL, and carry the
/// bearer token together with any configured headers. A `401 Unauthorized`
/// response is returned as an error (see [`RejectStatus`][crate::RejectStatus]);
/// every other status is returned as a normal response.
///
/// Transports are cheap to clone. They are never modified once built: when the
/// token is renewed, a new transport takes the place of the old one.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    client: ClientWithMiddleware,
    base_url: Arc<str>,
}

impl AuthenticatedTransport {
    pub(crate) fn new(client: ClientWithMiddleware, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// The base URL that request paths are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a path against the base URL
    ///
    /// Absolute URLs are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        combine_url(&self.base_url, path)
    }

    /// Starts building a request to `path`
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Starts building a `GET` request to `path`
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Starts building a `POST` request to `path`
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Starts building a `PUT` request to `path`
    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    /// Starts building a `PATCH` request to `path`
    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    /// Starts building a `DELETE` request to `path`
    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// Starts building a `HEAD` request to `path`
    pub fn head(&self, path: &str) -> RequestBuilder {
        self.request(Method::HEAD, path)
    }

    /// The underlying client, for requests that bypass base URL resolution
    pub fn inner(&self) -> &ClientWithMiddleware {
        &self.client
    }
}

impl fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
