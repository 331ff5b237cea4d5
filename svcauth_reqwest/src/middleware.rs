use std::{fmt, sync::Arc};

use bytes::Bytes;
use predicates::{prelude::*, reflection};
use reqwest::{header::HeaderMap, Request, Response, StatusCode, Url};
use reqwest_middleware::{Middleware, Next, Result};
use thiserror::Error;

/// A predicate over response statuses, shared between transports
pub type StatusPredicate = Arc<dyn Predicate<StatusCode> + Send + Sync>;

/// A middleware that turns selected response statuses into request errors
///
/// Responses whose status satisfies the predicate are consumed and returned as
/// a [`RejectedResponse`] carried in [`reqwest_middleware::Error::Middleware`].
/// All other responses pass through untouched, whatever their status.
///
/// By default only `401 Unauthorized` is rejected, which lets
/// [`ApiClient`][crate::ApiClient] notice an access token that is no longer
/// accepted while leaving every other status for the caller to handle.
#[derive(Clone)]
pub struct RejectStatus {
    predicate: StatusPredicate,
}

impl RejectStatus {
    /// Constructs a middleware that rejects `401 Unauthorized` responses
    pub fn new() -> Self {
        Self {
            predicate: Arc::new(Unauthorized),
        }
    }

    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<P>(self, predicate: P) -> Self
    where
        P: Predicate<StatusCode> + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(predicate))
    }

    /// Constructs a middleware from an already shared predicate
    pub fn from_shared(predicate: StatusPredicate) -> Self {
        Self { predicate }
    }
}

impl Default for RejectStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RejectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectStatus")
            .field("predicate", &format_args!("{}", self.predicate))
            .finish()
    }
}

#[async_trait::async_trait]
impl Middleware for RejectStatus {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let resp = next.run(req, extensions).await?;

        if !self.predicate.eval(&resp.status()) {
            return Ok(resp);
        }

        tracing::debug!(
            response.status = resp.status().as_u16(),
            url = %resp.url(),
            "rejecting response"
        );

        let rejected = RejectedResponse::read(resp).await;
        Err(reqwest_middleware::Error::middleware(rejected))
    }
}

/// A middleware that attaches a fixed set of headers to outgoing requests
///
/// A header that a request already carries by the time the middleware runs is
/// left in place, so individual requests can still override any of them.
#[derive(Clone, Debug)]
pub struct InjectHeaders {
    headers: HeaderMap,
}

impl InjectHeaders {
    /// Constructs a middleware attaching `headers` to every request
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// The headers attached by this middleware
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait::async_trait]
impl Middleware for InjectHeaders {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let target = req.headers_mut();
        for name in self.headers.keys() {
            if target.contains_key(name) {
                continue;
            }
            for value in self.headers.get_all(name) {
                target.append(name.clone(), value.clone());
            }
        }

        next.run(req, extensions).await
    }
}

/// A response that was turned into an error by [`RejectStatus`]
///
/// The body has already been read and is kept alongside the status and headers.
/// It is empty when reading it failed.
#[derive(Clone, Debug, Error)]
#[error("request to {url} was rejected with status {status}")]
pub struct RejectedResponse {
    status: StatusCode,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl RejectedResponse {
    /// Constructs a rejection with no headers and an empty body
    pub fn for_status(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Consumes a response, keeping an empty body if it cannot be read
    async fn read(resp: Response) -> Self {
        let status = resp.status();
        let url = resp.url().clone();
        let headers = resp.headers().clone();

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(error = %err, "unable to read body of rejected response");
                Bytes::new()
            }
        };

        Self {
            status,
            url,
            headers,
            body,
        }
    }

    /// The status of the rejected response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The final URL of the rejected response
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The headers of the rejected response
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body of the rejected response
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body of the rejected response, decoded lossily as UTF-8
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Matches only `401 Unauthorized`
#[derive(Clone, Copy, Debug)]
pub struct Unauthorized;

impl Predicate<StatusCode> for Unauthorized {
    #[inline]
    fn eval(&self, status: &StatusCode) -> bool {
        *status == StatusCode::UNAUTHORIZED
    }

    fn find_case(&self, expected: bool, status: &StatusCode) -> Option<reflection::Case> {
        let result = self.eval(status);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result)
                    .add_product(reflection::Product::new("status", status.to_string())),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for Unauthorized {}
impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("status == 401 Unauthorized")
    }
}
