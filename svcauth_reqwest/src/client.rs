use std::{convert::Infallible, fmt, future::Future, sync::Arc};

use arc_swap::ArcSwapOption;
use svcauth_tokens::ClientCredentialsTokenSource;

use crate::{
    merge, AuthenticatedTransport, AuthenticationError, ClientOptions, Error, ResponseStatus,
};

/// A client for services protected by the OAuth2 client credentials flow
///
/// No token is requested until the client is first used. The transport built
/// around that token is kept and reused by later calls. When a service rejects
/// the token with `401 Unauthorized`, [`with_client()`][Self::with_client()]
/// obtains a new token and runs the action once more.
///
/// The client is meant to be shared: all methods take `&self`, and the cached
/// transport is swapped atomically. Calls that race to authenticate each
/// obtain their own token; the one stored last is kept for later calls.
pub struct ApiClient {
    options: Arc<ClientOptions>,
    token_source: ClientCredentialsTokenSource,
    transport: ArcSwapOption<AuthenticatedTransport>,
}

impl ApiClient {
    /// Constructs a new client
    ///
    /// Nothing is validated or requested until the client is used.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_token_client(options, reqwest::Client::new())
    }

    /// Constructs a new client that uses `client` to talk to the authority
    pub fn with_token_client(options: ClientOptions, client: reqwest::Client) -> Self {
        let token_source = ClientCredentialsTokenSource::for_base_url(
            client,
            &options.base_url,
            options.oauth_path.as_deref(),
            options.auth.clone(),
        );

        Self {
            options: Arc::new(options),
            token_source,
            transport: ArcSwapOption::empty(),
        }
    }

    /// The options this client was constructed with
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether an authenticated transport is currently held
    pub fn is_authenticated(&self) -> bool {
        self.transport.load().is_some()
    }

    /// Drops the current transport, so that the next call authenticates again
    pub fn invalidate(&self) {
        self.transport.store(None);
    }

    /// Gets an authenticated transport
    ///
    /// Requests sent through the returned transport are not retried when the
    /// token is rejected. Use [`with_client()`][Self::with_client()] for that.
    ///
    /// ```no_run
    /// # use svcauth_reqwest::{ApiClient, ClientOptions};
    /// # use svcauth_tokens::oauth2::dto::ClientCredentials;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let api = ApiClient::new(
    ///     ClientOptions::new(
    ///         ClientCredentials::new("my-client-id", "my-client-secret"),
    ///         "https://api.example.com/",
    ///     )
    ///     .with_path_prefix("my-service/v1"),
    /// );
    ///
    /// let client = api.client().await?;
    ///
    /// // GET https://api.example.com/my-service/v1/foo
    /// let foo = client.get("/foo").send().await?;
    ///
    /// // POST https://api.example.com/my-service/v1/bar
    /// let bar = client.post("/bar").body(r#"{"baz":42}"#).send().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn client(&self) -> Result<AuthenticatedTransport, AuthenticationError> {
        self.with_client(|transport| async move { Ok::<_, Infallible>(transport) })
            .await
            .map_err(|err| match err {
                Error::Authentication(err) => err,
                Error::Upstream(never) => match never {},
            })
    }

    /// Runs an action against an authenticated transport
    ///
    /// If no transport is held yet, one is built first. If the action then
    /// fails because a service answered `401 Unauthorized`, and the transport
    /// was not built by this same call, a new token is obtained and the action
    /// runs a second time with the new transport. The outcome of that second
    /// run is returned as is.
    ///
    /// Any other failure of the action is returned as [`Error::Upstream`].
    ///
    /// ```no_run
    /// # use svcauth_reqwest::{ApiClient, ClientOptions, TransportError};
    /// # use svcauth_tokens::oauth2::dto::ClientCredentials;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let api = ApiClient::new(ClientOptions::new(
    /// #     ClientCredentials::new("my-client-id", "my-client-secret"),
    /// #     "https://api.example.com/my-service/v1",
    /// # ));
    /// // DELETE https://api.example.com/my-service/v1/baz-resource/42
    /// let status = api
    ///     .with_client(|client| async move {
    ///         let resp = client.delete("/baz-resource/42").send().await?;
    ///         Ok::<_, TransportError>(resp.status())
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_client<F, Fut, T, E>(&self, mut action: F) -> Result<T, Error<E>>
    where
        F: FnMut(AuthenticatedTransport) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ResponseStatus,
    {
        let (transport, fresh) = match self.transport.load_full() {
            Some(transport) => {
                tracing::trace!("using cached authenticated transport");
                ((*transport).clone(), false)
            }
            None => {
                tracing::debug!("no authenticated transport available, authenticating");
                (self.authenticate().await?, true)
            }
        };

        match action(transport).await {
            Ok(result) => Ok(result),
            Err(err) if !fresh && err.is_unauthorized() => {
                tracing::info!("access token was rejected, authenticating again");

                let transport = self.authenticate().await?;
                action(transport).await.map_err(Error::Upstream)
            }
            Err(err) => Err(Error::Upstream(err)),
        }
    }

    async fn authenticate(&self) -> Result<AuthenticatedTransport, AuthenticationError> {
        let access_token = self.token_source.request_token().await?;
        let transport = merge::build_transport(&self.options, &access_token)?;

        self.transport.store(Some(Arc::new(transport.clone())));

        Ok(transport)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("options", &self.options)
            .field("token_url", &self.token_source.token_url())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use httpmock::prelude::*;
    use reqwest::StatusCode;
    use svcauth_tokens::{oauth2::dto::ClientCredentials, TokenRequestError, DEFAULT_OAUTH_PATH};

    use super::*;
    use crate::{TransportError, TransportOverrides};

    fn options_for(server: &MockServer) -> ClientOptions {
        ClientOptions::new(
            ClientCredentials::new("my-client-id", "my-client-secret"),
            server.base_url(),
        )
        .with_path_prefix("/orders/v1/")
    }

    fn token_mock<'a>(server: &'a MockServer, token: &str) -> httpmock::Mock<'a> {
        let body = format!(r#"{{"access_token":"{}"}}"#, token);
        server.mock(|when, then| {
            when.method(POST)
                .path(DEFAULT_OAUTH_PATH)
                .body_includes("grant_type=client_credentials");
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        })
    }

    fn orders_mock<'a>(server: &'a MockServer, token: &str, status: u16) -> httpmock::Mock<'a> {
        let authorization = format!("Bearer {}", token);
        server.mock(|when, then| {
            when.method(GET)
                .path("/orders/v1/orders")
                .header("authorization", authorization);
            then.status(status).body("[]");
        })
    }

    async fn list_orders(client: AuthenticatedTransport) -> Result<StatusCode, TransportError> {
        let resp = client.get("/orders").send().await?;
        Ok(resp.status())
    }

    mod lazy_authentication {
        use super::*;

        #[tokio::test]
        async fn constructing_the_client_requests_nothing() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");

            let client = ApiClient::new(options_for(&server));

            assert!(!client.is_authenticated());
            token.assert_calls(0);
        }

        #[tokio::test]
        async fn first_call_authenticates_and_later_calls_reuse_the_transport() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");
            let orders = orders_mock(&server, "tok-1", 200);

            let client = ApiClient::new(options_for(&server));

            let first = client.with_client(list_orders).await.unwrap();
            let second = client.with_client(list_orders).await.unwrap();

            assert_eq!(first, StatusCode::OK);
            assert_eq!(second, StatusCode::OK);
            assert!(client.is_authenticated());
            token.assert_calls(1);
            orders.assert_calls(2);
        }

        #[tokio::test]
        async fn client_returns_a_transport_with_the_resolved_base_url() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");

            let client = ApiClient::new(options_for(&server));
            let transport = client.client().await.unwrap();

            assert_eq!(
                transport.base_url(),
                format!("{}/orders/v1", server.base_url())
            );
            token.assert_calls(1);
        }
    }

    mod when_the_token_is_rejected {
        use super::*;

        #[tokio::test]
        async fn action_is_retried_once_with_a_new_token() {
            let server = MockServer::start();
            let mut old_token = token_mock(&server, "tok-1");
            let rejected = orders_mock(&server, "tok-1", 401);
            let accepted = orders_mock(&server, "tok-2", 200);

            let client = ApiClient::new(options_for(&server));
            client.client().await.unwrap();

            old_token.delete();
            let new_token = token_mock(&server, "tok-2");

            let status = client.with_client(list_orders).await.unwrap();

            assert_eq!(status, StatusCode::OK);
            rejected.assert_calls(1);
            accepted.assert_calls(1);
            new_token.assert_calls(1);

            let status = client.with_client(list_orders).await.unwrap();
            assert_eq!(status, StatusCode::OK);
            accepted.assert_calls(2);
            new_token.assert_calls(1);
        }

        #[tokio::test]
        async fn retry_happens_at_most_once() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");
            let orders = orders_mock(&server, "tok-1", 401);

            let client = ApiClient::new(options_for(&server));
            client.client().await.unwrap();

            let invocations = AtomicUsize::new(0);
            let err = client
                .with_client(|transport| {
                    invocations.fetch_add(1, Ordering::Relaxed);
                    list_orders(transport)
                })
                .await
                .unwrap_err();

            let err = err.into_upstream().unwrap();
            assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
            assert_eq!(invocations.load(Ordering::Relaxed), 2);
            token.assert_calls(2);
            orders.assert_calls(2);
        }

        #[tokio::test]
        async fn fresh_transport_is_not_retried() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");
            let orders = orders_mock(&server, "tok-1", 401);

            let client = ApiClient::new(options_for(&server));

            let invocations = AtomicUsize::new(0);
            let err = client
                .with_client(|transport| {
                    invocations.fetch_add(1, Ordering::Relaxed);
                    list_orders(transport)
                })
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Upstream(TransportError::Rejected(_))));
            assert_eq!(invocations.load(Ordering::Relaxed), 1);
            token.assert_calls(1);
            orders.assert_calls(1);
        }

        #[tokio::test]
        async fn failed_reauthentication_is_returned_and_keeps_the_old_transport() {
            let server = MockServer::start();
            let mut token = token_mock(&server, "tok-1");
            let mut rejected = orders_mock(&server, "tok-1", 401);

            let client = ApiClient::new(options_for(&server));
            client.client().await.unwrap();

            token.delete();
            let failing = server.mock(|when, then| {
                when.method(POST).path(DEFAULT_OAUTH_PATH);
                then.status(503);
            });

            let err = client.with_client(list_orders).await.unwrap_err();

            assert!(matches!(
                err.authentication().and_then(AuthenticationError::token_error),
                Some(TokenRequestError::UnexpectedStatus { status }) if *status == StatusCode::SERVICE_UNAVAILABLE
            ));
            failing.assert_calls(1);
            assert!(client.is_authenticated());

            rejected.delete();
            let accepted = orders_mock(&server, "tok-1", 200);

            let status = client.with_client(list_orders).await.unwrap();

            assert_eq!(status, StatusCode::OK);
            accepted.assert_calls(1);
            failing.assert_calls(1);
        }
    }

    mod when_the_action_fails_otherwise {
        use super::*;

        #[tokio::test]
        async fn server_errors_are_returned_as_responses() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");
            let orders = orders_mock(&server, "tok-1", 500);

            let client = ApiClient::new(options_for(&server));
            client.client().await.unwrap();

            let status = client.with_client(list_orders).await.unwrap();

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            token.assert_calls(1);
            orders.assert_calls(1);
        }

        #[tokio::test]
        async fn non_transport_errors_are_not_retried() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");

            let client = ApiClient::new(options_for(&server));
            client.client().await.unwrap();

            let invocations = AtomicUsize::new(0);
            let err = client
                .with_client(|_| {
                    invocations.fetch_add(1, Ordering::Relaxed);
                    async { Err::<(), _>(anyhow::anyhow!("order book is closed")) }
                })
                .await
                .unwrap_err();

            assert_eq!(err.to_string(), "order book is closed");
            assert_eq!(invocations.load(Ordering::Relaxed), 1);
            token.assert_calls(1);
        }

        #[tokio::test]
        async fn errors_reported_as_other_statuses_are_not_retried() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");
            let orders = orders_mock(&server, "tok-1", 500);

            let client = ApiClient::new(options_for(&server));
            client.client().await.unwrap();

            let invocations = AtomicUsize::new(0);
            let err = client
                .with_client(|transport| {
                    invocations.fetch_add(1, Ordering::Relaxed);
                    async move {
                        transport
                            .get("/orders")
                            .send()
                            .await?
                            .error_for_status()
                            .map_err(TransportError::from)
                    }
                })
                .await
                .unwrap_err();

            assert_eq!(
                err.upstream().and_then(TransportError::status),
                Some(StatusCode::INTERNAL_SERVER_ERROR)
            );
            assert_eq!(invocations.load(Ordering::Relaxed), 1);
            token.assert_calls(1);
            orders.assert_calls(1);
        }
    }

    mod when_authentication_fails {
        use super::*;

        #[tokio::test]
        async fn token_errors_are_returned_and_nothing_is_cached() {
            let server = MockServer::start();
            let token = server.mock(|when, then| {
                when.method(POST).path(DEFAULT_OAUTH_PATH);
                then.status(400)
                    .header("content-type", "application/json")
                    .body(r#"{"error":"invalid_client"}"#);
            });

            let client = ApiClient::new(options_for(&server));

            let err = client.client().await.unwrap_err();

            assert!(matches!(
                err,
                AuthenticationError::Token(TokenRequestError::InvalidRequest { ref body })
                    if body == r#"{"error":"invalid_client"}"#
            ));
            assert!(!client.is_authenticated());
            token.assert_calls(1);
        }

        #[tokio::test]
        async fn the_action_is_not_invoked() {
            let server = MockServer::start();
            let _token = server.mock(|when, then| {
                when.method(POST).path(DEFAULT_OAUTH_PATH);
                then.status(200).body(r#"{"foo":"bar"}"#);
            });

            let client = ApiClient::new(options_for(&server));

            let invocations = AtomicUsize::new(0);
            let err = client
                .with_client(|transport| {
                    invocations.fetch_add(1, Ordering::Relaxed);
                    list_orders(transport)
                })
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                Error::Authentication(AuthenticationError::Token(
                    TokenRequestError::MalformedBody(_)
                ))
            ));
            assert_eq!(invocations.load(Ordering::Relaxed), 0);
        }
    }

    mod headers {
        use super::*;

        #[tokio::test]
        async fn language_and_caller_headers_are_sent() {
            let server = MockServer::start();
            let _token = token_mock(&server, "tok-1");
            let orders = server.mock(|when, then| {
                when.method(GET)
                    .path("/orders/v1/orders")
                    .header("authorization", "Bearer tok-1")
                    .header("accept-language", "de")
                    .header("x-tenant", "acme");
                then.status(200);
            });

            let client = ApiClient::new(
                options_for(&server)
                    .with_language("de")
                    .with_header("x-tenant", "acme"),
            );

            let status = client.with_client(list_orders).await.unwrap();

            assert_eq!(status, StatusCode::OK);
            orders.assert_calls(1);
        }

        #[tokio::test]
        async fn override_user_agent_wins_over_caller_header() {
            let server = MockServer::start();
            let _token = token_mock(&server, "tok-1");
            let orders = server.mock(|when, then| {
                when.method(GET)
                    .path("/orders/v1/orders")
                    .header("user-agent", "override");
                then.status(200);
            });

            let client = ApiClient::new(
                options_for(&server)
                    .with_header("user-agent", "caller")
                    .with_transport(TransportOverrides::default().with_user_agent("override")),
            );

            let status = client.with_client(list_orders).await.unwrap();

            assert_eq!(status, StatusCode::OK);
            orders.assert_calls(1);
        }

        #[tokio::test]
        async fn custom_oauth_path_is_used_for_tokens() {
            let server = MockServer::start();
            let token = server.mock(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).body(r#"{"access_token":"tok-1"}"#);
            });

            let client = ApiClient::new(options_for(&server).with_oauth_path("/oauth/token"));
            client.client().await.unwrap();

            token.assert_calls(1);
        }
    }

    mod concurrency {
        use super::*;

        #[tokio::test]
        async fn racing_first_calls_each_authenticate() {
            let server = MockServer::start();
            let token = token_mock(&server, "tok-1");
            let orders = orders_mock(&server, "tok-1", 200);

            let client = ApiClient::new(options_for(&server));

            let (a, b) = tokio::join!(
                client.with_client(list_orders),
                client.with_client(list_orders)
            );

            assert_eq!(a.unwrap(), StatusCode::OK);
            assert_eq!(b.unwrap(), StatusCode::OK);
            token.assert_calls(2);
            orders.assert_calls(2);
        }

        #[test]
        fn client_can_be_shared_between_tasks() {
            fn assert_send_sync<T: Send + Sync>() {}
            assert_send_sync::<ApiClient>();
            assert_send_sync::<AuthenticatedTransport>();
        }
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_token() {
        let server = MockServer::start();
        let token = token_mock(&server, "tok-1");

        let client = ApiClient::new(options_for(&server));
        client.client().await.unwrap();
        client.invalidate();
        assert!(!client.is_authenticated());
        client.client().await.unwrap();

        token.assert_calls(2);
    }
}
