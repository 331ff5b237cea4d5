use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use predicates::Predicate;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    StatusCode,
};
use reqwest_middleware::Middleware;
use serde::Deserialize;
use svcauth_tokens::oauth2::dto::ClientCredentials;

use crate::middleware::StatusPredicate;

/// Options for an [`ApiClient`][crate::ApiClient]
///
/// Everything except [`transport`][Self::transport] can be loaded from
/// configuration with `serde`:
///
/// ```
/// # fn main() -> Result<(), serde_json::Error> {
/// let options: svcauth_reqwest::ClientOptions = serde_json::from_str(r#"{
///     "auth": { "client_id": "my-client-id", "client_secret": "my-client-secret" },
///     "base_url": "https://api.example.com/",
///     "path_prefix": "my-service/v1",
///     "language": "de"
/// }"#)?;
///
/// assert_eq!(options.language.as_deref(), Some("de"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct ClientOptions {
    /// The credentials exchanged for an access token
    pub auth: ClientCredentials,

    /// The base URL shared by the authority and the services
    pub base_url: String,

    /// The path of the token endpoint, relative to the base URL
    ///
    /// Defaults to [`DEFAULT_OAUTH_PATH`][svcauth_tokens::DEFAULT_OAUTH_PATH].
    #[serde(default)]
    pub oauth_path: Option<String>,

    /// A path inserted between the base URL and the paths of service requests
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Additional headers sent with every service request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// The preferred language, like `de` or `en`, sent as `Accept-Language`
    #[serde(default)]
    pub language: Option<String>,

    /// Transport settings that take precedence over everything else
    #[serde(skip)]
    pub transport: TransportOverrides,
}

impl ClientOptions {
    /// Constructs options with only the required settings
    pub fn new(auth: ClientCredentials, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            base_url: base_url.into(),
            oauth_path: None,
            path_prefix: None,
            headers: BTreeMap::new(),
            language: None,
            transport: TransportOverrides::default(),
        }
    }

    /// Sets a custom path for the token endpoint
    pub fn with_oauth_path(mut self, oauth_path: impl Into<String>) -> Self {
        self.oauth_path = Some(oauth_path.into());
        self
    }

    /// Sets the path prefix for service requests
    pub fn with_path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(path_prefix.into());
        self
    }

    /// Adds a header sent with every service request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the preferred language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the transport overrides
    pub fn with_transport(mut self, transport: TransportOverrides) -> Self {
        self.transport = transport;
        self
    }
}

/// Settings applied last when building an authenticated transport
///
/// These win over every default and every setting in [`ClientOptions`].
#[derive(Clone, Default)]
pub struct TransportOverrides {
    /// Replaces the base URL derived from the base URL and path prefix
    pub base_url: Option<String>,

    /// Headers that replace any header of the same name
    pub headers: HeaderMap,

    /// Total timeout for each request
    pub timeout: Option<Duration>,

    /// Timeout for establishing connections
    pub connect_timeout: Option<Duration>,

    /// The `User-Agent` to send
    pub user_agent: Option<String>,

    /// Decides which response statuses are turned into errors
    ///
    /// Defaults to rejecting only `401 Unauthorized`. Only rejected `401`
    /// responses trigger re-authentication.
    pub reject_status: Option<StatusPredicate>,

    /// Additional middleware, run after the built-in middleware in the order given
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl TransportOverrides {
    /// Replaces the resolved base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets a header, replacing any other value for it
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the total timeout for each request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout for establishing connections
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Sets the `User-Agent`
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Replaces the predicate deciding which statuses are rejected
    pub fn with_reject_status<P>(mut self, predicate: P) -> Self
    where
        P: Predicate<StatusCode> + Send + Sync + 'static,
    {
        self.reject_status = Some(Arc::new(predicate));
        self
    }

    /// Appends a middleware to the request pipeline
    pub fn with_middleware<M: Middleware>(self, middleware: M) -> Self {
        self.with_arc_middleware(Arc::new(middleware))
    }

    /// Appends a shared middleware to the request pipeline
    pub fn with_arc_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

impl fmt::Debug for TransportOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOverrides")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .field(
                "reject_status",
                &self
                    .reject_status
                    .as_ref()
                    .map(|p| format!("{}", p)),
            )
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
