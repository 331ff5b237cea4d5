use serde::Deserialize;

use crate::{ApiClient, ClientOptions, ConfigError};

/// The API version used when none is given
pub const DEFAULT_SERVICE_VERSION: &str = "v1";

/// Options for a client addressing a single versioned service
///
/// Requests are sent below `{base_url}/{service}/{version}`.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceClientOptions {
    /// The name of the service, used as the first path segment
    pub service: String,

    /// The API version of the service
    ///
    /// Defaults to [`DEFAULT_SERVICE_VERSION`] when missing or empty.
    #[serde(default)]
    pub version: Option<String>,

    /// Options for the underlying client
    ///
    /// Any path prefix set here is replaced.
    pub client_options: ClientOptions,
}

impl ServiceClientOptions {
    /// Constructs options for the default version of `service`
    pub fn new(service: impl Into<String>, client_options: ClientOptions) -> Self {
        Self {
            service: service.into(),
            version: None,
            client_options,
        }
    }

    /// Sets the API version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Reads options from untyped configuration
    ///
    /// ```
    /// use svcauth_reqwest::ServiceClientOptions;
    ///
    /// let options = ServiceClientOptions::from_value(serde_json::json!({
    ///     "service": "orders",
    ///     "client_options": {
    ///         "auth": { "client_id": "my-client-id", "client_secret": "my-client-secret" },
    ///         "base_url": "https://api.example.com/"
    ///     }
    /// }))?;
    ///
    /// assert_eq!(options.path_prefix(), "orders/v1");
    /// # Ok::<_, svcauth_reqwest::ConfigError>(())
    /// ```
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// The API version, falling back to the default
    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SERVICE_VERSION)
    }

    /// The path prefix for requests to this service
    pub fn path_prefix(&self) -> String {
        format!("{}/{}", self.service, self.version())
    }
}

/// Constructs a client for a single versioned service
///
/// Nothing is sent until the client is used. Beyond the shape checks done
/// when reading untyped configuration with
/// [`ServiceClientOptions::from_value()`], two stricter checks apply here:
///
/// * an empty service name fails with [`ConfigError::EmptyService`], since it
///   would produce a path prefix of `/{version}`
/// * a base URL that does not parse as an absolute URL fails with
///   [`ConfigError::InvalidBaseUrl`], instead of failing on the first request
///
/// [`ApiClient::new()`] performs neither check.
///
/// ```
/// use svcauth_reqwest::{create_service_client, ClientOptions, ServiceClientOptions};
/// use svcauth_tokens::oauth2::dto::ClientCredentials;
///
/// let client = create_service_client(
///     ServiceClientOptions::new(
///         "orders",
///         ClientOptions::new(
///             ClientCredentials::new("my-client-id", "my-client-secret"),
///             "https://api.example.com/",
///         ),
///     )
///     .with_version("v2"),
/// )?;
///
/// assert_eq!(client.options().path_prefix.as_deref(), Some("orders/v2"));
/// # Ok::<_, svcauth_reqwest::ConfigError>(())
/// ```
pub fn create_service_client(options: ServiceClientOptions) -> Result<ApiClient, ConfigError> {
    if options.service.is_empty() {
        return Err(ConfigError::EmptyService);
    }

    let base_url = &options.client_options.base_url;
    if let Err(source) = url::Url::parse(base_url) {
        return Err(ConfigError::InvalidBaseUrl {
            base_url: base_url.clone(),
            source,
        });
    }

    let path_prefix = options.path_prefix();
    tracing::debug!(
        service = %options.service,
        path_prefix = %path_prefix,
        "creating service client"
    );

    Ok(ApiClient::new(
        options.client_options.with_path_prefix(path_prefix),
    ))
}
