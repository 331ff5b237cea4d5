use clap::Parser;
use svcauth_reqwest::{create_service_client, ClientOptions, ServiceClientOptions, TransportError};
use svcauth_tokens::{oauth2::dto::ClientCredentials, ClientId, ClientSecret};

#[derive(Debug, Parser)]
struct Opts {
    /// The base URL shared by the authority and the services
    #[arg(short, long, env)]
    base_url: String,

    /// The client ID of the client
    #[arg(short, long, env)]
    client_id: ClientId,

    /// The client secret used to identify the client to the authority
    #[arg(short = 's', long, env, hide_env_values = true)]
    client_secret: ClientSecret,

    /// The service to call
    #[arg(long, env)]
    service: String,

    /// The API version of the service
    #[arg(long, env)]
    version: Option<String>,

    /// The preferred language of responses
    #[arg(short, long, env)]
    language: Option<String>,

    /// The path to request, relative to the service
    #[arg(default_value = "/")]
    path: String,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let mut client_options = ClientOptions::new(
        ClientCredentials::new(opts.client_id, opts.client_secret),
        opts.base_url,
    );
    if let Some(language) = opts.language {
        client_options = client_options.with_language(language);
    }

    let mut service_options = ServiceClientOptions::new(opts.service, client_options);
    if let Some(version) = opts.version {
        service_options = service_options.with_version(version);
    }

    let api = create_service_client(service_options)?;

    // The second call reuses the transport cached by the first, without a new token
    for call in ["first", "cached"] {
        let path = opts.path.as_str();
        let (status, body) = api
            .with_client(|client| async move {
                let resp = client.get(path).send().await?;
                let status = resp.status();
                let body = resp.text().await.map_err(TransportError::from)?;
                Ok::<_, TransportError>((status, body))
            })
            .await?;

        tracing::info!(call, %status, "received response");
        println!("{body}");
    }

    Ok(())
}
