use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use courier::cli::{Cli, Commands};
use courier::client::{ApiV1, CourierClient};
use courier::models::{StoreCertificateRequest, StorePasswordRequest};
use courier::secrets::auth::ServiceAccountTokens;
use courier::secrets::google::GoogleSecrets;
use courier::secrets::SecretManagerClient;
use courier::server::Server;
use courier::{config, version};

/// Deadline for every client command.
const CLIENT_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { addr }) => run_server(addr).await,
        Some(Commands::Status { url }) => {
            init_tracing(default_filter(), true);
            status(&url).await
        }
        Some(Commands::StorePassword {
            url,
            id,
            password,
            file,
        }) => {
            init_tracing(default_filter(), true);
            let password = match (password, file) {
                (Some(password), _) => password,
                (None, Some(path)) => read_password(&path)?,
                (None, None) => anyhow::bail!("specify either a password or a password file"),
            };
            store_password(&url, id, password).await
        }
        Some(Commands::StoreCertificate {
            url,
            id,
            file,
            no_decrypt,
        }) => {
            init_tracing(default_filter(), true);
            store_certificate(&url, id, &file, no_decrypt).await
        }
        Some(Commands::SecretsGet {
            project,
            name,
            credentials,
        }) => {
            init_tracing(default_filter(), true);
            get_secret(&project, &name, credentials.as_deref()).await
        }
        None => run_server(None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn default_filter() -> String {
    "courier=warn".to_string()
}

/// Install the global subscriber: env filter, JSON or console output and an
/// optional OTLP exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
fn init_tracing(filter: String, console: bool) {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "courier"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                eprintln!("could not install OpenTelemetry tracer: {}", e);
                None
            }
        }
    } else {
        None
    };

    let fmt_layer = if console {
        tracing_subscriber::fmt::layer().boxed()
    } else {
        tracing_subscriber::fmt::layer().json().boxed()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(filter),
        ))
        .with(fmt_layer)
        .with(telemetry_layer)
        .init();
}

async fn run_server(addr: Option<String>) -> anyhow::Result<()> {
    let mut cfg = config::load()?;
    if let Some(addr) = addr {
        cfg.bind_addr = addr;
    }

    init_tracing(cfg.log_filter(), cfg.console_log);
    tracing::info!(version = %version::version(), "starting courier");

    let server = Server::new(cfg).await?;
    server.serve().await
}

/// Cancels the returned token once the client deadline elapses.
fn deadline() -> CancellationToken {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(CLIENT_DEADLINE).await;
        guard.cancel();
    });
    cancel
}

async fn status(url: &str) -> anyhow::Result<()> {
    let client = ApiV1::new(url)?;
    let reply = client.status(&deadline()).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

fn read_password(path: &Path) -> anyhow::Result<String> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("could not read password file {}", path.display()))?;
    Ok(data.trim_end_matches(['\r', '\n']).to_string())
}

async fn store_password(url: &str, id: String, password: String) -> anyhow::Result<()> {
    let client = ApiV1::new(url)?;
    let req = StorePasswordRequest { id, password };
    client.store_certificate_password(&req, &deadline()).await?;
    println!("stored pkcs12 password for {}", req.id);
    Ok(())
}

async fn store_certificate(
    url: &str,
    id: String,
    file: &Path,
    no_decrypt: bool,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("could not read certificate {}", file.display()))?;

    let client = ApiV1::new(url)?;
    let req = StoreCertificateRequest {
        id,
        no_decrypt,
        base64_certificate: base64::engine::general_purpose::STANDARD.encode(data),
    };
    client.store_certificate(&req, &deadline()).await?;
    println!("stored certificate for {}", req.id);
    Ok(())
}

async fn get_secret(
    project: &str,
    name: &str,
    credentials: Option<&Path>,
) -> anyhow::Result<()> {
    let credentials = credentials.context("missing credentials for secret manager")?;
    let tokens = ServiceAccountTokens::from_file(credentials).await?;
    let client = GoogleSecrets::new(project, Arc::new(tokens), Duration::from_secs(30))?;
    let payload = client.get_latest_version(name).await?;
    println!("{}", String::from_utf8_lossy(&payload));
    Ok(())
}
