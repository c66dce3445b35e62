#![forbid(unsafe_code)]

mod catalogue;
mod config;
mod options;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use graphweave_executor::{CancellationToken, Request, Variables};
use structopt::StructOpt;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use options::Options;

// Use Jemalloc only for musl-64 bits platforms
#[cfg(all(target_env = "musl", target_pointer_width = "64"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("info"))
                .unwrap(),
        )
        .init();
}

fn load_config(path: &str) -> Result<Config> {
    if !std::path::Path::new(path).exists() {
        tracing::info!(path = %path, "Config file not found, using defaults.");
        return Ok(Config::default());
    }
    toml::from_str::<Config>(
        &std::fs::read_to_string(path)
            .with_context(|| format!("Failed to load config file '{}'.", path))?,
    )
    .with_context(|| format!("Failed to parse config file '{}'.", path))
}

fn create_request(options: &Options) -> Result<Request> {
    let query = std::fs::read_to_string(&options.query)
        .with_context(|| format!("Failed to load query file '{}'.", options.query))?;
    let mut request = Request::new(query);
    if let Some(operation) = &options.operation {
        request = request.operation(operation.clone());
    }
    if let Some(variables) = &options.variables {
        let variables: serde_json::Value =
            serde_json::from_str(variables).context("Failed to parse variables.")?;
        request = request.variables(Variables::from_json(variables));
    }
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let options: Options = Options::from_args();
    init_tracing();

    let config = load_config(&options.config)?;
    let request = create_request(&options)?;
    let executor = catalogue::executor(&config)?;
    tracing::info!(
        worker_limit = ?config.worker_limit,
        catalogue_size = config.catalogue_size,
        "Executor ready"
    );

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("Cancelling operation");
                token.cancel();
            }
        }
    });

    let mut responses = executor.execute_stream(request, token);
    while let Some(response) = responses.next().await {
        println!(
            "{}",
            serde_json::to_string(&response).context("Failed to serialize response.")?
        );
    }
    Ok(())
}
