//! echo-telemetry: integer echo over TCP with a JSON telemetry side-channel
//!
//! One binary, three roles:
//! - `server`: echoes every newline-terminated integer back to its sender
//! - `client`: sends random integers in lockstep and checks the echoes
//! - `tester`: connects to a telemetry channel and prints each record
//!
//! Server and client can each publish metric records on a separate
//! telemetry port (`--metrics-port`), one JSON object per line.

mod client;
mod config;
mod protocols;
mod server;
mod telemetry;

use config::{ClientOptions, Config, Mode, ServerOptions, TesterOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    match config.mode {
        Mode::Server(options) => runtime.block_on(run_server(options)),
        Mode::Client(options) => runtime.block_on(run_client(options)),
        Mode::Tester(options) => runtime.block_on(run_tester(options)),
    }
}

async fn run_server(options: ServerOptions) -> Result<(), BoxError> {
    info!(
        listen = %options.listen,
        max_connections = options.max_connections,
        metrics = ?options.telemetry.as_ref().map(|t| &t.listen),
        "Starting echo server"
    );

    let telemetry = match &options.telemetry {
        Some(telemetry_options) => Some(telemetry::start(telemetry_options).await?),
        None => None,
    };

    let server = server::Server::bind(&options, telemetry).await?;
    server.run().await
}

async fn run_client(options: ClientOptions) -> Result<(), BoxError> {
    info!(
        server = %options.server,
        interval_ms = options.interval.as_millis() as u64,
        count = ?options.count,
        metrics = ?options.telemetry.as_ref().map(|t| &t.listen),
        "Starting echo client"
    );

    if let Some(telemetry_options) = &options.telemetry {
        telemetry::start(telemetry_options).await?;
    }

    let mut echo_client = client::EchoClient::connect(&options.server).await?;
    let mut rng = StdRng::from_entropy();

    let exchanged = client::run_client(&options, &mut echo_client, &mut rng).await?;
    info!(exchanged, "Client finished");
    Ok(())
}

async fn run_tester(options: TesterOptions) -> Result<(), BoxError> {
    let mut reader = telemetry::MetricReader::connect(&options.connect).await?;
    info!(source = %options.connect, "Connected to telemetry source");

    let count = telemetry::print_records(&mut reader, &mut std::io::stdout()).await?;
    info!(count, "Telemetry source closed");
    Ok(())
}
