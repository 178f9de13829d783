mod config;
mod logging;
mod lsp;
mod server;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use config::ServerConfig;
use logging::{LogConfig, init_logging};
use server::LspServer;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{BufReader, stderr, stdin, stdout};
use tracing::{info, warn};

/// CLI arguments for the LSP pipeline server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides LSP_PIPELINE_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Give up when no complete frame arrives within this many milliseconds
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Largest accepted message body in bytes
    #[arg(long, value_name = "BYTES")]
    max_message_size: Option<usize>,

    /// Largest accepted header line in bytes, line ending included
    #[arg(long, value_name = "BYTES")]
    max_header_line: Option<usize>,
}

fn build_config(args: &Args) -> Result<ServerConfig, config::ConfigError> {
    let mut builder = ServerConfig::builder();
    if let Some(ms) = args.read_timeout_ms {
        builder = builder.read_timeout(Duration::from_millis(ms));
    }
    if let Some(size) = args.max_message_size {
        builder = builder.max_message_size(size);
    }
    if let Some(limit) = args.max_header_line {
        builder = builder.max_header_line(limit);
    }
    builder.build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Starting LSP pipeline server with {:?}", config);

    let mut server = LspServer::new(config, BufReader::new(stdin()), stdout(), stderr());
    let outcome = server.run().await;

    let session = server.session();
    info!(
        root_uri = ?session.root_uri(),
        process_id = ?session.process_id(),
        initialized = session.is_initialized_acknowledged(),
        open_documents = session.documents().open_count(),
        "Server shutdown: {:?}",
        outcome
    );
    if let Some(err) = session.last_error() {
        warn!("Last protocol error: {}", err);
    }
    ExitCode::from(outcome.exit_code())
}
