//! Service entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!   env + .env ──▶ ConfigLoader ──▶ ServiceConfig
//!                                        │
//!                                        ▼
//!   SIGINT/SIGTERM ──▶ Orchestrator ──┬──▶ observability (logs, spans, /metrics)
//!                                     ├──▶ health registry + Health RPC
//!                                     └──▶ RPC server on 0.0.0.0:PORT
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_bootstrap::config::{ConfigLoader, LogFormat, LogLevel, ServiceKind};
use service_bootstrap::lifecycle::{config_failure, exit_code, Orchestrator};
use service_bootstrap::observability::init_logging;

#[derive(Parser)]
#[command(name = "service-bootstrap")]
#[command(about = "Run a member of the service family", long_about = None)]
struct Cli {
    /// Which service to run; selects the default name and ports.
    #[arg(short, long, value_enum, default_value_t = ServiceKind::Auth)]
    service: ServiceKind,

    /// Override file read before the environment.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Ignore the override file.
    #[arg(long, conflicts_with = "env_file")]
    no_env_file: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loader = if cli.no_env_file {
        ConfigLoader::new(cli.service).without_env_file()
    } else {
        ConfigLoader::new(cli.service).with_env_file(&cli.env_file)
    };
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet; report through the defaults.
            let _guard = init_logging(LogLevel::Info, LogFormat::Json).ok();
            let err = config_failure(cli.service, e);
            eprintln!("{}: {err}", cli.service.default_name());
            return ExitCode::from(err.exit_code());
        }
    };

    let log_guard = match init_logging(config.observability.log_level, config.observability.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}: {e}", config.service_name);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        service = %config.service_name,
        kind = %cli.service,
        environment = %config.environment,
        port = config.port,
        metrics_port = config.observability.prometheus_port,
        tracing_endpoint = %config.observability.tracing_endpoint(),
        "Configuration loaded"
    );

    let result = Orchestrator::new(config).run().await;
    let code = exit_code(&result);

    drop(log_guard);
    ExitCode::from(code)
}
