//! Health probe: asks a running service for its serving status.
//!
//! Exit status: 0 when `SERVING`, 1 for any other status, 2 when the call
//! itself fails.

use std::process::ExitCode;

use clap::Parser;
use service_bootstrap::health::{HealthCheckRequest, HealthCheckResponse, ServingStatus};
use service_bootstrap::rpc::method_path;

#[derive(Parser)]
#[command(name = "health-probe")]
#[command(about = "Check the serving status of a running service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:50051")]
    addr: String,

    /// Service to query; empty checks the whole server.
    #[arg(short, long, default_value = "")]
    service: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match check(&cli).await {
        Ok(ServingStatus::Serving) => {
            println!("SERVING");
            ExitCode::SUCCESS
        }
        Ok(status) => {
            println!("{status}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn check(cli: &Cli) -> Result<ServingStatus, Box<dyn std::error::Error>> {
    let url = format!(
        "{}{}",
        cli.addr.trim_end_matches('/'),
        method_path("grpc.health.v1.Health", "Check")
    );
    let res = reqwest::Client::new()
        .post(url)
        .json(&HealthCheckRequest {
            service: cli.service.clone(),
        })
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(format!("health check returned {status}: {body}").into());
    }

    let response: HealthCheckResponse = res.json().await?;
    Ok(response.status)
}
