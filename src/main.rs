//! Command-line access to the monitoring store

use clap::{Parser, Subcommand};
use monitoring_store::{Config, Monitor, Result, ServiceProbe, ServiceState, StatusReport};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "monitoring-store", version, about = "Inspect and feed the monitoring store")]
struct Cli {
    /// Directory holding the monitoring document
    #[arg(long, global = true, env = "MONITORING_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the status report: analytics, services and recent activity
    Status {
        /// Entries per log to include (defaults to RECENT_WINDOW)
        #[arg(long)]
        recent: Option<usize>,
    },
    /// Print the analytics summary
    Analytics {
        /// Also print the N most visited pages
        #[arg(long)]
        top: Option<usize>,
    },
    /// Print the full monitoring document
    Snapshot,
    /// Record a page visit
    RecordVisit {
        #[arg(long)]
        page: String,
        #[arg(long, default_value = "unknown")]
        user_agent: String,
        #[arg(long, default_value = "unknown")]
        ip: String,
    },
    /// Record a completed API request
    RecordRequest {
        #[arg(long)]
        endpoint: String,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        status_code: u16,
        /// Elapsed time in milliseconds
        #[arg(long)]
        duration: f64,
        #[arg(long, default_value = "unknown")]
        ip: String,
    },
    /// Set the status of a dependent service
    Service {
        #[arg(long)]
        name: String,
        #[arg(long)]
        status: ServiceState,
        /// Response time in milliseconds
        #[arg(long, default_value_t = 0.0)]
        response_time: f64,
    },
    /// Probe a service health URL and record the result
    Probe {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!("Using monitoring document at {}", config.document_path().display());
    let monitor = Monitor::from_config(&config)?;

    match cli.command {
        Command::Status { recent } => {
            let recent = recent.unwrap_or(config.recent_window);
            print_json(&StatusReport::collect(&monitor, recent).await)?;
        }
        Command::Analytics { top } => {
            let summary = monitor.compute_analytics().await;
            print_json(&summary)?;
            if let Some(limit) = top {
                print_json(&summary.top_pages(limit))?;
            }
        }
        Command::Snapshot => {
            print_json(&monitor.snapshot().await)?;
        }
        Command::RecordVisit { page, user_agent, ip } => {
            monitor.try_record_page_visit(&page, &user_agent, &ip).await?;
        }
        Command::RecordRequest {
            endpoint,
            method,
            status_code,
            duration,
            ip,
        } => {
            monitor
                .try_record_request(&endpoint, &method, status_code, duration, &ip)
                .await?;
        }
        Command::Service {
            name,
            status,
            response_time,
        } => {
            monitor
                .try_update_service_status(&name, status, response_time)
                .await?;
        }
        Command::Probe { name, url } => {
            let probe = ServiceProbe::new(config.probe_timeout)?;
            print_json(&probe.check_and_record(&monitor, &name, &url).await)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize structured logging on stderr, keeping stdout for command output
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
