use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uptime_monitor::server::config::ServerConfig;
use uptime_monitor::server::core_services::CoreServices;
use uptime_monitor::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "uptime-monitor.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(version = VERSION, inventory = %config.inventory_path, "Starting uptime monitor.");

    let services = match CoreServices::from_config(&config) {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "Failed to initialize monitoring services.");
            return Err(e.into());
        }
    };

    let scheduled = services.scheduler.start_all().await;
    for status in services.scheduler.get_status() {
        info!(
            endpoint_id = status.endpoint_id,
            interval_seconds = status.interval_seconds,
            next_execution = ?status.next_execution_time,
            "Endpoint active."
        );
    }
    info!(scheduled, "Monitoring running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    services.scheduler.stop_all();
    Ok(())
}
