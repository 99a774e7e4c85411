use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_pipeline::config::load_config;
use service_pipeline::lifecycle::{signals, Application, ExitStatus};
use service_pipeline::observability::logging;

#[derive(Parser)]
#[command(name = "service-pipeline")]
#[command(about = "Instrumented HTTP service", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; missing means defaults.
    #[arg(short, long, default_value = "service.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            return ExitStatus::StartupFailed.into();
        }
    };

    if let Err(err) = logging::init(&config.observability) {
        eprintln!("failed to initialise logging: {err}");
        return ExitStatus::StartupFailed.into();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.observability.environment,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.server.request_timeout_secs,
        "service-pipeline starting"
    );

    let app = match Application::build(config) {
        Ok(app) => app,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            return ExitStatus::StartupFailed.into();
        }
    };

    app.run_until(signals::termination()).await.into()
}
