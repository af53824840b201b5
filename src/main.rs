//! Hostel dashboard server.
//!
//! Usage:
//!   cargo run --bin load_data           # seed a sample portfolio
//!   cargo run --bin hostel_dashboard    # start the REST API
//!   # Then use hostel-cli or curl (see README)

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hostel_dashboard::auth::AuthKeys;
use hostel_dashboard::config::Config;
use hostel_dashboard::mutations::Mutations;
use hostel_dashboard::report;
use hostel_dashboard::rest::{create_router, AppState};
use hostel_dashboard::storage::Storage;

/// JSON logs to stdout, plus a daily rolling file when a log directory is set.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().json();

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hostel_dashboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(fmt::layer().json().with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for ctrl-c");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let _log_guard = init_tracing(&config);

    info!(
        data_path = %config.data_path.display(),
        bind = %config.bind_addr,
        "hostel dashboard starting"
    );
    if config.uses_dev_secret() {
        warn!("HOSTEL_JWT_SECRET not set, using the development secret");
    }

    let storage = Storage::open(&config.data_path)?;
    if Mutations::new(storage.clone()).initialize("system")? {
        info!("created empty state document");
    }

    let state = AppState::new(
        storage.clone(),
        AuthKeys::new(&config.jwt_secret, config.token_ttl_secs),
        report::from_config(&config.gemini),
    );
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "REST API listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush()?;
    Ok(())
}
