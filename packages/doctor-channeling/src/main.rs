use clap::Parser;
use doctor_channeling::config::ChannelingConfig;
use doctor_channeling::identity::{IdentityProvider, LocalIdentityProvider};
use doctor_channeling::log::{self, SERVER};
use doctor_channeling::services::accounts;
use doctor_channeling::store::{DocumentStore, MemoryStore};
use doctor_channeling::{prometheus, AppState, Args, VERSION};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match ChannelingConfig::load(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration Error: {}", err);
            std::process::exit(exitcode::CONFIG);
        }
    };

    log::init(config.log.clone());

    if config.prometheus_enabled() {
        if let Err(err) = prometheus::start(&config.server.host, &config.prometheus) {
            error!(target: SERVER, msg = "Could not start Prometheus exporter", error = err.to_string());
            std::process::exit(exitcode::CONFIG);
        }
    }

    let state = init(&config).await;

    let address = match config.server.socket_address() {
        Ok(address) => address,
        Err(err) => {
            error!(target: SERVER, msg = "Could not start Doctor Channeling", error = err.to_string());
            std::process::exit(exitcode::CONFIG);
        }
    };

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(target: SERVER, msg = "Could not bind server address", %address, error = err.to_string());
            std::process::exit(exitcode::UNAVAILABLE);
        }
    };

    info!(target: SERVER, msg = "Doctor Channeling API is running", %address, version = VERSION);

    let app = doctor_channeling::router(state, &config.server);
    let shutdown_timeout = config.server.shutdown_timeout();

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    // Requests still in flight once the signal arrives get `shutdown_timeout` to finish
    let result = tokio::select! {
        result = server => result,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!(target: SERVER, msg = "Terminated in-flight requests");
            Ok(())
        }
    };

    if let Err(err) = result {
        error!(target: SERVER, msg = "Server error", error = err.to_string());
        std::process::exit(exitcode::SOFTWARE);
    }

    info!(target: SERVER, msg = "Shut down Doctor Channeling");
}

///
/// Opens the store, creates the identity provider
/// and makes sure the configured administrator exists
///
async fn init(config: &ChannelingConfig) -> AppState {
    if !config.store.is_persistent() {
        warn!(target: SERVER, msg = "Store is not persistent, data is lost on shutdown");
    }

    let store: Arc<dyn DocumentStore> = match MemoryStore::open(&config.store).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(target: SERVER, msg = "Could not open store", error = err.to_string());
            std::process::exit(exitcode::UNAVAILABLE);
        }
    };

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(LocalIdentityProvider::new(store.clone(), &config.identity));

    if let Some((email, password)) = config.identity.bootstrap_admin() {
        match accounts::bootstrap_admin(store.as_ref(), identity.as_ref(), email, password).await {
            Ok(account) => {
                info!(target: SERVER, msg = "Administrator account ready", uid = account.uid);
            }
            Err(err) => {
                error!(target: SERVER, msg = "Could not create administrator account", error = err.to_string());
                std::process::exit(exitcode::CONFIG);
            }
        }
    }

    AppState::new(store, identity)
}

async fn shutdown_signal() {
    tokio::select! {
        _ = sigint() => {
            info!(target: SERVER, msg = "Received SIGINT");
        },
        _ = sigterm() => {
            info!(target: SERVER, msg = "Received SIGTERM");
        },
    }
}

async fn sigint() -> std::io::Result<()> {
    signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}

async fn sigterm() -> std::io::Result<()> {
    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}
