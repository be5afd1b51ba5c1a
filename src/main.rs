mod config_cli;
mod model;
mod sync;

use config_cli::Config;
use sync::{HttpRuntimeClient, ModelState, Registry};

use anyhow::{Context, Result};
use clap::Parser;
use std::{future::Future, io, time::Duration};
use tokio::{signal, sync::watch};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    let client = HttpRuntimeClient::new(
        &config.runtime_endpoint,
        config.api_version.as_deref(),
        Duration::from_secs(config.connect_timeout),
    )?;

    let (state_tx, state_rx) = watch::channel(ModelState::default());
    tokio::spawn(run_http_server(config.health_port, state_rx.clone()));
    tokio::spawn(sync::run_publisher(state_rx, config.model_output.clone()));

    let mut registry = Registry::new(state_tx, config.wildcard_domains, config.debug);
    info!("Monitoring containers via {}", config.runtime_endpoint);

    sync::monitor(&client, wait_for_stop(signal::ctrl_c()), &mut registry)
        .await
        .context("Container monitoring failed")
}

/// Resolves when `signal` fires; never resolves if the signal cannot be listened for.
async fn wait_for_stop(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        error!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_http_server(port: u16, state: watch::Receiver<ModelState>) {
    use warp::{Filter, http::StatusCode};

    let health = warp::path("health").map(|| "OK");

    let ready_state = state.clone();
    let ready = warp::path("ready").map(move || {
        if ready_state.borrow().ready {
            warp::reply::with_status("OK", StatusCode::OK)
        } else {
            warp::reply::with_status("NOT READY", StatusCode::SERVICE_UNAVAILABLE)
        }
    });

    let hostnames = warp::path("hostnames")
        .map(move || warp::reply::json(&state.borrow().context.hostnames));

    warp::serve(health.or(ready).or(hostnames))
        .run(([0, 0, 0, 0], port))
        .await;
}
