mod config;
mod container_runtime;
mod engine;
mod error;
mod gpu_inventory;
mod identity;
mod pools;
mod reaper;
mod store;
mod web;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::container_runtime::{BollardContainerRuntime, ContainerRuntime};
use crate::engine::SessionEngine;
use crate::gpu_inventory::{GpuInventory, NvidiaSmiInventory};
use crate::identity::{IdentityMinter, RsaIdentityMinter};
use crate::pools::{GpuPool, IpPool, PortPool};
use crate::store::SessionStore;
use crate::web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let overrides = config::parse_args();
    let config = config::load_config(&overrides)?;

    tracing::info!("===========================================");
    tracing::info!("  Sandman GPU Session Orchestrator v0.1.0");
    tracing::info!("===========================================");

    // GPU inventory failure at startup is fatal (spec.md §7).
    let gpu_inventory: Arc<dyn GpuInventory> = Arc::new(NvidiaSmiInventory);
    let slices = gpu_inventory
        .list_slices()
        .await
        .context("fatal: failed to discover GPU inventory at startup")?;
    tracing::info!(count = slices.len(), "discovered GPU/MIG partitions");

    // Store open failure at startup is fatal (spec.md §7).
    let store = SessionStore::open(&config.server.db)
        .await
        .context("fatal: failed to open session store")?;

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(BollardContainerRuntime::connect().context("fatal: failed to connect to container runtime")?);

    runtime
        .ensure_private_network(&config.network.bridge_name, &config.network.subnet)
        .await
        .context("fatal: failed to ensure private bridge network")?;

    let gpu_pool = GpuPool::new(slices);
    let port_pool = PortPool::new(config.server.ssh_port_start, config.server.ssh_port_end);
    let ip_pool = IpPool::new(
        &config.network.subnet,
        config.network.ip_range_start,
        config.network.ip_range_end,
        config.network.bridge_name.clone(),
    );
    let identity_minter: Arc<dyn IdentityMinter> = Arc::new(RsaIdentityMinter);

    let engine = Arc::new(SessionEngine::new(
        gpu_pool,
        port_pool,
        ip_pool,
        store,
        runtime,
        identity_minter,
        config.server.workspace_root.clone(),
        config.network.bridge_name.clone(),
    ));

    // Startup reconciliation: rebuild pool state from persisted records and
    // reconcile against the live container runtime before serving traffic
    // (spec.md §5).
    engine
        .reconcile_on_startup()
        .await
        .context("fatal: startup reconciliation failed")?;

    let state = AppState {
        engine: Arc::clone(&engine),
        gpu_inventory,
        service_name: config.server.service_name.clone(),
    };

    let reaper_engine = Arc::clone(&engine);
    let sweep_interval = Duration::from_secs(config.reaper.sweep_interval_secs);
    tokio::spawn(async move {
        reaper::run(reaper_engine, sweep_interval).await;
    });

    let app = web::build_router(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                        tracing::event!(
                            Level::INFO,
                            status = %response.status().as_u16(),
                            duration_ms = %latency.as_millis(),
                            "completed"
                        );
                    },
                ),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid bind address")?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    tracing::info!("listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("sandman-server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
