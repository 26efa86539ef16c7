//! Voltmesh CSMS entry point
//!
//! OCPP 1.6J Central System: one WebSocket listener for charge points,
//! one HTTP listener for the REST projection and dashboard WebSocket.

use std::sync::Arc;

use tracing::{error, info};

use voltmesh::commands::create_command_sender;
use voltmesh::config::{default_config_path, AppConfig};
use voltmesh::interfaces::http::{create_api_router, ApiState};
use voltmesh::interfaces::ws::OcppServer;
use voltmesh::ocpp::{DataTransferExtensions, OcppContext};
use voltmesh::registry::{
    AuthorizationRegistry, ChargePointRegistry, NullTransactionStore, TransactionRegistry,
};
use voltmesh::session::SessionRegistry;
use voltmesh::support::shutdown::ShutdownCoordinator;
use voltmesh::{create_event_bus, system_clock};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("VOLTMESH_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => {
            init_tracing(&config.logging.level);
            info!("Configuration loaded from {}", config_path.display());
            config
        }
        Err(e) => {
            let config = AppConfig::from_env();
            init_tracing(&config.logging.level);
            info!(
                "No config file ({}), using defaults with env overrides",
                e
            );
            config
        }
    };

    info!("Starting Voltmesh OCPP Central System...");

    // ── Prometheus metrics recorder (before any metrics calls) ──
    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    info!("📊 Prometheus metrics recorder installed");

    // ── Core components ────────────────────────────────────────
    let clock = system_clock();
    let event_bus = create_event_bus();

    let authorization = AuthorizationRegistry::shared(config.ocpp.accept_unknown_tags, clock.clone());
    authorization.seed(&config.tags);

    let charge_points = ChargePointRegistry::shared(event_bus.clone(), clock.clone());
    let transactions = TransactionRegistry::shared(
        authorization.clone(),
        Arc::new(NullTransactionStore),
        clock.clone(),
    );
    transactions.restore().await;

    let sessions = SessionRegistry::shared();
    let command_sender = create_command_sender(
        sessions.clone(),
        std::time::Duration::from_secs(config.ocpp.pending_request_ttl),
        clock.clone(),
    );

    let ctx = Arc::new(OcppContext {
        charge_points: charge_points.clone(),
        transactions: transactions.clone(),
        authorization,
        clock: clock.clone(),
        heartbeat_interval: config.ocpp.heartbeat_interval,
        data_transfer: Arc::new(DataTransferExtensions::new()),
    });

    // ── Shutdown coordination ──────────────────────────────────
    let shutdown = ShutdownCoordinator::new();
    let shutdown_signal = shutdown.signal();
    shutdown.start_signal_listener();

    // Periodic sweep for pending-request entries whose waiter is gone.
    {
        let command_sender = command_sender.clone();
        let sweep_shutdown = shutdown_signal.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => command_sender.expire_overdue(),
                    _ = sweep_shutdown.notified().wait() => break,
                }
            }
        });
    }

    // ── OCPP WebSocket server ──────────────────────────────────
    let ocpp_server = OcppServer::new(
        config.clone(),
        ctx,
        sessions.clone(),
        command_sender.clone(),
    )
    .with_shutdown(shutdown_signal.clone());

    // ── REST API + dashboard WebSocket ─────────────────────────
    let api_router = create_api_router(ApiState {
        charge_points,
        transactions,
        command_sender: command_sender.clone(),
        event_bus,
        clock,
        prometheus: prometheus_handle,
    });

    let api_addr = config.server.api_addr();
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("REST API listening on http://{}", api_addr);
    info!("Swagger UI available at http://{}/docs/", api_addr);
    info!("Dashboard WebSocket at ws://{}/ws", api_addr);

    let api_shutdown = shutdown_signal.clone();
    let api_server = axum::serve(listener, api_router).with_graceful_shutdown(async move {
        api_shutdown.wait().await;
        info!("🛑 REST API server received shutdown signal");
    });

    // ── Run both servers ───────────────────────────────────────
    info!("🚀 All servers started. Press Ctrl+C to shutdown gracefully.");

    let ws_result = tokio::spawn(async move { ocpp_server.run().await });
    let api_result = tokio::spawn(async move { api_server.await });

    tokio::select! {
        result = ws_result => {
            match result {
                Ok(Ok(())) => info!("OCPP server stopped"),
                Ok(Err(e)) => error!("OCPP server error: {}", e),
                Err(e) => error!("OCPP server task panicked: {}", e),
            }
        }
        result = api_result => {
            match result {
                Ok(Ok(())) => info!("REST API server stopped"),
                Ok(Err(e)) => error!("REST API server error: {}", e),
                Err(e) => error!("REST API server task panicked: {}", e),
            }
        }
    }

    // Pending waiters receive Canceled on the way out.
    command_sender.cancel_all();

    info!("👋 Voltmesh Central System shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
