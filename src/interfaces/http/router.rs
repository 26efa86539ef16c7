//! API router with Swagger UI

use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::commands::SharedCommandSender;
use crate::events::SharedEventBus;
use crate::interfaces::ws::{ws_dashboard_handler, DashboardState};
use crate::registry::{ChargePointRegistry, TransactionRegistry};
use crate::support::clock::SharedClock;

use super::handlers::{self, commands, health, stations, transactions};

/// Unified state for all projection routes. Axum extracts the specific
/// handler state via `FromRef`.
#[derive(Clone)]
pub struct ApiState {
    pub charge_points: Arc<ChargePointRegistry>,
    pub transactions: Arc<TransactionRegistry>,
    pub command_sender: SharedCommandSender,
    pub event_bus: SharedEventBus,
    pub clock: SharedClock,
    pub prometheus: PrometheusHandle,
}

// -- FromRef implementations so each handler keeps its own State<T> extractor --

impl FromRef<ApiState> for health::HealthState {
    fn from_ref(s: &ApiState) -> Self {
        health::HealthState {
            clock: s.clock.clone(),
        }
    }
}

impl FromRef<ApiState> for stations::StationsState {
    fn from_ref(s: &ApiState) -> Self {
        stations::StationsState {
            charge_points: Arc::clone(&s.charge_points),
        }
    }
}

impl FromRef<ApiState> for transactions::TransactionsState {
    fn from_ref(s: &ApiState) -> Self {
        transactions::TransactionsState {
            transactions: Arc::clone(&s.transactions),
            charge_points: Arc::clone(&s.charge_points),
        }
    }
}

impl FromRef<ApiState> for commands::CommandsState {
    fn from_ref(s: &ApiState) -> Self {
        commands::CommandsState {
            command_sender: Arc::clone(&s.command_sender),
            event_bus: s.event_bus.clone(),
            clock: s.clock.clone(),
        }
    }
}

impl FromRef<ApiState> for DashboardState {
    fn from_ref(s: &ApiState) -> Self {
        DashboardState {
            event_bus: s.event_bus.clone(),
        }
    }
}

impl FromRef<ApiState> for PrometheusHandle {
    fn from_ref(s: &ApiState) -> Self {
        s.prometheus.clone()
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::stations::list_stations,
        handlers::stations::get_station,
        handlers::transactions::list_transactions,
        handlers::transactions::list_station_transactions,
        handlers::commands::remote_start,
        handlers::commands::remote_stop,
    ),
    components(schemas(
        handlers::ErrorBody,
        handlers::health::HealthResponse,
        handlers::stations::StationDto,
        handlers::stations::ConnectorDto,
        handlers::stations::StationListResponse,
        handlers::stations::StationResponse,
        handlers::transactions::TransactionDto,
        handlers::transactions::TransactionListResponse,
        handlers::transactions::StationTransactionsResponse,
        handlers::commands::RemoteStartBody,
        handlers::commands::RemoteStopBody,
        handlers::commands::CommandResponse,
    )),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Stations", description = "Live station snapshots"),
        (name = "Transactions", description = "Charging transactions"),
        (name = "Commands", description = "Server-initiated OCPP calls")
    )
)]
struct ApiDoc;

async fn metrics_handler(State(prometheus): State<PrometheusHandle>) -> String {
    prometheus.render()
}

/// Build the REST + dashboard-WebSocket router.
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/stations", get(stations::list_stations))
        .route("/api/stations/{id}", get(stations::get_station))
        .route("/api/transactions", get(transactions::list_transactions))
        .route(
            "/api/stations/{id}/transactions",
            get(transactions::list_station_transactions),
        )
        .route(
            "/api/stations/{id}/commands/remote-start",
            post(commands::remote_start),
        )
        .route(
            "/api/stations/{id}/commands/remote-stop",
            post(commands::remote_stop),
        )
        .route("/ws", get(ws_dashboard_handler))
        .route("/metrics", get(metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
