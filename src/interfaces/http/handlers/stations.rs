//! Station snapshot projections

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ChargePoint, ConnectorState};
use crate::registry::ChargePointRegistry;

use super::{error_response, ErrorBody};

#[derive(Clone)]
pub struct StationsState {
    pub charge_points: Arc<ChargePointRegistry>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDto {
    pub connector_id: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
}

impl ConnectorDto {
    fn from_domain(connector_id: u32, state: &ConnectorState) -> Self {
        Self {
            connector_id,
            status: state.status.to_string(),
            error_code: state.error_code.clone(),
            meter_value: state.meter.as_ref().map(|m| m.value),
            meter_unit: state.meter.as_ref().map(|m| m.unit.clone()),
            meter_timestamp: state.meter.as_ref().map(|m| m.timestamp),
            status_updated_at: state.status_updated_at,
            transaction_id: state.transaction_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationDto {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    pub registered: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub connectors: Vec<ConnectorDto>,
}

impl StationDto {
    pub fn from_domain(cp: ChargePoint) -> Self {
        Self {
            id: cp.id,
            vendor: cp.vendor,
            model: cp.model,
            serial_number: cp.serial_number,
            firmware_version: cp.firmware_version,
            registered: cp.registered,
            connected: cp.connected,
            registered_at: cp.registered_at,
            last_heartbeat: cp.last_heartbeat,
            status: cp.status.to_string(),
            error_code: cp.error_code,
            connectors: cp
                .connectors
                .iter()
                .map(|(id, state)| ConnectorDto::from_domain(*id, state))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StationListResponse {
    pub count: usize,
    pub stations: Vec<StationDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StationResponse {
    pub station: StationDto,
}

#[utoipa::path(
    get,
    path = "/api/stations",
    tag = "Stations",
    responses(
        (status = 200, description = "All station snapshots", body = StationListResponse)
    )
)]
pub async fn list_stations(State(state): State<StationsState>) -> Json<StationListResponse> {
    let stations: Vec<StationDto> = state
        .charge_points
        .list()
        .into_iter()
        .map(StationDto::from_domain)
        .collect();
    Json(StationListResponse {
        count: stations.len(),
        stations,
    })
}

#[utoipa::path(
    get,
    path = "/api/stations/{id}",
    tag = "Stations",
    params(("id" = String, Path, description = "Station ID")),
    responses(
        (status = 200, description = "Station snapshot", body = StationResponse),
        (status = 404, description = "Unknown station", body = ErrorBody)
    )
)]
pub async fn get_station(
    State(state): State<StationsState>,
    Path(id): Path<String>,
) -> Result<Json<StationResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.charge_points.get(&id) {
        Some(cp) => Ok(Json(StationResponse {
            station: StationDto::from_domain(cp),
        })),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Station {} not found", id),
        )),
    }
}
