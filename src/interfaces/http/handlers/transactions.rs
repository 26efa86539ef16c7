//! Transaction snapshot projections

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Transaction;
use crate::registry::{ChargePointRegistry, TransactionRegistry};

use super::{error_response, ErrorBody};

#[derive(Clone)]
pub struct TransactionsState {
    pub transactions: Arc<TransactionRegistry>,
    pub charge_points: Arc<ChargePointRegistry>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: i32,
    pub charge_point_id: String,
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_stop: Option<i32>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_used: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub sample_count: usize,
}

impl TransactionDto {
    pub fn from_domain(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            energy_used: tx.energy_used(),
            duration_seconds: tx.duration_seconds(),
            status: tx.status.to_string(),
            sample_count: tx.samples.len(),
            charge_point_id: tx.charge_point_id,
            connector_id: tx.connector_id,
            id_tag: tx.id_tag,
            meter_start: tx.meter_start,
            meter_stop: tx.meter_stop,
            start_time: tx.start_time,
            stop_time: tx.stop_time,
            stop_reason: tx.stop_reason,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionListResponse {
    pub count: usize,
    pub transactions: Vec<TransactionDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationTransactionsResponse {
    pub charge_point_id: String,
    pub count: usize,
    pub transactions: Vec<TransactionDto>,
}

#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "Transactions",
    responses(
        (status = 200, description = "All transactions", body = TransactionListResponse)
    )
)]
pub async fn list_transactions(
    State(state): State<TransactionsState>,
) -> Json<TransactionListResponse> {
    let mut transactions: Vec<TransactionDto> = state
        .transactions
        .list()
        .into_iter()
        .map(TransactionDto::from_domain)
        .collect();
    transactions.sort_by_key(|tx| tx.id);
    Json(TransactionListResponse {
        count: transactions.len(),
        transactions,
    })
}

#[utoipa::path(
    get,
    path = "/api/stations/{id}/transactions",
    tag = "Transactions",
    params(("id" = String, Path, description = "Station ID")),
    responses(
        (status = 200, description = "Transactions of one station", body = StationTransactionsResponse),
        (status = 404, description = "Unknown station", body = ErrorBody)
    )
)]
pub async fn list_station_transactions(
    State(state): State<TransactionsState>,
    Path(id): Path<String>,
) -> Result<Json<StationTransactionsResponse>, (StatusCode, Json<ErrorBody>)> {
    if state.charge_points.get(&id).is_none() {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Station {} not found", id),
        ));
    }

    let mut transactions: Vec<TransactionDto> = state
        .transactions
        .by_station(&id)
        .into_iter()
        .map(TransactionDto::from_domain)
        .collect();
    transactions.sort_by_key(|tx| tx.id);

    Ok(Json(StationTransactionsResponse {
        charge_point_id: id,
        count: transactions.len(),
        transactions,
    }))
}
