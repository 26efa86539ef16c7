//! Operator-triggered remote commands

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::commands::{self, CommandError, SharedCommandSender};
use crate::events::SharedEventBus;
use crate::support::clock::SharedClock;

use super::{error_response, ErrorBody};

#[derive(Clone)]
pub struct CommandsState {
    pub command_sender: SharedCommandSender,
    pub event_bus: SharedEventBus,
    pub clock: SharedClock,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartBody {
    pub id_tag: String,
    #[serde(default)]
    pub connector_id: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopBody {
    pub transaction_id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandResponse {
    /// `Accepted` or `Rejected`, as answered by the station
    pub status: String,
}

fn map_command_error(
    station_id: &str,
    error: CommandError,
) -> (StatusCode, Json<ErrorBody>) {
    match error {
        CommandError::NotConnected(_) => error_response(
            StatusCode::NOT_FOUND,
            format!("Station {} is not connected", station_id),
        ),
        CommandError::Timeout => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "Station did not answer within the deadline",
        ),
        CommandError::CallError { code, description } => error_response(
            StatusCode::BAD_GATEWAY,
            format!("Station rejected the call: {} ({})", code, description),
        ),
        CommandError::Disconnected => error_response(
            StatusCode::BAD_GATEWAY,
            "Station disconnected while the call was pending",
        ),
        // No internals in the body
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Command failed"),
    }
}

#[utoipa::path(
    post,
    path = "/api/stations/{id}/commands/remote-start",
    tag = "Commands",
    params(("id" = String, Path, description = "Station ID")),
    request_body = RemoteStartBody,
    responses(
        (status = 200, description = "Station answered", body = CommandResponse),
        (status = 404, description = "Station not connected", body = ErrorBody),
        (status = 504, description = "No answer within the deadline", body = ErrorBody)
    )
)]
pub async fn remote_start(
    State(state): State<CommandsState>,
    Path(id): Path<String>,
    Json(body): Json<RemoteStartBody>,
) -> Result<Json<CommandResponse>, (StatusCode, Json<ErrorBody>)> {
    let status = commands::remote_start_transaction(
        &state.command_sender,
        &state.event_bus,
        &state.clock,
        &id,
        body.connector_id,
        &body.id_tag,
    )
    .await
    .map_err(|e| map_command_error(&id, e))?;

    Ok(Json(CommandResponse {
        status: format!("{:?}", status),
    }))
}

#[utoipa::path(
    post,
    path = "/api/stations/{id}/commands/remote-stop",
    tag = "Commands",
    params(("id" = String, Path, description = "Station ID")),
    request_body = RemoteStopBody,
    responses(
        (status = 200, description = "Station answered", body = CommandResponse),
        (status = 404, description = "Station not connected", body = ErrorBody),
        (status = 504, description = "No answer within the deadline", body = ErrorBody)
    )
)]
pub async fn remote_stop(
    State(state): State<CommandsState>,
    Path(id): Path<String>,
    Json(body): Json<RemoteStopBody>,
) -> Result<Json<CommandResponse>, (StatusCode, Json<ErrorBody>)> {
    let status = commands::remote_stop_transaction(
        &state.command_sender,
        &state.event_bus,
        &state.clock,
        &id,
        body.transaction_id,
    )
    .await
    .map_err(|e| map_command_error(&id, e))?;

    Ok(Json(CommandResponse {
        status: format!("{:?}", status),
    }))
}
