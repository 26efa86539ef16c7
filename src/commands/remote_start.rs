//! RemoteStartTransaction command

use serde_json::Value;
use tracing::info;

use crate::events::{Event, PaymentUpdate, SharedEventBus};
use crate::ocpp::payloads::{
    RemoteStartStopResponse, RemoteStartStopStatus, RemoteStartTransactionRequest,
};
use crate::ocpp::validator;
use crate::support::clock::SharedClock;

use super::{CommandError, SharedCommandSender};

/// Ask a charge point to start a transaction for `id_tag`.
///
/// An `Accepted` answer does not create a transaction; the charge point is
/// expected to follow up with its own StartTransaction call.
pub async fn remote_start_transaction(
    command_sender: &SharedCommandSender,
    event_bus: &SharedEventBus,
    clock: &SharedClock,
    charge_point_id: &str,
    connector_id: Option<u32>,
    id_tag: &str,
) -> Result<RemoteStartStopStatus, CommandError> {
    info!(charge_point_id, ?connector_id, id_tag, "RemoteStartTransaction");

    let request = RemoteStartTransactionRequest {
        connector_id,
        id_tag: id_tag.to_string(),
    };
    let payload = serde_json::to_value(&request)
        .map_err(|e| CommandError::InvalidResponse(e.to_string()))?;

    let result = command_sender
        .send_command(charge_point_id, "RemoteStartTransaction", payload)
        .await?;
    let status = parse_status("RemoteStartTransaction", &result)?;

    event_bus.publish(Event::PaymentUpdate(PaymentUpdate {
        charge_point_id: charge_point_id.to_string(),
        connector_id,
        transaction_id: None,
        id_tag: Some(id_tag.to_string()),
        status: format!("RemoteStart{:?}", status),
        timestamp: clock.now(),
    }));

    Ok(status)
}

pub(super) fn parse_status(action: &str, payload: &Value) -> Result<RemoteStartStopStatus, CommandError> {
    validator::validate_response(action, payload)
        .map_err(|failure| CommandError::InvalidResponse(failure.description))?;
    let response: RemoteStartStopResponse = serde_json::from_value(payload.clone())
        .map_err(|e| CommandError::InvalidResponse(e.to_string()))?;
    Ok(response.status)
}
