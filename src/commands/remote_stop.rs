//! RemoteStopTransaction command

use tracing::info;

use crate::events::{Event, PaymentUpdate, SharedEventBus};
use crate::ocpp::payloads::{RemoteStartStopStatus, RemoteStopTransactionRequest};
use crate::support::clock::SharedClock;

use super::remote_start::parse_status;
use super::{CommandError, SharedCommandSender};

/// Ask a charge point to stop a transaction.
///
/// A `Rejected` answer leaves the local transaction open; even on
/// `Accepted` the closure happens only when the station sends its own
/// StopTransaction call.
pub async fn remote_stop_transaction(
    command_sender: &SharedCommandSender,
    event_bus: &SharedEventBus,
    clock: &SharedClock,
    charge_point_id: &str,
    transaction_id: i32,
) -> Result<RemoteStartStopStatus, CommandError> {
    info!(charge_point_id, transaction_id, "RemoteStopTransaction");

    let request = RemoteStopTransactionRequest { transaction_id };
    let payload = serde_json::to_value(&request)
        .map_err(|e| CommandError::InvalidResponse(e.to_string()))?;

    let result = command_sender
        .send_command(charge_point_id, "RemoteStopTransaction", payload)
        .await?;
    let status = parse_status("RemoteStopTransaction", &result)?;

    event_bus.publish(Event::PaymentUpdate(PaymentUpdate {
        charge_point_id: charge_point_id.to_string(),
        connector_id: None,
        transaction_id: Some(transaction_id),
        id_tag: None,
        status: format!("RemoteStop{:?}", status),
        timestamp: clock.now(),
    }));

    Ok(status)
}
