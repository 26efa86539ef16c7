//! StopTransaction handler

use tracing::{info, warn};

use crate::domain::{ConnectorStatus, IdTagInfo, IdTagStatus};
use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{StopTransactionRequest, StopTransactionResponse};
use crate::registry::BindingSource;
use crate::support::errors::DomainError;

use super::collect_samples;

pub async fn handle_stop_transaction(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: StopTransactionRequest,
) -> Result<StopTransactionResponse, CallFault> {
    info!(
        charge_point_id,
        transaction_id = payload.transaction_id,
        meter_stop = payload.meter_stop,
        reason = payload.reason.as_deref().unwrap_or("-"),
        "StopTransaction"
    );

    if !ctx.charge_points.is_registered(charge_point_id) {
        return Err(CallFault::security(format!(
            "Charge point {} has not completed BootNotification",
            charge_point_id
        )));
    }

    let outcome = match ctx
        .transactions
        .stop(
            payload.transaction_id,
            payload.meter_stop,
            Some(payload.timestamp),
            payload.id_tag.as_deref(),
            payload.reason.clone(),
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(DomainError::TransactionNotFound(id)) => {
            warn!(charge_point_id, transaction_id = id, "Stop for unknown transaction");
            return Ok(StopTransactionResponse {
                id_tag_info: Some(IdTagInfo::new(IdTagStatus::Invalid)),
            });
        }
        Err(other) => return Err(CallFault::internal(other.to_string())),
    };

    // Trailing transactionData samples ride along with the stop.
    if let Some(data) = &payload.transaction_data {
        let samples = collect_samples(outcome.connector_id, data);
        if !samples.is_empty() {
            ctx.transactions.append_meter(payload.transaction_id, samples);
        }
    }

    ctx.charge_points.set_connector_txn_binding(
        charge_point_id,
        outcome.connector_id,
        None,
        BindingSource::Dispatch,
    );
    ctx.charge_points
        .set_connector_status(charge_point_id, outcome.connector_id, ConnectorStatus::Available);
    if !ctx.transactions.has_in_progress(charge_point_id) {
        ctx.charge_points.set_status(charge_point_id, ConnectorStatus::Available);
    }
    ctx.authorization.end_session(charge_point_id, &outcome.id_tag);

    Ok(StopTransactionResponse {
        id_tag_info: outcome.id_tag_info,
    })
}
