//! StartTransaction handler

use tracing::info;

use crate::domain::ConnectorStatus;
use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{StartTransactionRequest, StartTransactionResponse};
use crate::registry::BindingSource;
use crate::support::errors::DomainError;

pub async fn handle_start_transaction(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: StartTransactionRequest,
) -> Result<StartTransactionResponse, CallFault> {
    info!(
        charge_point_id,
        connector_id = payload.connector_id,
        id_tag = payload.id_tag.as_str(),
        meter_start = payload.meter_start,
        "StartTransaction"
    );

    if !ctx.charge_points.is_registered(charge_point_id) {
        return Err(CallFault::security(format!(
            "Charge point {} has not completed BootNotification",
            charge_point_id
        )));
    }

    let outcome = ctx
        .transactions
        .start(
            charge_point_id,
            payload.connector_id,
            &payload.id_tag,
            payload.meter_start,
            Some(payload.timestamp),
        )
        .map_err(|e| match e {
            DomainError::TransactionIdExhausted => {
                CallFault::internal("Transaction ID space exhausted")
            }
            other => CallFault::internal(other.to_string()),
        })?;

    if outcome.transaction_id > 0 {
        ctx.authorization.start_session(charge_point_id, &payload.id_tag);
        ctx.charge_points.set_connector_txn_binding(
            charge_point_id,
            payload.connector_id,
            Some(outcome.transaction_id),
            BindingSource::Dispatch,
        );
        ctx.charge_points.set_status(charge_point_id, ConnectorStatus::Charging);
    }

    Ok(StartTransactionResponse {
        transaction_id: outcome.transaction_id,
        id_tag_info: outcome.id_tag_info,
    })
}
