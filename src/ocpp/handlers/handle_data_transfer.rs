//! DataTransfer handler

use tracing::info;

use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{DataTransferRequest, DataTransferResponse};

pub async fn handle_data_transfer(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: DataTransferRequest,
) -> Result<DataTransferResponse, CallFault> {
    info!(
        charge_point_id,
        vendor_id = payload.vendor_id.as_str(),
        message_id = ?payload.message_id,
        "DataTransfer"
    );

    Ok(ctx.data_transfer.dispatch(charge_point_id, &payload))
}
