//! StatusNotification handler

use tracing::info;

use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{StatusNotificationRequest, StatusNotificationResponse};

pub async fn handle_status_notification(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: StatusNotificationRequest,
) -> Result<StatusNotificationResponse, CallFault> {
    info!(
        charge_point_id,
        connector_id = payload.connector_id,
        status = %payload.status,
        error_code = payload.error_code.as_str(),
        "StatusNotification"
    );

    ctx.charge_points.handle_status_notification(
        charge_point_id,
        payload.connector_id,
        payload.status,
        &payload.error_code,
        payload.info.as_deref(),
        payload.timestamp,
    );

    Ok(StatusNotificationResponse {})
}
