//! BootNotification handler

use tracing::info;

use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{BootNotificationRequest, BootNotificationResponse, RegistrationStatus};

pub async fn handle_boot_notification(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: BootNotificationRequest,
) -> Result<BootNotificationResponse, CallFault> {
    info!(
        charge_point_id,
        vendor = payload.charge_point_vendor.as_str(),
        model = payload.charge_point_model.as_str(),
        "BootNotification"
    );

    ctx.charge_points.handle_boot_notification(
        charge_point_id,
        &payload.charge_point_vendor,
        &payload.charge_point_model,
        payload.charge_point_serial_number.as_deref(),
        payload.firmware_version.as_deref(),
    );

    Ok(BootNotificationResponse {
        status: RegistrationStatus::Accepted,
        current_time: ctx.clock.now_iso(),
        interval: ctx.heartbeat_interval,
    })
}
