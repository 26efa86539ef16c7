//! Heartbeat handler

use tracing::debug;

use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::HeartbeatResponse;

pub async fn handle_heartbeat(
    ctx: &OcppContext,
    charge_point_id: &str,
) -> Result<HeartbeatResponse, CallFault> {
    debug!(charge_point_id, "Heartbeat");

    ctx.charge_points.handle_heartbeat(charge_point_id);

    Ok(HeartbeatResponse {
        current_time: ctx.clock.now_iso(),
    })
}
