//! Authorize handler

use tracing::info;

use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{AuthorizeRequest, AuthorizeResponse};

pub async fn handle_authorize(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: AuthorizeRequest,
) -> Result<AuthorizeResponse, CallFault> {
    let id_tag_info = ctx.authorization.validate(&payload.id_tag);
    info!(
        charge_point_id,
        id_tag = payload.id_tag.as_str(),
        status = %id_tag_info.status,
        "Authorize"
    );

    Ok(AuthorizeResponse { id_tag_info })
}
