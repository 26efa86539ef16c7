//! OCPP 1.6 message dispatch
//!
//! Triage of inbound frames: type-2 CALLs are validated, routed to the
//! matching handler and answered with exactly one CALLRESULT or CALLERROR;
//! type-3/4 frames are handed to the pending-request tracker. Any handler
//! failure becomes a CALLERROR and the connection keeps serving.

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::commands::SharedCommandSender;
use crate::ocpp::payloads::{DataTransferRequest, DataTransferResponse, DataTransferStatus};
use crate::ocpp::{handlers, validator};
use crate::registry::{AuthorizationRegistry, ChargePointRegistry, TransactionRegistry};
use crate::support::clock::SharedClock;
use crate::support::ocpp_frame::{OcppErrorCode, OcppFrame, OcppFrameError};

use super::validator::ValidationFailure;

/// A handler failure that maps to one CALLERROR
#[derive(Debug, Clone)]
pub struct CallFault {
    pub code: OcppErrorCode,
    pub description: String,
}

impl CallFault {
    pub fn new(code: OcppErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn security(description: impl Into<String>) -> Self {
        Self::new(OcppErrorCode::SecurityError, description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(OcppErrorCode::InternalError, description)
    }
}

impl From<ValidationFailure> for CallFault {
    fn from(failure: ValidationFailure) -> Self {
        Self::new(failure.code, failure.description)
    }
}

/// Vendor-specific DataTransfer extension point
pub trait DataTransferHandler: Send + Sync {
    fn handle(
        &self,
        charge_point_id: &str,
        message_id: Option<&str>,
        data: Option<&str>,
    ) -> DataTransferResponse;
}

/// Registered DataTransfer extensions, keyed by vendor ID
#[derive(Default)]
pub struct DataTransferExtensions {
    handlers: DashMap<String, Arc<dyn DataTransferHandler>>,
}

impl DataTransferExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, vendor_id: impl Into<String>, handler: Arc<dyn DataTransferHandler>) {
        self.handlers.insert(vendor_id.into(), handler);
    }

    pub fn dispatch(&self, charge_point_id: &str, request: &DataTransferRequest) -> DataTransferResponse {
        match self.handlers.get(&request.vendor_id) {
            Some(handler) => handler.handle(
                charge_point_id,
                request.message_id.as_deref(),
                request.data.as_deref(),
            ),
            None => DataTransferResponse {
                status: DataTransferStatus::UnknownVendorId,
                data: None,
            },
        }
    }
}

/// Shared services the per-action handlers work against
pub struct OcppContext {
    pub charge_points: Arc<ChargePointRegistry>,
    pub transactions: Arc<TransactionRegistry>,
    pub authorization: Arc<AuthorizationRegistry>,
    pub clock: SharedClock,
    /// Interval handed to stations in BootNotification.conf (seconds)
    pub heartbeat_interval: i32,
    pub data_transfer: Arc<DataTransferExtensions>,
}

/// Per-connection handler for OCPP 1.6 messages
pub struct OcppHandler {
    pub charge_point_id: String,
    ctx: Arc<OcppContext>,
    command_sender: SharedCommandSender,
}

impl OcppHandler {
    pub fn new(
        charge_point_id: impl Into<String>,
        ctx: Arc<OcppContext>,
        command_sender: SharedCommandSender,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            ctx,
            command_sender,
        }
    }

    /// Handle one inbound text frame.
    ///
    /// `Ok(Some(reply))` must be sent back on the same connection;
    /// `Ok(None)` means the frame was a response and is fully consumed;
    /// `Err` is a framing violation the connection layer answers with a
    /// protocol-error close.
    pub async fn handle(&self, text: &str) -> Result<Option<String>, OcppFrameError> {
        match OcppFrame::parse(text)? {
            OcppFrame::Call {
                message_id,
                action,
                payload,
            } => Ok(Some(self.handle_call(message_id, action, payload).await)),
            OcppFrame::CallResult { message_id, payload } => {
                self.command_sender
                    .handle_response(&self.charge_point_id, &message_id, payload);
                Ok(None)
            }
            OcppFrame::CallError {
                message_id,
                error_code,
                error_description,
                ..
            } => {
                self.command_sender.handle_error(
                    &self.charge_point_id,
                    &message_id,
                    &error_code,
                    &error_description,
                );
                Ok(None)
            }
        }
    }

    async fn handle_call(&self, message_id: String, action: String, payload: Value) -> String {
        debug!(
            charge_point_id = self.charge_point_id.as_str(),
            action = action.as_str(),
            message_id = message_id.as_str(),
            "Dispatching call"
        );
        metrics::counter!("ocpp_calls", "action" => action.clone()).increment(1);

        let frame = match self.dispatch(&action, payload).await {
            Ok(response) => OcppFrame::CallResult {
                message_id,
                payload: response,
            },
            Err(fault) => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    action = action.as_str(),
                    code = fault.code.as_str(),
                    description = fault.description.as_str(),
                    "Call rejected"
                );
                metrics::counter!("ocpp_call_errors", "action" => action.clone()).increment(1);
                OcppFrame::error_response(message_id, fault.code, fault.description)
            }
        };
        frame.serialize()
    }

    async fn dispatch(&self, action: &str, payload: Value) -> Result<Value, CallFault> {
        validator::validate_request(action, &payload)?;

        let ctx = &self.ctx;
        let station = self.charge_point_id.as_str();

        match action {
            "BootNotification" => {
                respond(handlers::handle_boot_notification(ctx, station, parse(payload)?).await?)
            }
            "Heartbeat" => respond(handlers::handle_heartbeat(ctx, station).await?),
            "StatusNotification" => {
                respond(handlers::handle_status_notification(ctx, station, parse(payload)?).await?)
            }
            "Authorize" => respond(handlers::handle_authorize(ctx, station, parse(payload)?).await?),
            "StartTransaction" => {
                respond(handlers::handle_start_transaction(ctx, station, parse(payload)?).await?)
            }
            "StopTransaction" => {
                respond(handlers::handle_stop_transaction(ctx, station, parse(payload)?).await?)
            }
            "MeterValues" => {
                respond(handlers::handle_meter_values(ctx, station, parse(payload)?).await?)
            }
            "DataTransfer" => {
                respond(handlers::handle_data_transfer(ctx, station, parse(payload)?).await?)
            }
            // validate_request already rejected anything else
            other => Err(CallFault::new(
                OcppErrorCode::NotImplemented,
                format!("Action not supported: {}", other),
            )),
        }
    }
}

/// Deserialize a schema-validated payload into its typed form.
fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, CallFault> {
    serde_json::from_value(payload)
        .map_err(|e| CallFault::internal(format!("Payload deserialization failed: {}", e)))
}

fn respond<T: serde::Serialize>(response: T) -> Result<Value, CallFault> {
    serde_json::to_value(response)
        .map_err(|e| CallFault::internal(format!("Response serialization failed: {}", e)))
}
