//! Per-action OCPP 1.6 handlers
//!
//! Handlers see schema-validated payloads only and express their effects
//! through the registries; CALLERROR conversion happens in the dispatcher.

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub use handle_authorize::handle_authorize;
pub use handle_boot_notification::handle_boot_notification;
pub use handle_data_transfer::handle_data_transfer;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::handle_meter_values;
pub use handle_start_transaction::handle_start_transaction;
pub use handle_status_notification::handle_status_notification;
pub use handle_stop_transaction::handle_stop_transaction;

use tracing::warn;

use crate::domain::MeterSample;
use crate::ocpp::payloads::MeterValue;

/// Flatten meter value batches into transaction samples, arrival order
/// preserved. Unparsable numeric values are skipped.
pub(crate) fn collect_samples(connector_id: u32, meter_values: &[MeterValue]) -> Vec<MeterSample> {
    let mut samples = Vec::new();
    for batch in meter_values {
        for sampled in &batch.sampled_value {
            match sampled.value.parse::<f64>() {
                Ok(value) => samples.push(MeterSample {
                    connector_id,
                    timestamp: batch.timestamp,
                    value,
                    measurand: sampled.measurand().to_string(),
                    unit: Some(sampled.unit().to_string()),
                    context: Some(sampled.context().to_string()),
                }),
                Err(_) => {
                    warn!(
                        connector_id,
                        value = sampled.value.as_str(),
                        "Skipping non-numeric sampled value"
                    );
                }
            }
        }
    }
    samples
}
