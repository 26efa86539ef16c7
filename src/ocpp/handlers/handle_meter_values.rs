//! MeterValues handler

use tracing::{info, warn};

use crate::domain::{MeterReading, MeterSnapshot};
use crate::ocpp::dispatcher::{CallFault, OcppContext};
use crate::ocpp::payloads::{MeterValuesRequest, MeterValuesResponse};

use super::collect_samples;

pub async fn handle_meter_values(
    ctx: &OcppContext,
    charge_point_id: &str,
    payload: MeterValuesRequest,
) -> Result<MeterValuesResponse, CallFault> {
    info!(
        charge_point_id,
        connector_id = payload.connector_id,
        transaction_id = ?payload.transaction_id,
        batches = payload.meter_value.len(),
        "MeterValues"
    );

    if !ctx.charge_points.is_registered(charge_point_id) {
        return Err(CallFault::security(format!(
            "Charge point {} has not completed BootNotification",
            charge_point_id
        )));
    }

    let samples = collect_samples(payload.connector_id, &payload.meter_value);

    // The newest Energy.Active.Import.* reading becomes the connector's
    // primary snapshot; everything else is merged as additional readings.
    let mut snapshot: Option<MeterSnapshot> = None;
    let mut additional = Vec::new();
    for batch in &payload.meter_value {
        for sampled in &batch.sampled_value {
            let Ok(value) = sampled.value.parse::<f64>() else {
                continue;
            };
            if sampled.is_primary_energy() {
                let newer = snapshot
                    .as_ref()
                    .map_or(true, |s| batch.timestamp >= s.timestamp);
                if newer {
                    snapshot = Some(MeterSnapshot {
                        value,
                        unit: sampled.unit().to_string(),
                        timestamp: batch.timestamp,
                    });
                }
            } else {
                additional.push((
                    sampled.measurand().to_string(),
                    MeterReading {
                        value,
                        unit: Some(sampled.unit().to_string()),
                        timestamp: batch.timestamp,
                    },
                ));
            }
        }
    }

    if let Some(transaction_id) = payload.transaction_id {
        if !ctx.transactions.append_meter(transaction_id, samples) {
            warn!(
                charge_point_id,
                transaction_id, "MeterValues for unknown transaction"
            );
        }
    }

    ctx.charge_points
        .update_meter(charge_point_id, payload.connector_id, snapshot, additional);

    Ok(MeterValuesResponse {})
}
