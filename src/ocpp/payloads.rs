//! OCPP 1.6 payload definitions
//!
//! Field definitions of the PDUs this Central System exchanges. Inbound
//! payloads are deserialized only after schema validation, so handlers see
//! well-formed shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectorStatus, IdTagInfo};

// ── BootNotification ───────────────────────────────────────────

/// BootNotification.req sent by the charge point after start-up.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(default)]
    pub charge_point_serial_number: Option<String>,
    #[serde(default)]
    pub charge_box_serial_number: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub iccid: Option<String>,
    #[serde(default)]
    pub imsi: Option<String>,
    #[serde(default)]
    pub meter_type: Option<String>,
    #[serde(default)]
    pub meter_serial_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

/// BootNotification.conf
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub status: RegistrationStatus,
    /// Central System time, RFC 3339 with millisecond precision
    pub current_time: String,
    /// Heartbeat interval in seconds
    pub interval: i32,
}

// ── Heartbeat ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: String,
}

// ── StatusNotification ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationRequest {
    pub connector_id: u32,
    pub status: ConnectorStatus,
    pub error_code: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub vendor_error_code: Option<String>,
}

/// StatusNotification.conf carries no fields.
#[derive(Debug, Clone, Serialize)]
pub struct StatusNotificationResponse {}

// ── Authorize ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub id_tag: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub id_tag_info: IdTagInfo,
}

// ── StartTransaction ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reservation_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionResponse {
    pub transaction_id: i32,
    pub id_tag_info: IdTagInfo,
}

// ── StopTransaction ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionRequest {
    pub transaction_id: i32,
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub id_tag: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub transaction_data: Option<Vec<MeterValue>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

// ── MeterValues ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValuesRequest {
    pub connector_id: u32,
    #[serde(default)]
    pub transaction_id: Option<i32>,
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeterValuesResponse {}

/// One timestamped batch of sampled values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

/// A single reading inside a `MeterValue` batch.
///
/// All attributes except `value` are optional; readers use the accessors
/// below, which apply the OCPP 1.6 defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl SampledValue {
    pub fn measurand(&self) -> &str {
        self.measurand.as_deref().unwrap_or("Energy.Active.Import.Register")
    }

    pub fn context(&self) -> &str {
        self.context.as_deref().unwrap_or("Sample.Periodic")
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or("Raw")
    }

    /// Unit of the reading; inferred from the measurand when absent.
    pub fn unit(&self) -> &str {
        if let Some(unit) = self.unit.as_deref() {
            return unit;
        }
        let measurand = self.measurand();
        if measurand.starts_with("Energy") {
            "Wh"
        } else if measurand.starts_with("Power") {
            "W"
        } else if measurand.starts_with("Current") {
            "A"
        } else if measurand == "Voltage" {
            "V"
        } else if measurand == "SoC" {
            "Percent"
        } else {
            ""
        }
    }

    /// Whether this reading feeds the connector's primary energy snapshot.
    pub fn is_primary_energy(&self) -> bool {
        matches!(
            self.measurand(),
            "Energy.Active.Import.Register" | "Energy.Active.Import.Interval"
        )
    }
}

// ── DataTransfer ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferRequest {
    pub vendor_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub enum DataTransferStatus {
    Accepted,
    Rejected,
    UnknownMessageId,
    UnknownVendorId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferResponse {
    pub status: DataTransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

// ── Server-initiated calls ─────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    pub id_tag: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionRequest {
    pub transaction_id: i32,
}

/// Accepted/Rejected answer of the charge point to a remote command.
///
/// Acceptance only means the station will try; the transaction itself is
/// opened or closed by the Start/StopTransaction call that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStartStopStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartStopResponse {
    pub status: RemoteStartStopStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_value_defaults() {
        let sv: SampledValue = serde_json::from_str(r#"{"value":"1250"}"#).unwrap();
        assert_eq!(sv.measurand(), "Energy.Active.Import.Register");
        assert_eq!(sv.context(), "Sample.Periodic");
        assert_eq!(sv.format(), "Raw");
        assert_eq!(sv.unit(), "Wh");
        assert!(sv.is_primary_energy());
    }

    #[test]
    fn unit_inferred_from_measurand() {
        let sv: SampledValue =
            serde_json::from_str(r#"{"value":"7.2","measurand":"Power.Active.Import"}"#).unwrap();
        assert_eq!(sv.unit(), "W");
        assert!(!sv.is_primary_energy());

        let sv: SampledValue =
            serde_json::from_str(r#"{"value":"230","measurand":"Voltage"}"#).unwrap();
        assert_eq!(sv.unit(), "V");
    }

    #[test]
    fn explicit_unit_wins() {
        let sv: SampledValue =
            serde_json::from_str(r#"{"value":"1.25","unit":"kWh"}"#).unwrap();
        assert_eq!(sv.unit(), "kWh");
    }

    #[test]
    fn stop_response_omits_absent_id_tag_info() {
        let response = StopTransactionResponse { id_tag_info: None };
        assert_eq!(serde_json::to_value(&response).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn boot_request_parses_wire_shape() {
        let req: BootNotificationRequest = serde_json::from_str(
            r#"{"chargePointVendor":"V","chargePointModel":"M","firmwareVersion":"1.2.3"}"#,
        )
        .unwrap();
        assert_eq!(req.charge_point_vendor, "V");
        assert_eq!(req.firmware_version.as_deref(), Some("1.2.3"));
        assert!(req.iccid.is_none());
    }

    #[test]
    fn remote_start_serializes_camel_case() {
        let req = RemoteStartTransactionRequest {
            connector_id: Some(1),
            id_tag: "valid123".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"connectorId": 1, "idTag": "valid123"})
        );
    }
}
