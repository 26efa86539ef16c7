//! Delta events streamed to dashboard subscribers
//!
//! Three topics: `station_update`, `connector_update`, `payment_update`.
//! Every payload carries the station ID and a timestamp so subscribers can
//! route and drop out-of-order deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A state delta on one of the three topics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Station-level change (boot, heartbeat, connect state, station-wide status)
    StationUpdate(StationUpdate),
    /// Per-connector change (status, meter snapshot, transaction binding)
    ConnectorUpdate(ConnectorUpdate),
    /// Externally-triggered change (remote commands, payment-driven bindings)
    PaymentUpdate(PaymentUpdate),
}

impl Event {
    /// Topic name of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StationUpdate(_) => "station_update",
            Event::ConnectorUpdate(_) => "connector_update",
            Event::PaymentUpdate(_) => "payment_update",
        }
    }

    /// Station the event belongs to
    pub fn charge_point_id(&self) -> &str {
        match self {
            Event::StationUpdate(e) => &e.charge_point_id,
            Event::ConnectorUpdate(e) => &e.charge_point_id,
            Event::PaymentUpdate(e) => &e.charge_point_id,
        }
    }

    /// Commit timestamp of the mutation that produced the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::StationUpdate(e) => e.timestamp,
            Event::ConnectorUpdate(e) => e.timestamp,
            Event::PaymentUpdate(e) => e.timestamp,
        }
    }
}

/// Station-level delta
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationUpdate {
    pub charge_point_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub registered: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Per-connector delta
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorUpdate {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    /// Last primary energy reading, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Externally-triggered delta
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub charge_point_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for delivering events with a message ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn wire_format_is_tag_and_data() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let event = Event::ConnectorUpdate(ConnectorUpdate {
            charge_point_id: "CP001".to_string(),
            connector_id: 1,
            status: "Charging".to_string(),
            error_code: None,
            transaction_id: Some(7),
            meter_value: None,
            meter_unit: None,
            timestamp: ts,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "connector_update");
        assert_eq!(value["data"]["chargePointId"], "CP001");
        assert_eq!(value["data"]["connectorId"], 1);
        assert_eq!(value["data"]["transactionId"], 7);
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn topic_names() {
        let ts = Utc::now();
        let station = Event::StationUpdate(StationUpdate {
            charge_point_id: "CP001".to_string(),
            status: "Available".to_string(),
            error_code: None,
            registered: true,
            connected: true,
            last_heartbeat: None,
            timestamp: ts,
        });
        assert_eq!(station.event_type(), "station_update");
        assert_eq!(station.charge_point_id(), "CP001");

        let payment = Event::PaymentUpdate(PaymentUpdate {
            charge_point_id: "CP002".to_string(),
            connector_id: None,
            transaction_id: Some(1),
            id_tag: None,
            status: "Accepted".to_string(),
            timestamp: ts,
        });
        assert_eq!(payment.event_type(), "payment_update");
    }
}
