//! Charge point domain entities

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCPP 1.6 charge point / connector status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl Default for ConnectorStatus {
    fn default() -> Self {
        Self::Available
    }
}

impl ConnectorStatus {
    /// Statuses a connector may legally report while a transaction is in
    /// flight on it.
    pub fn allows_active_transaction(&self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Charging | Self::SuspendedEV | Self::SuspendedEVSE | Self::Finishing
        )
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEV => "SuspendedEV",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

/// Primary energy reading of a connector.
///
/// Always refers to `Energy.Active.Import.Register` or
/// `Energy.Active.Import.Interval`; other measurands live in
/// [`ConnectorState::readings`] and never replace this snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSnapshot {
    /// Value in the reading unit
    pub value: f64,
    /// Reading unit, `Wh` unless the station says otherwise
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// Latest reading for a non-energy measurand (power, voltage, current, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Live state of one physical connector
#[derive(Debug, Clone, Default)]
pub struct ConnectorState {
    pub status: ConnectorStatus,
    pub error_code: Option<String>,
    pub info: Option<String>,
    /// Last primary energy snapshot
    pub meter: Option<MeterSnapshot>,
    /// Latest reading per additional measurand
    pub readings: BTreeMap<String, MeterReading>,
    pub status_updated_at: Option<DateTime<Utc>>,
    /// In-flight transaction bound to this connector, if any
    pub transaction_id: Option<i32>,
}

/// Charge point entity
///
/// Created on the first successful BootNotification and kept for the
/// process lifetime; updates are merge-over-last.
#[derive(Debug, Clone)]
pub struct ChargePoint {
    /// Station ID (the path segment of the connection URL)
    pub id: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    /// Completed a BootNotification at least once
    pub registered: bool,
    /// Currently holds a live WebSocket connection
    pub connected: bool,
    pub registered_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Station-wide status (StatusNotification on connector 0)
    pub status: ConnectorStatus,
    pub error_code: Option<String>,
    pub info: Option<String>,
    /// Per-connector state, connector IDs >= 1
    pub connectors: BTreeMap<u32, ConnectorState>,
}

impl ChargePoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            registered: false,
            connected: false,
            registered_at: None,
            last_heartbeat: None,
            status: ConnectorStatus::Unavailable,
            error_code: None,
            info: None,
            connectors: BTreeMap::new(),
        }
    }

    pub fn connector(&self, connector_id: u32) -> Option<&ConnectorState> {
        self.connectors.get(&connector_id)
    }

    /// Get or create the state for a connector.
    pub fn connector_mut(&mut self, connector_id: u32) -> &mut ConnectorState {
        self.connectors.entry(connector_id).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_charge_point_is_unregistered() {
        let cp = ChargePoint::new("CP001");
        assert_eq!(cp.id, "CP001");
        assert!(!cp.registered);
        assert!(!cp.connected);
        assert!(cp.connectors.is_empty());
        assert_eq!(cp.status, ConnectorStatus::Unavailable);
    }

    #[test]
    fn connector_mut_creates_on_demand() {
        let mut cp = ChargePoint::new("CP001");
        cp.connector_mut(1).status = ConnectorStatus::Charging;
        assert_eq!(cp.connector(1).unwrap().status, ConnectorStatus::Charging);
        assert!(cp.connector(2).is_none());
    }

    #[test]
    fn transaction_compatible_statuses() {
        assert!(ConnectorStatus::Charging.allows_active_transaction());
        assert!(ConnectorStatus::Preparing.allows_active_transaction());
        assert!(ConnectorStatus::SuspendedEV.allows_active_transaction());
        assert!(!ConnectorStatus::Available.allows_active_transaction());
        assert!(!ConnectorStatus::Faulted.allows_active_transaction());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_value(ConnectorStatus::SuspendedEVSE).unwrap(),
            serde_json::json!("SuspendedEVSE")
        );
        let parsed: ConnectorStatus = serde_json::from_str("\"Preparing\"").unwrap();
        assert_eq!(parsed, ConnectorStatus::Preparing);
        assert_eq!(ConnectorStatus::SuspendedEV.to_string(), "SuspendedEV");
    }
}
