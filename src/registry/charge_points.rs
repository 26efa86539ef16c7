//! Charge point registry
//!
//! Authoritative live state of every station. Mutations are keyed by
//! station ID and serialized per station through the map's entry locking;
//! every mutation that commits emits exactly one delta event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::domain::{ChargePoint, ConnectorState, ConnectorStatus, MeterReading, MeterSnapshot};
use crate::events::{ConnectorUpdate, Event, PaymentUpdate, SharedEventBus, StationUpdate};
use crate::support::clock::SharedClock;

/// Who asked for a connector/transaction binding change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// The OCPP dispatcher, as part of Start/StopTransaction
    Dispatch,
    /// An external caller (operator API, payment flow)
    External,
}

/// Registry of live station state
pub struct ChargePointRegistry {
    stations: DashMap<String, ChargePoint>,
    event_bus: SharedEventBus,
    clock: SharedClock,
}

impl ChargePointRegistry {
    pub fn new(event_bus: SharedEventBus, clock: SharedClock) -> Self {
        Self {
            stations: DashMap::new(),
            event_bus,
            clock,
        }
    }

    pub fn shared(event_bus: SharedEventBus, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self::new(event_bus, clock))
    }

    // ── Mutations ──────────────────────────────────────────

    /// Upsert from BootNotification. Creates the station on first boot,
    /// merges identity fields over the last known values, marks it
    /// registered and stamps `registered_at`.
    pub fn handle_boot_notification(
        &self,
        station_id: &str,
        vendor: &str,
        model: &str,
        serial_number: Option<&str>,
        firmware_version: Option<&str>,
    ) {
        let now = self.clock.now();
        let mut cp = self
            .stations
            .entry(station_id.to_string())
            .or_insert_with(|| ChargePoint::new(station_id));

        cp.vendor = Some(vendor.to_string());
        cp.model = Some(model.to_string());
        if let Some(serial) = serial_number {
            cp.serial_number = Some(serial.to_string());
        }
        if let Some(firmware) = firmware_version {
            cp.firmware_version = Some(firmware.to_string());
        }
        cp.registered = true;
        cp.registered_at = Some(now);
        cp.last_heartbeat = Some(now);

        info!(station_id, vendor, model, "Charge point registered");
        self.event_bus.publish(self.station_event(&cp, now));
    }

    /// Record a Heartbeat. Stations that never booted are ignored.
    pub fn handle_heartbeat(&self, station_id: &str) {
        let now = self.clock.now();
        match self.stations.get_mut(station_id) {
            Some(mut cp) => {
                cp.last_heartbeat = Some(now);
                self.event_bus.publish(self.station_event(&cp, now));
            }
            None => warn!(station_id, "Heartbeat from unknown station"),
        }
    }

    /// Dispatch a StatusNotification by connector.
    ///
    /// Connector 0 is the whole station: only station-wide fields change.
    /// Connector >= 1 touches only that connector's state. Repeats with
    /// identical fields advance `status_updated_at` but are coalesced into
    /// no event.
    pub fn handle_status_notification(
        &self,
        station_id: &str,
        connector_id: u32,
        status: ConnectorStatus,
        error_code: &str,
        info: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let now = self.clock.now();
        let reported_at = timestamp.unwrap_or(now);

        let Some(mut cp) = self.stations.get_mut(station_id) else {
            warn!(station_id, "StatusNotification from unknown station");
            return;
        };

        if connector_id == 0 {
            let changed = cp.status != status
                || cp.error_code.as_deref() != Some(error_code)
                || cp.info.as_deref() != info;
            cp.status = status;
            cp.error_code = Some(error_code.to_string());
            cp.info = info.map(String::from);
            if changed {
                self.event_bus.publish(self.station_event(&cp, now));
            }
            return;
        }

        let state = cp.connector_mut(connector_id);
        if state.transaction_id.is_some() && !status.allows_active_transaction() {
            warn!(
                station_id,
                connector_id,
                %status,
                "Status incompatible with the in-flight transaction"
            );
        }

        let changed = state.status != status
            || state.error_code.as_deref() != Some(error_code)
            || state.info.as_deref() != info;
        state.status = status;
        state.error_code = Some(error_code.to_string());
        state.info = info.map(String::from);
        state.status_updated_at = Some(match state.status_updated_at {
            Some(prev) => prev.max(reported_at),
            None => reported_at,
        });

        if changed {
            let event = Self::connector_event(station_id, connector_id, state, now);
            self.event_bus.publish(event);
        }
    }

    /// Replace the primary energy snapshot if the new one is at least as
    /// recent as the stored one, and merge additional measurand readings.
    pub fn update_meter(
        &self,
        station_id: &str,
        connector_id: u32,
        snapshot: Option<MeterSnapshot>,
        additional: Vec<(String, MeterReading)>,
    ) {
        let now = self.clock.now();
        let Some(mut cp) = self.stations.get_mut(station_id) else {
            warn!(station_id, "MeterValues from unknown station");
            return;
        };

        let state = cp.connector_mut(connector_id);
        if let Some(snapshot) = snapshot {
            let newer = state
                .meter
                .as_ref()
                .map_or(true, |stored| snapshot.timestamp >= stored.timestamp);
            if newer {
                state.meter = Some(snapshot);
            }
        }
        for (measurand, reading) in additional {
            state.readings.insert(measurand, reading);
        }

        let event = Self::connector_event(station_id, connector_id, state, now);
        self.event_bus.publish(event);
    }

    /// Set the station-wide status.
    pub fn set_status(&self, station_id: &str, status: ConnectorStatus) {
        let now = self.clock.now();
        match self.stations.get_mut(station_id) {
            Some(mut cp) => {
                cp.status = status;
                self.event_bus.publish(self.station_event(&cp, now));
            }
            None => warn!(station_id, "set_status on unknown station"),
        }
    }

    /// Set one connector's status outside of a StatusNotification.
    pub fn set_connector_status(&self, station_id: &str, connector_id: u32, status: ConnectorStatus) {
        let now = self.clock.now();
        match self.stations.get_mut(station_id) {
            Some(mut cp) => {
                let state = cp.connector_mut(connector_id);
                state.status = status;
                state.status_updated_at = Some(now);
                let event = Self::connector_event(station_id, connector_id, state, now);
                self.event_bus.publish(event);
            }
            None => warn!(station_id, "set_connector_status on unknown station"),
        }
    }

    /// Bind or clear the in-flight transaction of a connector.
    pub fn set_connector_txn_binding(
        &self,
        station_id: &str,
        connector_id: u32,
        transaction_id: Option<i32>,
        source: BindingSource,
    ) {
        let now = self.clock.now();
        match self.stations.get_mut(station_id) {
            Some(mut cp) => {
                let state = cp.connector_mut(connector_id);
                state.transaction_id = transaction_id;
                let event = match source {
                    BindingSource::Dispatch => {
                        Self::connector_event(station_id, connector_id, state, now)
                    }
                    BindingSource::External => Event::PaymentUpdate(PaymentUpdate {
                        charge_point_id: station_id.to_string(),
                        connector_id: Some(connector_id),
                        transaction_id,
                        id_tag: None,
                        status: if transaction_id.is_some() { "Bound" } else { "Released" }.to_string(),
                        timestamp: now,
                    }),
                };
                self.event_bus.publish(event);
            }
            None => warn!(station_id, "binding change on unknown station"),
        }
    }

    /// Track the live-connection flag. Stations that never booted have no
    /// entry yet and are skipped; BootNotification will create them.
    pub fn mark_connected(&self, station_id: &str, connected: bool) {
        let now = self.clock.now();
        if let Some(mut cp) = self.stations.get_mut(station_id) {
            cp.connected = connected;
            self.event_bus.publish(self.station_event(&cp, now));
        }
    }

    // ── Reads ──────────────────────────────────────────────

    /// Stable snapshot of one station.
    pub fn get(&self, station_id: &str) -> Option<ChargePoint> {
        self.stations.get(station_id).map(|cp| cp.clone())
    }

    /// Stable snapshot of all stations.
    pub fn list(&self) -> Vec<ChargePoint> {
        self.stations.iter().map(|cp| cp.clone()).collect()
    }

    pub fn is_registered(&self, station_id: &str) -> bool {
        self.stations
            .get(station_id)
            .map_or(false, |cp| cp.registered)
    }

    pub fn count(&self) -> usize {
        self.stations.len()
    }

    // ── Event construction ─────────────────────────────────

    fn station_event(&self, cp: &ChargePoint, now: DateTime<Utc>) -> Event {
        Event::StationUpdate(StationUpdate {
            charge_point_id: cp.id.clone(),
            status: cp.status.to_string(),
            error_code: cp.error_code.clone(),
            registered: cp.registered,
            connected: cp.connected,
            last_heartbeat: cp.last_heartbeat,
            timestamp: now,
        })
    }

    fn connector_event(
        station_id: &str,
        connector_id: u32,
        state: &ConnectorState,
        now: DateTime<Utc>,
    ) -> Event {
        Event::ConnectorUpdate(ConnectorUpdate {
            charge_point_id: station_id.to_string(),
            connector_id,
            status: state.status.to_string(),
            error_code: state.error_code.clone(),
            transaction_id: state.transaction_id,
            meter_value: state.meter.as_ref().map(|m| m.value),
            meter_unit: state.meter.as_ref().map(|m| m.unit.clone()),
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::support::clock::Clock;
    use crate::events::EventBus;
    use crate::support::clock::manual::ManualClock;

    fn registry() -> (ChargePointRegistry, SharedEventBus, Arc<ManualClock>) {
        let bus = Arc::new(EventBus::new());
        let clock = Arc::new(ManualClock::fixed());
        (
            ChargePointRegistry::new(bus.clone(), clock.clone()),
            bus,
            clock,
        )
    }

    fn boot(registry: &ChargePointRegistry, station_id: &str) {
        registry.handle_boot_notification(station_id, "VendorX", "ModelY", Some("SN-1"), Some("1.0"));
    }

    #[test]
    fn boot_creates_and_registers() {
        let (registry, _, clock) = registry();
        boot(&registry, "CP001");

        let cp = registry.get("CP001").unwrap();
        assert!(cp.registered);
        assert_eq!(cp.vendor.as_deref(), Some("VendorX"));
        assert_eq!(cp.model.as_deref(), Some("ModelY"));
        assert_eq!(cp.registered_at, Some(clock.now()));
        assert!(registry.is_registered("CP001"));
    }

    #[test]
    fn boot_merges_over_last() {
        let (registry, _, _) = registry();
        boot(&registry, "CP001");
        // Second boot without serial/firmware keeps the previous values.
        registry.handle_boot_notification("CP001", "VendorX", "ModelZ", None, None);

        let cp = registry.get("CP001").unwrap();
        assert_eq!(cp.model.as_deref(), Some("ModelZ"));
        assert_eq!(cp.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(cp.firmware_version.as_deref(), Some("1.0"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn heartbeat_advances_timestamp() {
        let (registry, _, clock) = registry();
        boot(&registry, "CP001");
        clock.advance(Duration::seconds(30));
        registry.handle_heartbeat("CP001");

        let cp = registry.get("CP001").unwrap();
        assert_eq!(cp.last_heartbeat, Some(clock.now()));
    }

    #[test]
    fn heartbeat_on_unknown_station_creates_nothing() {
        let (registry, _, _) = registry();
        registry.handle_heartbeat("ghost");
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn connector_zero_touches_only_station_fields() {
        let (registry, _, _) = registry();
        boot(&registry, "CP001");
        registry.handle_status_notification(
            "CP001",
            0,
            ConnectorStatus::Unavailable,
            "NoError",
            Some("maintenance"),
            None,
        );

        let cp = registry.get("CP001").unwrap();
        assert_eq!(cp.status, ConnectorStatus::Unavailable);
        assert_eq!(cp.info.as_deref(), Some("maintenance"));
        assert!(cp.connectors.is_empty());
    }

    #[test]
    fn connector_status_leaves_station_status_alone() {
        let (registry, _, _) = registry();
        boot(&registry, "CP001");
        registry.handle_status_notification("CP001", 0, ConnectorStatus::Available, "NoError", None, None);
        registry.handle_status_notification("CP001", 1, ConnectorStatus::Charging, "NoError", None, None);

        let cp = registry.get("CP001").unwrap();
        assert_eq!(cp.status, ConnectorStatus::Available);
        assert_eq!(cp.connector(1).unwrap().status, ConnectorStatus::Charging);
    }

    #[tokio::test]
    async fn duplicate_status_coalesces_events_but_keeps_newest_timestamp() {
        let (registry, bus, clock) = registry();
        boot(&registry, "CP001");

        let first = clock.now();
        let second = first + Duration::minutes(1);
        registry.handle_status_notification(
            "CP001", 1, ConnectorStatus::Available, "NoError", None, Some(first),
        );

        let mut subscriber = bus.subscribe();
        registry.handle_status_notification(
            "CP001", 1, ConnectorStatus::Available, "NoError", None, Some(second),
        );

        // statusUpdatedAt moved to the newer timestamp...
        let cp = registry.get("CP001").unwrap();
        assert_eq!(cp.connector(1).unwrap().status_updated_at, Some(second));

        // ...but no second connector_update was emitted.
        let got = tokio::time::timeout(std::time::Duration::from_millis(50), subscriber.recv()).await;
        assert!(got.is_err(), "duplicate status must not re-emit");
    }

    #[tokio::test]
    async fn status_change_emits_connector_update() {
        let (registry, bus, _) = registry();
        boot(&registry, "CP001");
        let mut subscriber = bus.subscribe();

        registry.handle_status_notification("CP001", 1, ConnectorStatus::Preparing, "NoError", None, None);

        let msg = subscriber.recv().await.unwrap();
        match msg.event {
            Event::ConnectorUpdate(e) => {
                assert_eq!(e.charge_point_id, "CP001");
                assert_eq!(e.connector_id, 1);
                assert_eq!(e.status, "Preparing");
            }
            other => panic!("expected connector_update, got {:?}", other),
        }
    }

    #[test]
    fn meter_snapshot_is_timestamp_monotone() {
        let (registry, _, clock) = registry();
        boot(&registry, "CP001");

        let newer = MeterSnapshot {
            value: 1500.0,
            unit: "Wh".to_string(),
            timestamp: clock.now(),
        };
        let older = MeterSnapshot {
            value: 1200.0,
            unit: "Wh".to_string(),
            timestamp: clock.now() - Duration::minutes(5),
        };

        registry.update_meter("CP001", 1, Some(newer.clone()), Vec::new());
        registry.update_meter("CP001", 1, Some(older), Vec::new());

        let cp = registry.get("CP001").unwrap();
        assert_eq!(cp.connector(1).unwrap().meter, Some(newer));
    }

    #[test]
    fn additional_readings_merge_without_replacing_energy() {
        let (registry, _, clock) = registry();
        boot(&registry, "CP001");

        let snapshot = MeterSnapshot {
            value: 1000.0,
            unit: "Wh".to_string(),
            timestamp: clock.now(),
        };
        registry.update_meter("CP001", 1, Some(snapshot.clone()), Vec::new());
        registry.update_meter(
            "CP001",
            1,
            None,
            vec![(
                "Power.Active.Import".to_string(),
                MeterReading {
                    value: 7200.0,
                    unit: Some("W".to_string()),
                    timestamp: clock.now(),
                },
            )],
        );

        let cp = registry.get("CP001").unwrap();
        let state = cp.connector(1).unwrap();
        assert_eq!(state.meter, Some(snapshot));
        assert_eq!(state.readings["Power.Active.Import"].value, 7200.0);
    }

    #[tokio::test]
    async fn external_binding_emits_payment_update() {
        let (registry, bus, _) = registry();
        boot(&registry, "CP001");
        let mut subscriber = bus.subscribe();

        registry.set_connector_txn_binding("CP001", 1, Some(42), BindingSource::External);

        let msg = subscriber.recv().await.unwrap();
        match msg.event {
            Event::PaymentUpdate(e) => {
                assert_eq!(e.transaction_id, Some(42));
                assert_eq!(e.status, "Bound");
            }
            other => panic!("expected payment_update, got {:?}", other),
        }
        assert_eq!(registry.get("CP001").unwrap().connector(1).unwrap().transaction_id, Some(42));
    }

    #[test]
    fn snapshots_are_stable_copies() {
        let (registry, _, _) = registry();
        boot(&registry, "CP001");
        let snapshot = registry.get("CP001").unwrap();

        registry.set_status("CP001", ConnectorStatus::Faulted);
        // The earlier snapshot is unaffected by later mutations.
        assert_eq!(snapshot.status, ConnectorStatus::Unavailable);
        assert_eq!(registry.get("CP001").unwrap().status, ConnectorStatus::Faulted);
    }
}
