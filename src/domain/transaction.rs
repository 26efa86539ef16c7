//! Transaction domain entity

use chrono::{DateTime, Utc};

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    InProgress,
    Completed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => f.write_str("InProgress"),
            Self::Completed => f.write_str("Completed"),
        }
    }
}

/// One meter reading attached to a transaction, preserved in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    pub connector_id: u32,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub measurand: String,
    pub unit: Option<String>,
    pub context: Option<String>,
}

/// Charging transaction
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Central-System-assigned ID, positive and strictly increasing
    pub id: i32,
    pub charge_point_id: String,
    pub connector_id: u32,
    /// ID tag that started the transaction
    pub id_tag: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// Meter value at stop (Wh)
    pub meter_stop: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
    pub stop_reason: Option<String>,
    pub status: TransactionStatus,
    /// Meter samples in arrival order
    pub samples: Vec<MeterSample>,
}

impl Transaction {
    pub fn new(
        id: i32,
        charge_point_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i32,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            charge_point_id: charge_point_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            meter_start,
            meter_stop: None,
            start_time,
            stop_time: None,
            stop_reason: None,
            status: TransactionStatus::InProgress,
            samples: Vec::new(),
        }
    }

    pub fn stop(&mut self, meter_stop: i32, stop_time: DateTime<Utc>, reason: Option<String>) {
        self.meter_stop = Some(meter_stop);
        self.stop_time = Some(stop_time);
        self.stop_reason = reason;
        self.status = TransactionStatus::Completed;
    }

    /// Energy delivered in Wh, `meterStop - meterStart`.
    pub fn energy_used(&self) -> Option<i32> {
        self.meter_stop.map(|stop| stop - self.meter_start)
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.stop_time
            .map(|stop| stop.signed_duration_since(self.start_time).num_seconds())
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == TransactionStatus::InProgress
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn sample_tx() -> Transaction {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Transaction::new(1, "CP001", 1, "TAG-001", 1000, start)
    }

    #[test]
    fn new_transaction_is_in_progress() {
        let tx = sample_tx();
        assert!(tx.is_in_progress());
        assert_eq!(tx.status, TransactionStatus::InProgress);
        assert_eq!(tx.meter_start, 1000);
        assert!(tx.meter_stop.is_none());
        assert!(tx.stop_time.is_none());
        assert!(tx.samples.is_empty());
    }

    #[test]
    fn stop_sets_completed() {
        let mut tx = sample_tx();
        let stop = tx.start_time + Duration::minutes(30);
        tx.stop(5000, stop, Some("Local".into()));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.meter_stop, Some(5000));
        assert_eq!(tx.stop_reason.as_deref(), Some("Local"));
        assert!(!tx.is_in_progress());
    }

    #[test]
    fn energy_used_after_stop() {
        let mut tx = sample_tx();
        tx.stop(1500, tx.start_time + Duration::minutes(10), None);
        assert_eq!(tx.energy_used(), Some(500));
    }

    #[test]
    fn energy_used_none_while_in_progress() {
        let tx = sample_tx();
        assert_eq!(tx.energy_used(), None);
        assert_eq!(tx.duration_seconds(), None);
    }

    #[test]
    fn duration_from_stop_time() {
        let mut tx = sample_tx();
        tx.stop(2000, tx.start_time + Duration::seconds(754), None);
        assert_eq!(tx.duration_seconds(), Some(754));
    }
}
