//! Transaction registry
//!
//! Owns the transaction lifecycle: monotone ID allocation, the single
//! in-progress-transaction-per-connector rule, meter sample accumulation
//! and completion bookkeeping. It never touches the charge-point registry;
//! the dispatcher wires connector bindings.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::domain::{IdTagInfo, IdTagStatus, MeterSample, Transaction};
use crate::registry::authorization::AuthorizationRegistry;
use crate::registry::store::TransactionStore;
use crate::support::clock::SharedClock;
use crate::support::errors::{DomainError, DomainResult};

/// Result of a StartTransaction attempt.
///
/// `transaction_id` is `-1` when the tag was not accepted and no state
/// changed.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub transaction_id: i32,
    pub id_tag_info: IdTagInfo,
}

/// Result of a completed StopTransaction.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub charge_point_id: String,
    pub connector_id: u32,
    /// Tag that started the transaction
    pub id_tag: String,
    pub energy_used: i32,
    pub duration_seconds: i64,
    /// Verdict on the stopping tag, present when the request carried one
    pub id_tag_info: Option<IdTagInfo>,
}

/// Registry of active and historical transactions
pub struct TransactionRegistry {
    transactions: DashMap<i32, Transaction>,
    counter: AtomicI32,
    authorization: Arc<AuthorizationRegistry>,
    store: Arc<dyn TransactionStore>,
    clock: SharedClock,
}

impl TransactionRegistry {
    pub fn new(
        authorization: Arc<AuthorizationRegistry>,
        store: Arc<dyn TransactionStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            transactions: DashMap::new(),
            counter: AtomicI32::new(1),
            authorization,
            store,
            clock,
        }
    }

    pub fn shared(
        authorization: Arc<AuthorizationRegistry>,
        store: Arc<dyn TransactionStore>,
        clock: SharedClock,
    ) -> Arc<Self> {
        Arc::new(Self::new(authorization, store, clock))
    }

    /// Seed the ID counter from the store. Call once at startup.
    pub async fn restore(&self) {
        if let Some(next) = self.store.load_counter().await {
            self.counter.store(next, Ordering::SeqCst);
            info!(next, "Transaction counter restored from store");
        }
    }

    // ── Lifecycle ──────────────────────────────────────────

    /// Validate the tag and, if accepted, open a transaction.
    ///
    /// Tags that are not Accepted and tags or connectors already driving an
    /// in-progress transaction yield `transaction_id = -1` with the
    /// matching `idTagInfo`; nothing is created in either case.
    pub fn start(
        &self,
        station_id: &str,
        connector_id: u32,
        id_tag: &str,
        meter_start: i32,
        timestamp: Option<DateTime<Utc>>,
    ) -> DomainResult<StartOutcome> {
        let info = self.authorization.validate(id_tag);
        if !info.is_accepted() {
            return Ok(StartOutcome {
                transaction_id: -1,
                id_tag_info: info,
            });
        }

        let concurrent = self.get_active_by_connector(station_id, connector_id).is_some()
            || self
                .transactions
                .iter()
                .any(|tx| tx.is_in_progress() && tx.id_tag == id_tag);
        if concurrent {
            return Ok(StartOutcome {
                transaction_id: -1,
                id_tag_info: IdTagInfo::new(IdTagStatus::ConcurrentTx),
            });
        }

        // The counter wraps negative once the i32 space is spent; fail
        // closed rather than reuse IDs.
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        if id <= 0 {
            return Err(DomainError::TransactionIdExhausted);
        }

        let start_time = timestamp.unwrap_or_else(|| self.clock.now());
        let transaction = Transaction::new(id, station_id, connector_id, id_tag, meter_start, start_time);
        self.transactions.insert(id, transaction);

        info!(
            transaction_id = id,
            station_id, connector_id, id_tag, meter_start, "Transaction started"
        );

        Ok(StartOutcome {
            transaction_id: id,
            id_tag_info: info,
        })
    }

    /// Close a transaction. Unknown and already-completed IDs fail with
    /// `TransactionNotFound`; a non-Accepted stopping tag does not prevent
    /// the stop but is reflected in the outcome.
    pub async fn stop(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        timestamp: Option<DateTime<Utc>>,
        id_tag: Option<&str>,
        reason: Option<String>,
    ) -> DomainResult<StopOutcome> {
        let stop_time = timestamp.unwrap_or_else(|| self.clock.now());

        let completed = {
            let mut tx = self
                .transactions
                .get_mut(&transaction_id)
                .ok_or(DomainError::TransactionNotFound(transaction_id))?;
            if !tx.is_in_progress() {
                return Err(DomainError::TransactionNotFound(transaction_id));
            }

            if meter_stop < tx.meter_start {
                warn!(
                    transaction_id,
                    meter_start = tx.meter_start,
                    meter_stop,
                    "meterStop below meterStart, closing at face value"
                );
            }

            tx.stop(meter_stop, stop_time, reason);
            tx.clone()
        };

        let id_tag_info = id_tag.map(|tag| self.authorization.validate(tag));

        let energy_used = completed.energy_used().unwrap_or(0);
        info!(
            transaction_id,
            energy_used,
            reason = completed.stop_reason.as_deref().unwrap_or("-"),
            "Transaction stopped"
        );

        self.store.transaction_completed(&completed).await;

        Ok(StopOutcome {
            charge_point_id: completed.charge_point_id,
            connector_id: completed.connector_id,
            id_tag: completed.id_tag,
            energy_used,
            duration_seconds: completed
                .stop_time
                .map(|stop| stop.signed_duration_since(completed.start_time).num_seconds())
                .unwrap_or(0),
            id_tag_info,
        })
    }

    /// Append meter samples in arrival order. Returns `false` for unknown
    /// transactions.
    pub fn append_meter(&self, transaction_id: i32, samples: Vec<MeterSample>) -> bool {
        match self.transactions.get_mut(&transaction_id) {
            Some(mut tx) => {
                tx.samples.extend(samples);
                true
            }
            None => false,
        }
    }

    // ── Reads ──────────────────────────────────────────────

    /// The single in-progress transaction on a connector, if any.
    pub fn get_active_by_connector(&self, station_id: &str, connector_id: u32) -> Option<Transaction> {
        self.transactions
            .iter()
            .find(|tx| {
                tx.is_in_progress()
                    && tx.charge_point_id == station_id
                    && tx.connector_id == connector_id
            })
            .map(|tx| tx.clone())
    }

    pub fn get(&self, transaction_id: i32) -> Option<Transaction> {
        self.transactions.get(&transaction_id).map(|tx| tx.clone())
    }

    pub fn list(&self) -> Vec<Transaction> {
        self.transactions.iter().map(|tx| tx.clone()).collect()
    }

    pub fn by_station(&self, station_id: &str) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.charge_point_id == station_id)
            .map(|tx| tx.clone())
            .collect()
    }

    /// Whether any in-progress transaction remains on a station.
    pub fn has_in_progress(&self, station_id: &str) -> bool {
        self.transactions
            .iter()
            .any(|tx| tx.is_in_progress() && tx.charge_point_id == station_id)
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&self, next: i32) {
        self.counter.store(next, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::support::clock::Clock;
    use crate::domain::IdTag;
    use crate::registry::store::NullTransactionStore;
    use crate::support::clock::manual::ManualClock;

    fn registry() -> (TransactionRegistry, Arc<AuthorizationRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::fixed());
        let auth = AuthorizationRegistry::shared(false, clock.clone());
        auth.register(IdTag::new("valid123", IdTagStatus::Accepted));
        auth.register(IdTag::new("blocked789", IdTagStatus::Blocked));
        auth.register(IdTag::new("other456", IdTagStatus::Accepted));
        let registry =
            TransactionRegistry::new(auth.clone(), Arc::new(NullTransactionStore), clock.clone());
        (registry, auth, clock)
    }

    #[test]
    fn ids_are_positive_and_strictly_increasing() {
        let (registry, _, _) = registry();
        let first = registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        let second = registry.start("CP002", 1, "other456", 0, None).unwrap();
        assert_eq!(first.transaction_id, 1);
        assert_eq!(second.transaction_id, 2);
    }

    #[test]
    fn blocked_tag_starts_nothing() {
        let (registry, _, _) = registry();
        let outcome = registry.start("CP001", 1, "blocked789", 1000, None).unwrap();
        assert_eq!(outcome.transaction_id, -1);
        assert_eq!(outcome.id_tag_info.status, IdTagStatus::Blocked);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn second_start_on_connector_is_concurrent() {
        let (registry, _, _) = registry();
        registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        let outcome = registry.start("CP001", 1, "other456", 1000, None).unwrap();
        assert_eq!(outcome.transaction_id, -1);
        assert_eq!(outcome.id_tag_info.status, IdTagStatus::ConcurrentTx);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn same_tag_on_other_connector_is_concurrent() {
        let (registry, _, _) = registry();
        registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        let outcome = registry.start("CP001", 2, "valid123", 500, None).unwrap();
        assert_eq!(outcome.id_tag_info.status, IdTagStatus::ConcurrentTx);
    }

    #[tokio::test]
    async fn stop_derives_energy_and_duration() {
        let (registry, _, clock) = registry();
        let started = registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        clock.advance(Duration::seconds(600));

        let outcome = registry
            .stop(started.transaction_id, 1500, None, None, Some("Local".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome.energy_used, 500);
        assert_eq!(outcome.duration_seconds, 600);
        assert_eq!(outcome.connector_id, 1);
        assert_eq!(outcome.id_tag, "valid123");
        assert!(outcome.id_tag_info.is_none());

        let tx = registry.get(started.transaction_id).unwrap();
        assert!(!tx.is_in_progress());
        assert_eq!(tx.stop_reason.as_deref(), Some("Local"));
    }

    #[tokio::test]
    async fn stop_unknown_transaction_fails() {
        let (registry, _, _) = registry();
        let err = registry.stop(99, 0, None, None, None).await.unwrap_err();
        assert!(matches!(err, DomainError::TransactionNotFound(99)));
    }

    #[tokio::test]
    async fn stop_is_one_shot() {
        let (registry, _, _) = registry();
        let started = registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        registry.stop(started.transaction_id, 1200, None, None, None).await.unwrap();

        let err = registry
            .stop(started.transaction_id, 1300, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TransactionNotFound(_)));
        // The first stop's values stand.
        assert_eq!(registry.get(started.transaction_id).unwrap().meter_stop, Some(1200));
    }

    #[tokio::test]
    async fn meter_stop_below_start_still_closes() {
        let (registry, _, _) = registry();
        let started = registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        let outcome = registry.stop(started.transaction_id, 400, None, None, None).await.unwrap();
        assert_eq!(outcome.energy_used, -600);
        assert!(!registry.get(started.transaction_id).unwrap().is_in_progress());
    }

    #[tokio::test]
    async fn foreign_stop_tag_is_reported_but_does_not_block() {
        let (registry, _, _) = registry();
        let started = registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        let outcome = registry
            .stop(started.transaction_id, 1100, None, Some("blocked789"), None)
            .await
            .unwrap();
        assert_eq!(outcome.id_tag_info.unwrap().status, IdTagStatus::Blocked);
        assert!(!registry.get(started.transaction_id).unwrap().is_in_progress());
    }

    #[test]
    fn samples_keep_arrival_order() {
        let (registry, _, clock) = registry();
        let started = registry.start("CP001", 1, "valid123", 1000, None).unwrap();

        let sample = |v: f64| MeterSample {
            connector_id: 1,
            timestamp: clock.now(),
            value: v,
            measurand: "Energy.Active.Import.Register".to_string(),
            unit: Some("Wh".to_string()),
            context: None,
        };
        assert!(registry.append_meter(started.transaction_id, vec![sample(1100.0)]));
        assert!(registry.append_meter(started.transaction_id, vec![sample(1050.0), sample(1200.0)]));

        let values: Vec<f64> = registry
            .get(started.transaction_id)
            .unwrap()
            .samples
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![1100.0, 1050.0, 1200.0]);

        assert!(!registry.append_meter(777, vec![sample(1.0)]));
    }

    #[test]
    fn active_lookup_finds_only_in_progress() {
        let (registry, _, _) = registry();
        let started = registry.start("CP001", 1, "valid123", 1000, None).unwrap();
        assert_eq!(
            registry.get_active_by_connector("CP001", 1).unwrap().id,
            started.transaction_id
        );
        assert!(registry.get_active_by_connector("CP001", 2).is_none());
        assert!(registry.get_active_by_connector("CP002", 1).is_none());
        assert!(registry.has_in_progress("CP001"));
    }

    #[test]
    fn counter_exhaustion_fails_closed() {
        let (registry, _, _) = registry();
        registry.set_next_id(i32::MAX);
        let last = registry.start("CP001", 1, "valid123", 0, None).unwrap();
        assert_eq!(last.transaction_id, i32::MAX);

        let err = registry.start("CP001", 2, "other456", 0, None).unwrap_err();
        assert!(matches!(err, DomainError::TransactionIdExhausted));
    }
}
