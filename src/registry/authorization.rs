//! Authorization registry
//!
//! Maps ID tags to their authorization status and tracks which tag is
//! actively authorized at which station.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::IdTagSeed;
use crate::domain::{IdTag, IdTagInfo, IdTagStatus};
use crate::support::clock::SharedClock;

/// Registry of ID tags and active authorization sessions
pub struct AuthorizationRegistry {
    tags: DashMap<String, IdTag>,
    /// (chargePointId, idTag) -> session start
    sessions: DashMap<(String, String), DateTime<Utc>>,
    /// Development profile: authorize unknown tags
    accept_unknown: bool,
    clock: SharedClock,
}

impl AuthorizationRegistry {
    pub fn new(accept_unknown: bool, clock: SharedClock) -> Self {
        Self {
            tags: DashMap::new(),
            sessions: DashMap::new(),
            accept_unknown,
            clock,
        }
    }

    pub fn shared(accept_unknown: bool, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self::new(accept_unknown, clock))
    }

    /// Insert or overwrite a tag.
    pub fn register(&self, tag: IdTag) {
        debug!(id_tag = tag.value.as_str(), status = %tag.status, "ID tag registered");
        self.tags.insert(tag.value.clone(), tag);
    }

    /// Load the configured seed set through the public `register` API.
    pub fn seed(&self, seeds: &[IdTagSeed]) {
        for seed in seeds {
            let status = IdTagStatus::from_str(&seed.status).unwrap_or(IdTagStatus::Invalid);
            let mut tag = IdTag::new(&seed.value, status);
            tag.expiry_date = seed.expiry_date;
            tag.parent_id_tag = seed.parent_id_tag.clone();
            self.register(tag);
        }
        if !seeds.is_empty() {
            info!(count = seeds.len(), "Seeded ID tags from configuration");
        }
    }

    /// Look up a tag and derive its current authorization verdict.
    ///
    /// An Accepted tag whose expiry lies in the past is reported Expired
    /// without mutating storage. Unknown tags are Invalid in the production
    /// profile and Accepted in the development profile.
    pub fn validate(&self, id_tag: &str) -> IdTagInfo {
        match self.tags.get(id_tag) {
            Some(tag) => {
                if let Some(expiry) = tag.expiry_date {
                    if expiry <= self.clock.now() {
                        return IdTagInfo {
                            status: IdTagStatus::Expired,
                            expiry_date: Some(expiry),
                            parent_id_tag: tag.parent_id_tag.clone(),
                        };
                    }
                }
                IdTagInfo {
                    status: tag.status,
                    expiry_date: tag.expiry_date,
                    parent_id_tag: tag.parent_id_tag.clone(),
                }
            }
            None if self.accept_unknown => IdTagInfo::accepted(),
            None => IdTagInfo::new(IdTagStatus::Invalid),
        }
    }

    /// Validate and, only on Accepted, record an authorization session.
    pub fn start_session(&self, charge_point_id: &str, id_tag: &str) -> IdTagInfo {
        let info = self.validate(id_tag);
        if info.is_accepted() {
            self.sessions.insert(
                (charge_point_id.to_string(), id_tag.to_string()),
                self.clock.now(),
            );
            debug!(charge_point_id, id_tag, "Authorization session started");
        }
        info
    }

    pub fn is_authorized(&self, charge_point_id: &str, id_tag: &str) -> bool {
        self.sessions
            .contains_key(&(charge_point_id.to_string(), id_tag.to_string()))
    }

    /// Idempotent.
    pub fn end_session(&self, charge_point_id: &str, id_tag: &str) {
        if self
            .sessions
            .remove(&(charge_point_id.to_string(), id_tag.to_string()))
            .is_some()
        {
            debug!(charge_point_id, id_tag, "Authorization session ended");
        }
    }
}
