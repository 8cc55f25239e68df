//! Emulated leases on data returned by reads.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use plughost_core::Secret;
use rand::RngCore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Lease duration when neither the backend nor the caller picks one.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// One issued lease.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseRecord {
    pub lease_id: String,
    /// Backend path the data was read from.
    pub path: String,
    pub data: Map<String, Value>,
    /// Secret the backend attached, echoed back on renew and revoke.
    pub secret: Option<Secret>,
    pub issue_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    pub duration: Duration,
    pub renewable: bool,
}

impl LeaseRecord {
    /// A renewable lease issued at `now` for `duration`.
    pub fn issue(
        lease_id: String,
        path: impl Into<String>,
        data: Map<String, Value>,
        secret: Option<Secret>,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            lease_id,
            path: path.into(),
            data,
            secret,
            issue_time: now,
            expire_time: expiry(now, duration),
            duration,
            renewable: true,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_time
    }
}

/// `now + duration`, saturating at the far end of the calendar.
pub fn expiry(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `<mount>/<path>/<24 hex chars>`.
pub fn generate_lease_id(mount: &str, path: &str) -> String {
    let mut suffix = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("{}/{}/{}", mount.trim_start_matches('/'), path, hex::encode(suffix))
}

/// A lease record behind its own lock.
pub type LeaseEntry = Arc<Mutex<LeaseRecord>>;

/// All live leases.
///
/// The map lock is only held for lookups and membership changes. Anything
/// that awaits holds the record's own mutex instead. When both are needed
/// the record is locked first.
#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: RwLock<HashMap<String, LeaseEntry>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: LeaseRecord) {
        let id = record.lease_id.clone();
        self.leases.write().insert(id, Arc::new(Mutex::new(record)));
    }

    pub fn get(&self, lease_id: &str) -> Option<LeaseEntry> {
        self.leases.read().get(lease_id).cloned()
    }

    /// Whether `entry` is still the record filed under `lease_id`.
    pub fn is_current(&self, lease_id: &str, entry: &LeaseEntry) -> bool {
        self.leases
            .read()
            .get(lease_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    /// Remove `lease_id` if it still maps to `entry`.
    pub fn remove_if_current(&self, lease_id: &str, entry: &LeaseEntry) -> bool {
        let mut leases = self.leases.write();
        match leases.get(lease_id) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                leases.remove(lease_id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, lease_id: &str) -> bool {
        self.leases.read().contains_key(lease_id)
    }

    pub fn len(&self) -> usize {
        self.leases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.read().is_empty()
    }
}
