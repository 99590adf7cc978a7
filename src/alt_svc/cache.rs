//! Per-origin alternate service cache.
//!
//! # Responsibilities
//! - Hold at most one active record per origin (latest advertisement wins)
//! - Drop expired records lazily on lookup
//! - Remember alternates that failed so they are not retried (quarantine)
//!
//! # Design Decisions
//! - `DashMap` shards give per-origin locking without a global mutex
//! - No background sweeper; `purge_expired` only runs when the map is full
//! - A quarantine lasts until the failed record's own expiry
//! - Quarantines count against the same `max_origins` bound as records

use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::alt_svc::record::{AltServiceRecord, Origin};

/// A failed alternate that must not be selected again for a while.
#[derive(Debug, Clone)]
struct Quarantine {
    host: String,
    port: u16,
    until: Instant,
}

impl Quarantine {
    fn covers(&self, record: &AltServiceRecord) -> bool {
        self.port == record.port && self.host.eq_ignore_ascii_case(&record.host)
    }
}

/// Thread-safe store of active alternates keyed by origin.
#[derive(Debug)]
pub struct ServiceCache {
    records: DashMap<Origin, AltServiceRecord>,
    quarantined: DashMap<Origin, Quarantine>,
    max_origins: usize,
}

impl ServiceCache {
    /// Create an empty cache holding records for at most `max_origins` origins.
    pub fn new(max_origins: usize) -> Self {
        Self {
            records: DashMap::new(),
            quarantined: DashMap::new(),
            max_origins,
        }
    }

    /// Active record for `origin`, if any.
    pub fn lookup(&self, origin: &Origin) -> Option<AltServiceRecord> {
        self.lookup_at(origin, Instant::now())
    }

    /// [`lookup`](Self::lookup) evaluated at `now`.
    pub fn lookup_at(&self, origin: &Origin, now: Instant) -> Option<AltServiceRecord> {
        // clone out so the shard read lock is released before any removal
        let record = self.records.get(origin).map(|entry| entry.value().clone())?;
        if record.is_expired_at(now) {
            self.records.remove_if(origin, |_, current| current.is_expired_at(now));
            tracing::trace!(origin = %origin, alternate = %record.authority(), "Alt-Svc record expired");
            return None;
        }
        Some(record)
    }

    /// Replace the record for `origin`.
    ///
    /// Returns false only when `origin` is new and the cache is full of
    /// unexpired records.
    pub fn store(&self, origin: Origin, record: AltServiceRecord) -> bool {
        if !self.has_room_for(&origin) {
            return false;
        }
        self.records.insert(origin, record);
        true
    }

    /// Like [`store`](Self::store), but refuses a record that is quarantined
    /// for `origin` at `now`. The check and the insert happen under the
    /// origin's entry lock, so a concurrent [`quarantine`](Self::quarantine)
    /// either sees the stored record or prevents it.
    pub fn store_unless_quarantined(
        &self,
        origin: Origin,
        record: AltServiceRecord,
        now: Instant,
    ) -> bool {
        if !self.has_room_for(&origin) {
            return false;
        }
        match self.records.entry(origin) {
            Entry::Occupied(mut entry) => {
                if self.is_quarantined_at(entry.key(), &record, now) {
                    return false;
                }
                entry.insert(record);
            }
            Entry::Vacant(entry) => {
                if self.is_quarantined_at(entry.key(), &record, now) {
                    return false;
                }
                entry.insert(record);
            }
        }
        true
    }

    // must not be called while holding a `records` entry: len() and
    // purge_expired() lock every shard
    fn has_room_for(&self, origin: &Origin) -> bool {
        if self.records.contains_key(origin) || self.records.len() < self.max_origins {
            return true;
        }
        self.purge_expired();
        if self.records.len() < self.max_origins {
            return true;
        }
        tracing::debug!(
            origin = %origin,
            max_origins = self.max_origins,
            "Alt-Svc cache full, not storing record"
        );
        false
    }

    /// Remove the record for `origin`.
    pub fn invalidate(&self, origin: &Origin) -> Option<AltServiceRecord> {
        self.records.remove(origin).map(|(_, record)| record)
    }

    /// Remove the record for `origin` only if it still points at the same
    /// alternate as `record`.
    pub fn invalidate_record(&self, origin: &Origin, record: &AltServiceRecord) -> bool {
        self.records
            .remove_if(origin, |_, current| current.same_authority(record))
            .is_some()
    }

    /// Invalidate `record` and refuse to store the same alternate for `origin`
    /// until `record` would have expired.
    ///
    /// Quarantines share the `max_origins` bound; when full, expired ones are
    /// dropped first, then the one closest to expiry.
    pub fn quarantine(&self, origin: &Origin, record: &AltServiceRecord) {
        self.make_quarantine_room(origin);

        // hold the record entry so a concurrent store_unless_quarantined
        // serializes with this
        let entry = self.records.entry(origin.clone());
        self.quarantined.insert(
            origin.clone(),
            Quarantine {
                host: record.host.clone(),
                port: record.port,
                until: record.expires_at,
            },
        );
        if let Entry::Occupied(entry) = entry {
            if entry.get().same_authority(record) {
                entry.remove();
            }
        }
    }

    fn make_quarantine_room(&self, origin: &Origin) {
        if self.quarantined.contains_key(origin) || self.quarantined.len() < self.max_origins {
            return;
        }
        let now = Instant::now();
        self.quarantined.retain(|_, quarantine| now < quarantine.until);
        if self.quarantined.len() < self.max_origins {
            return;
        }
        let soonest = self
            .quarantined
            .iter()
            .min_by_key(|entry| entry.value().until)
            .map(|entry| entry.key().clone());
        if let Some(evicted) = soonest {
            self.quarantined.remove(&evicted);
            tracing::debug!(origin = %evicted, "Alt-Svc quarantine full, evicted oldest");
        }
    }

    /// Whether `record` is currently quarantined for `origin`.
    pub fn is_quarantined(&self, origin: &Origin, record: &AltServiceRecord) -> bool {
        self.is_quarantined_at(origin, record, Instant::now())
    }

    pub fn is_quarantined_at(&self, origin: &Origin, record: &AltServiceRecord, now: Instant) -> bool {
        let Some(quarantine) = self.quarantined.get(origin).map(|entry| entry.value().clone()) else {
            return false;
        };
        if now >= quarantine.until {
            self.quarantined.remove_if(origin, |_, current| now >= current.until);
            return false;
        }
        quarantine.covers(record)
    }

    /// Forget both the record and any quarantine for `origin` (`clear` directive).
    pub fn clear(&self, origin: &Origin) {
        self.records.remove(origin);
        self.quarantined.remove(origin);
    }

    /// Drop every expired record and quarantine.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, record| !record.is_expired_at(now));
        self.quarantined.retain(|_, quarantine| now < quarantine.until);
    }

    /// Number of origins with a stored record (expired ones included until read).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of origins with a quarantined alternate.
    pub fn quarantined_len(&self) -> usize {
        self.quarantined.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn origin(host: &str) -> Origin {
        Origin::new("https", host, 443)
    }

    fn record(host: &str, port: u16, ttl: Duration) -> AltServiceRecord {
        AltServiceRecord {
            protocol_id: "h2".to_string(),
            host: host.to_string(),
            port,
            expires_at: Instant::now() + ttl,
            persist: false,
        }
    }

    #[test]
    fn store_and_lookup() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        assert!(cache.lookup(&o).is_none());

        assert!(cache.store(o.clone(), record("example.com", 8443, Duration::from_secs(60))));
        assert_eq!(cache.lookup(&o).unwrap().port, 8443);

        // latest advertisement wins
        cache.store(o.clone(), record("example.com", 9443, Duration::from_secs(60)));
        assert_eq!(cache.lookup(&o).unwrap().port, 9443);
        assert_eq!(cache.len(), 1);

        assert!(cache.lookup(&origin("other.example.com")).is_none());
    }

    #[test]
    fn expired_records_are_purged_on_read() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        let r = record("example.com", 8443, Duration::from_secs(60));
        let expiry = r.expires_at;
        cache.store(o.clone(), r);

        assert!(cache.lookup_at(&o, expiry - Duration::from_secs(1)).is_some());
        assert!(cache.lookup_at(&o, expiry).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        cache.store(o.clone(), record("example.com", 8443, Duration::from_secs(60)));
        assert_eq!(cache.invalidate(&o).unwrap().port, 8443);
        assert!(cache.lookup(&o).is_none());
        assert!(cache.invalidate(&o).is_none());
    }

    #[test]
    fn invalidate_record_keeps_newer_alternate() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        let stale = record("example.com", 8443, Duration::from_secs(60));
        cache.store(o.clone(), record("example.com", 9443, Duration::from_secs(60)));

        assert!(!cache.invalidate_record(&o, &stale));
        assert_eq!(cache.lookup(&o).unwrap().port, 9443);
    }

    #[test]
    fn quarantine_blocks_same_alternate_until_expiry() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        let failed = record("example.com", 8443, Duration::from_secs(60));
        cache.store(o.clone(), failed.clone());

        cache.quarantine(&o, &failed);
        assert!(cache.lookup(&o).is_none());

        let readvertised = record("example.com", 8443, Duration::from_secs(3600));
        assert!(cache.is_quarantined(&o, &readvertised));
        assert!(!cache.is_quarantined(&o, &record("example.com", 9443, Duration::from_secs(60))));
        assert!(!cache.is_quarantined(&origin("other.example.com"), &readvertised));

        assert!(!cache.is_quarantined_at(&o, &readvertised, failed.expires_at));
    }

    #[test]
    fn clear_lifts_quarantine() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        let failed = record("example.com", 8443, Duration::from_secs(60));
        cache.quarantine(&o, &failed);
        cache.clear(&o);
        assert!(!cache.is_quarantined(&o, &failed));
    }

    #[test]
    fn store_unless_quarantined_refuses_failed_alternate() {
        let cache = ServiceCache::new(16);
        let o = origin("example.com");
        let failed = record("example.com", 8443, Duration::from_secs(60));
        cache.store(o.clone(), failed.clone());
        cache.quarantine(&o, &failed);

        let now = Instant::now();
        assert!(!cache.store_unless_quarantined(o.clone(), failed.clone(), now));
        assert!(cache.lookup(&o).is_none());

        let other = record("example.com", 9443, Duration::from_secs(60));
        assert!(cache.store_unless_quarantined(o.clone(), other, now));
        assert_eq!(cache.lookup(&o).unwrap().port, 9443);

        // a later quarantine of the stored alternate removes it again
        let stored = cache.lookup(&o).unwrap();
        cache.quarantine(&o, &stored);
        assert!(cache.lookup(&o).is_none());
        assert!(!cache.store_unless_quarantined(o, stored, now));
    }

    #[test]
    fn quarantines_share_max_origins_bound() {
        let cache = ServiceCache::new(1);
        let ttl = Duration::from_secs(60);
        for i in 0..1000 {
            let o = origin(&format!("host{i}.example"));
            let r = record(o.host(), 8443, ttl);
            assert!(cache.store(o.clone(), r.clone()));
            cache.quarantine(&o, &r);
        }
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.quarantined_len(), 1);
        // the most recent failure is the one kept
        let last = origin("host999.example");
        assert!(cache.is_quarantined(&last, &record(last.host(), 8443, ttl)));
    }

    #[test]
    fn concurrent_quarantine_never_leaves_failed_alternate() {
        let cache = Arc::new(ServiceCache::new(16));
        let o = origin("example.com");
        let failed = record("example.com", 8443, Duration::from_secs(60));

        let storer = {
            let cache = Arc::clone(&cache);
            let (o, failed) = (o.clone(), failed.clone());
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    cache.store_unless_quarantined(o.clone(), failed.clone(), Instant::now());
                }
            })
        };
        cache.quarantine(&o, &failed);
        storer.join().unwrap();

        assert!(cache.lookup(&o).is_none());
    }

    #[test]
    fn bounded_by_max_origins() {
        let cache = ServiceCache::new(2);
        let ttl = Duration::from_secs(60);
        assert!(cache.store(origin("a.example"), record("a.example", 1, ttl)));
        assert!(cache.store(origin("b.example"), record("b.example", 1, ttl)));
        assert!(!cache.store(origin("c.example"), record("c.example", 1, ttl)));
        // existing origins may still be refreshed
        assert!(cache.store(origin("a.example"), record("a.example", 2, ttl)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn full_cache_reclaims_expired_slots() {
        let cache = ServiceCache::new(1);
        cache.store(origin("a.example"), record("a.example", 1, Duration::ZERO));
        assert!(cache.store(origin("b.example"), record("b.example", 1, Duration::from_secs(60))));
        assert!(cache.lookup(&origin("a.example")).is_none());
    }

    #[test]
    fn concurrent_store_lookup_invalidate() {
        let cache = Arc::new(ServiceCache::new(1024));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500u16 {
                        let o = origin(&format!("host{}.example", i % 4));
                        let r = record(o.host(), 1000 + t, Duration::from_secs(60));
                        match i % 3 {
                            0 => {
                                cache.store(o, r);
                            }
                            1 => {
                                if let Some(found) = cache.lookup(&o) {
                                    assert_eq!(found.host, o.host());
                                }
                            }
                            _ => {
                                cache.invalidate(&o);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 4);
    }
}
