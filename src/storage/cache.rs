//! Cache tier
//!
//! A size-bounded store built on [`CoverageIndex`]. After every insert whole
//! segments are evicted until the total size is back under the limit. Which
//! segment goes first is decided by an [`EvictionPolicy`]; the default,
//! [`LruLargestFirst`], evicts the least recently read segment and breaks
//! ties by evicting the larger one.
//!
//! With a maximum age set, segments written longer ago than that expire.
//! Expired segments are swept before every read and write.
//!
//! With promotion enabled, evicted and expired segments are handed to the
//! archive tier (clipped to its retention window) instead of being dropped.

use crate::clock::Clock;
use crate::index::{Coverage, CoverageIndex, IndexStats};
use crate::storage::archive::ArchiveTier;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::period::TimePeriod;
use crate::storage::segment::{format_bytes, Segment, TierRead};
use crate::storage::types::{DataBlock, GeoKey, Tier};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Decides which segment to evict first
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// `Ordering::Less` when `a` should be evicted before `b`
    fn compare(&self, a: &Segment, b: &Segment) -> Ordering;
}

/// Oldest `last_accessed` first, larger segment first on ties
#[derive(Debug, Clone, Copy, Default)]
pub struct LruLargestFirst;

impl EvictionPolicy for LruLargestFirst {
    fn name(&self) -> &'static str {
        "lru-largest-first"
    }

    fn compare(&self, a: &Segment, b: &Segment) -> Ordering {
        a.last_accessed
            .cmp(&b.last_accessed)
            .then_with(|| b.size_bytes.cmp(&a.size_bytes))
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.start_millis().cmp(&b.start_millis()))
    }
}

/// A segment removed by eviction
#[derive(Debug, Clone, PartialEq)]
pub struct Evicted {
    pub key: GeoKey,
    pub period: TimePeriod,
    pub size_bytes: u64,
    pub promoted: bool,
}

/// What a `put` did to the cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOutcome {
    /// Bytes added by the insert itself (zero when already covered)
    pub bytes_added: u64,
    pub evicted: Vec<Evicted>,
    /// Segments past the maximum age, swept before the insert
    pub expired: Vec<Evicted>,
    /// The segment holding the new data was itself evicted
    pub fresh_evicted: bool,
}

impl PutOutcome {
    pub fn bytes_evicted(&self) -> u64 {
        self.evicted.iter().map(|e| e.size_bytes).sum()
    }
}

/// Cache counters and current occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub index: IndexStats,
    pub limit_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub promotions: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} in {} segments ({} keys), {} hits, {} misses, {} evictions, {} expired, {} promotions",
            format_bytes(self.index.total_size),
            format_bytes(self.limit_bytes),
            self.index.segments,
            self.index.keys,
            self.hits,
            self.misses,
            self.evictions,
            self.expirations,
            self.promotions
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    promotions: AtomicU64,
}

#[derive(Debug)]
pub struct CacheTier {
    index: Mutex<CoverageIndex>,
    limit: u64,
    max_age: Option<Duration>,
    clock: Arc<dyn Clock>,
    policy: Box<dyn EvictionPolicy>,
    promote_to: Option<Arc<ArchiveTier>>,
    counters: Counters,
}

impl CacheTier {
    pub fn new(limit: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            index: Mutex::new(CoverageIndex::new()),
            limit,
            max_age: None,
            clock,
            policy: Box::new(LruLargestFirst),
            promote_to: None,
            counters: Counters::default(),
        }
    }

    /// Builder: push evicted segments to `archive`
    pub fn with_promotion(mut self, archive: Arc<ArchiveTier>) -> Self {
        self.promote_to = Some(archive);
        self
    }

    /// Builder: expire segments written more than `max_age` ago
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Builder: replace the eviction policy
    pub fn with_policy(mut self, policy: impl EvictionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, CoverageIndex>> {
        self.index
            .lock()
            .map_err(|e| StorageError::Lock(format!("Failed to lock cache index: {}", e)))
    }

    /// Store data for `key` over `period`, evicting until back under the limit
    ///
    /// A segment larger than the whole limit is rejected with
    /// `SegmentTooLarge` and leaves the cache untouched.
    pub fn put(
        &self,
        key: GeoKey,
        period: &TimePeriod,
        data: DataBlock,
        size_bytes: u64,
    ) -> StorageResult<PutOutcome> {
        if size_bytes > self.limit {
            return Err(StorageError::SegmentTooLarge {
                size: size_bytes,
                limit: self.limit,
            });
        }

        let now = self.clock.now();
        let segment = Segment::new(key, *period, Tier::Cache, size_bytes, data, now);
        let fresh_start = segment.start_millis();

        let (bytes_added, victims, expired, fresh_evicted) = {
            let mut index = self.lock()?;
            let expired = self.take_expired(&mut index, now);
            let bytes_added = index.insert(segment)?;
            let fresh = index
                .segment_containing(&key, fresh_start)
                .map(|start| (key, start));
            let victims = self.evict(&mut index, self.limit, fresh);
            let fresh_evicted =
                fresh.is_some() && index.segment_containing(&key, fresh_start).is_none();
            (bytes_added, victims, expired, fresh_evicted)
        };

        Ok(PutOutcome {
            bytes_added,
            evicted: self.retire_evicted(victims),
            expired: self.retire_expired(expired),
            fresh_evicted,
        })
    }

    /// Evict until at most `target_bytes` remain
    ///
    /// Victims are chosen by the eviction policy and promoted like any other
    /// eviction.
    pub fn shrink_to(&self, target_bytes: u64) -> StorageResult<Vec<Evicted>> {
        let victims = {
            let mut index = self.lock()?;
            self.evict(&mut index, target_bytes, None)
        };
        let evicted = self.retire_evicted(victims);
        info!(
            "Shrunk cache to {}, {} segments evicted",
            format_bytes(target_bytes),
            evicted.len()
        );
        Ok(evicted)
    }

    /// Evict at least `bytes` worth of segments
    ///
    /// Fails with `ClearExceedsLimit` when `bytes` is more than the cache can
    /// ever hold.
    pub fn shrink_by(&self, bytes: u64) -> StorageResult<Vec<Evicted>> {
        if bytes > self.limit {
            return Err(StorageError::ClearExceedsLimit {
                requested: bytes,
                limit: self.limit,
            });
        }
        let victims = {
            let mut index = self.lock()?;
            let target = index.total_size().saturating_sub(bytes);
            self.evict(&mut index, target, None)
        };
        let evicted = self.retire_evicted(victims);
        info!(
            "Cleared {} from cache, {} segments evicted",
            format_bytes(evicted.iter().map(|e| e.size_bytes).sum()),
            evicted.len()
        );
        Ok(evicted)
    }

    /// Sweep segments past the maximum age
    pub fn expire(&self) -> StorageResult<Vec<Evicted>> {
        let now = self.clock.now();
        let expired = {
            let mut index = self.lock()?;
            self.take_expired(&mut index, now)
        };
        Ok(self.retire_expired(expired))
    }

    /// Remove every segment older than the maximum age
    fn take_expired(&self, index: &mut CoverageIndex, now: DateTime<Utc>) -> Vec<Segment> {
        let Some(max_age) = self.max_age else {
            return Vec::new();
        };
        let stale: Vec<(GeoKey, i64)> = index
            .iter()
            .filter(|seg| seg.age(now) > max_age)
            .map(|seg| (seg.key, seg.start_millis()))
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for (key, start) in stale {
            if let Some(seg) = index.remove_segment(&key, start) {
                debug!("Expired {} {} written at {}", seg.key, seg.period, seg.stored_at);
                expired.push(seg);
            }
        }
        expired
    }

    fn retire_evicted(&self, victims: Vec<Segment>) -> Vec<Evicted> {
        self.counters
            .evictions
            .fetch_add(victims.len() as u64, AtomicOrdering::Relaxed);
        self.retire(victims)
    }

    fn retire_expired(&self, expired: Vec<Segment>) -> Vec<Evicted> {
        self.counters
            .expirations
            .fetch_add(expired.len() as u64, AtomicOrdering::Relaxed);
        self.retire(expired)
    }

    /// Promote removed segments outside the index lock
    fn retire(&self, segments: Vec<Segment>) -> Vec<Evicted> {
        segments
            .into_iter()
            .map(|seg| {
                let promoted = self.promote(&seg);
                Evicted {
                    key: seg.key,
                    period: seg.period,
                    size_bytes: seg.size_bytes,
                    promoted,
                }
            })
            .collect()
    }

    /// Remove whole segments until the index holds at most `target` bytes
    ///
    /// `fresh` (the segment just written) is only chosen when nothing else is
    /// left.
    fn evict(
        &self,
        index: &mut CoverageIndex,
        target: u64,
        fresh: Option<(GeoKey, i64)>,
    ) -> Vec<Segment> {
        let mut victims = Vec::new();
        while index.total_size() > target {
            let candidate = index
                .iter()
                .filter(|seg| Some((seg.key, seg.start_millis())) != fresh)
                .min_by(|a, b| self.policy.compare(a, b))
                .map(|seg| (seg.key, seg.start_millis()))
                .or(fresh);

            let Some((key, start)) = candidate else {
                break;
            };
            match index.remove_segment(&key, start) {
                Some(seg) => {
                    debug!(
                        "Evicted {} {} ({}) using {}",
                        seg.key,
                        seg.period,
                        format_bytes(seg.size_bytes),
                        self.policy.name()
                    );
                    victims.push(seg);
                }
                None => break,
            }
        }
        victims
    }

    /// Hand an evicted segment to the archive; true if anything was kept
    fn promote(&self, victim: &Segment) -> bool {
        let Some(archive) = &self.promote_to else {
            return false;
        };
        match archive.put_within_retention(
            victim.key,
            &victim.period,
            &victim.data,
            victim.size_bytes,
        ) {
            Ok(_) => {
                let kept = archive
                    .retention_now()
                    .overlaps(&victim.period);
                if kept {
                    self.counters.promotions.fetch_add(1, AtomicOrdering::Relaxed);
                } else {
                    debug!(
                        "Evicted {} {} lies outside archive retention, discarded",
                        victim.key, victim.period
                    );
                }
                kept
            }
            Err(e) => {
                warn!("Failed to promote {} {} to archive: {}", victim.key, victim.period, e);
                false
            }
        }
    }

    /// Stored data for `key` inside `period`, refreshing access times
    pub fn get(&self, key: &GeoKey, period: &TimePeriod) -> StorageResult<TierRead> {
        let now = self.clock.now();
        let period = period.anchored(now);
        let (pieces, expired) = {
            let mut index = self.lock()?;
            let expired = self.take_expired(&mut index, now);
            let pieces = index.segments_overlapping(key, &period);
            if !pieces.is_empty() {
                index.touch(key, &period, now);
            }
            (pieces, expired)
        };
        self.retire_expired(expired);
        let missing = period.difference_all(pieces.iter().map(|p| &p.period));

        if !pieces.is_empty() {
            self.counters.hits.fetch_add(1, AtomicOrdering::Relaxed);
        }
        if !missing.is_empty() {
            self.counters.misses.fetch_add(1, AtomicOrdering::Relaxed);
        }
        Ok(TierRead { pieces, missing })
    }

    /// Coverage without touching access times or hit counters
    pub fn coverage(&self, key: &GeoKey, period: &TimePeriod) -> StorageResult<Coverage> {
        let now = self.clock.now();
        let period = period.anchored(now);
        let (coverage, expired) = {
            let mut index = self.lock()?;
            let expired = self.take_expired(&mut index, now);
            (index.coverage_of(key, &period), expired)
        };
        self.retire_expired(expired);
        Ok(coverage)
    }

    /// Drop `period` for one key, returning the bytes freed
    pub fn remove(&self, key: &GeoKey, period: &TimePeriod) -> StorageResult<u64> {
        let period = period.anchored(self.clock.now());
        Ok(self.lock()?.remove(key, &period))
    }

    pub fn periods(&self, key: &GeoKey) -> StorageResult<Vec<TimePeriod>> {
        Ok(self.lock()?.periods(key))
    }

    pub fn total_size(&self) -> StorageResult<u64> {
        Ok(self.lock()?.total_size())
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn stats(&self) -> StorageResult<CacheStats> {
        Ok(CacheStats {
            index: self.lock()?.stats(),
            limit_bytes: self.limit,
            hits: self.counters.hits.load(AtomicOrdering::Relaxed),
            misses: self.counters.misses.load(AtomicOrdering::Relaxed),
            evictions: self.counters.evictions.load(AtomicOrdering::Relaxed),
            expirations: self.counters.expirations.load(AtomicOrdering::Relaxed),
            promotions: self.counters.promotions.load(AtomicOrdering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FactorId;
    use crate::clock::ManualClock;
    use crate::geo::GeoLocation;
    use chrono::{Duration, TimeZone, Utc};

    const MB: u64 = 1024 * 1024;

    fn key(factor: u32) -> GeoKey {
        GeoKey::new(GeoLocation::wgs84(5.18, 52.1).key(), FactorId(factor))
    }

    fn period(start: &str, end: &str) -> TimePeriod {
        TimePeriod::parse(start, end).unwrap()
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_put_evicts_least_recently_used() {
        let clock = clock();
        let cache = CacheTier::new(100 * MB, clock.clone());

        // 95MB spread over keys written at increasing times
        for (i, size) in [30 * MB, 25 * MB, 40 * MB].into_iter().enumerate() {
            cache
                .put(key(i as u32), &period("2022-01-01", "2022-02-01"), DataBlock::empty(), size)
                .unwrap();
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(cache.total_size().unwrap(), 95 * MB);

        // reading key 0 makes key 1 the least recently used
        cache.get(&key(0), &period("2022-01-10", "2022-01-11")).unwrap();
        clock.advance(Duration::minutes(1));

        let outcome = cache
            .put(key(9), &period("2022-01-01", "2022-02-01"), DataBlock::empty(), 10 * MB)
            .unwrap();

        assert_eq!(outcome.bytes_added, 10 * MB);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].key, key(1));
        assert!(!outcome.evicted[0].promoted);
        assert_eq!(cache.total_size().unwrap(), 80 * MB);
        assert_eq!(cache.stats().unwrap().evictions, 1);
    }

    #[test]
    fn test_segment_too_large_leaves_cache_unchanged() {
        let cache = CacheTier::new(100, clock());
        cache
            .put(key(1), &period("2022-01-01", "2022-01-02"), DataBlock::empty(), 60)
            .unwrap();

        let result = cache.put(key(2), &period("2022-01-01", "2022-01-02"), DataBlock::empty(), 101);
        assert!(matches!(
            result,
            Err(StorageError::SegmentTooLarge { size: 101, limit: 100 })
        ));
        assert_eq!(cache.total_size().unwrap(), 60);
    }

    #[test]
    fn test_ties_evict_larger_segment_first() {
        let cache = CacheTier::new(100, clock());
        let p = period("2022-01-01", "2022-01-02");
        cache.put(key(1), &p, DataBlock::empty(), 20).unwrap();
        cache.put(key(2), &p, DataBlock::empty(), 50).unwrap();
        cache.put(key(3), &p, DataBlock::empty(), 30).unwrap();

        // same clock reading for all: larger goes first, fresh one is protected
        let outcome = cache.put(key(4), &p, DataBlock::empty(), 40).unwrap();
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].key, key(2));
        assert_eq!(cache.total_size().unwrap(), 90);
    }

    #[test]
    fn test_budget_holds_after_many_puts() {
        let clock = clock();
        let cache = CacheTier::new(1_000, clock.clone());
        for i in 0..50u32 {
            let start = format!("2022-01-{:02}", (i % 28) + 1);
            let end = format!("2022-02-{:02}", (i % 28) + 1);
            cache
                .put(key(i % 7), &period(&start, &end), DataBlock::empty(), 50 + (i as u64 * 37) % 400)
                .unwrap();
            assert!(cache.total_size().unwrap() <= 1_000);
            clock.advance(Duration::seconds(90));
        }
    }

    #[test]
    fn test_get_touches_and_reports_missing() {
        let clock = clock();
        let cache = CacheTier::new(1_000, clock.clone());
        cache
            .put(key(1), &period("2022-01-01", "2022-03-01"), DataBlock::empty(), 100)
            .unwrap();

        let read = cache.get(&key(1), &period("2022-02-01", "2022-04-01")).unwrap();
        assert!(read.is_hit());
        assert!(read.covered()[0].same_span(&period("2022-02-01", "2022-03-01")));
        assert!(read.missing[0].same_span(&period("2022-03-01", "2022-04-01")));

        let miss = cache.get(&key(2), &period("2022-02-01", "2022-04-01")).unwrap();
        assert!(!miss.is_hit());

        let stats = cache.stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (1, 2));
    }

    #[test]
    fn test_eviction_promotes_to_archive() {
        let clock = clock();
        let archive = Arc::new(ArchiveTier::new(
            period("2022-01-01", "2023-01-01"),
            clock.clone(),
        ));
        let cache = CacheTier::new(100, clock.clone()).with_promotion(archive.clone());

        cache
            .put(key(1), &period("2021-12-02", "2022-01-31"), DataBlock::empty(), 60)
            .unwrap();
        clock.advance(Duration::minutes(5));
        let outcome = cache
            .put(key(2), &period("2022-05-01", "2022-05-02"), DataBlock::empty(), 60)
            .unwrap();

        assert_eq!(outcome.evicted.len(), 1);
        assert!(outcome.evicted[0].promoted);
        assert_eq!(cache.stats().unwrap().promotions, 1);

        // only the January part lies inside retention
        let archived = archive.periods(&key(1)).unwrap();
        assert!(archived[0].same_span(&period("2022-01-01", "2022-01-31")));
        assert_eq!(archive.total_size().unwrap(), 30);
    }

    #[test]
    fn test_remove_frees_space() {
        let cache = CacheTier::new(1_000, clock());
        cache
            .put(key(1), &period("2022-01-01", "2022-01-11"), DataBlock::empty(), 100)
            .unwrap();
        assert_eq!(cache.remove(&key(1), &period("2022-01-01", "2022-01-06")).unwrap(), 50);
        assert_eq!(cache.total_size().unwrap(), 50);
    }

    #[test]
    fn test_coalescing_past_limit_reports_dropped_write() {
        let cache = CacheTier::new(100, clock());
        cache
            .put(key(1), &period("2022-01-01", "2022-01-02"), DataBlock::empty(), 60)
            .unwrap();

        let outcome = cache
            .put(key(1), &period("2022-01-02", "2022-01-03"), DataBlock::empty(), 60)
            .unwrap();
        assert!(outcome.fresh_evicted);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.bytes_evicted(), 120);
        assert_eq!(cache.total_size().unwrap(), 0);

        let kept = cache
            .put(key(2), &period("2022-01-01", "2022-01-02"), DataBlock::empty(), 60)
            .unwrap();
        assert!(!kept.fresh_evicted);
    }

    #[test]
    fn test_segments_expire_after_max_age() {
        let clock = clock();
        let archive = Arc::new(ArchiveTier::new(
            period("2022-01-01", "2023-01-01"),
            clock.clone(),
        ));
        let cache = CacheTier::new(1_000, clock.clone())
            .with_max_age(Duration::hours(24))
            .with_promotion(archive.clone());

        cache
            .put(key(1), &period("2022-03-01", "2022-03-02"), DataBlock::empty(), 100)
            .unwrap();
        clock.advance(Duration::hours(12));
        cache
            .put(key(2), &period("2022-03-01", "2022-03-02"), DataBlock::empty(), 100)
            .unwrap();

        // reads do not extend the lifetime
        clock.advance(Duration::hours(12));
        assert!(cache.get(&key(1), &period("2022-03-01", "2022-03-02")).unwrap().is_hit());

        clock.advance(Duration::minutes(1));
        let read = cache.get(&key(1), &period("2022-03-01", "2022-03-02")).unwrap();
        assert!(!read.is_hit());
        assert_eq!(cache.total_size().unwrap(), 100);
        assert!(cache.coverage(&key(2), &period("2022-03-01", "2022-03-02")).unwrap().missing.is_empty());

        clock.advance(Duration::hours(12));
        let expired = cache.expire().unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key, key(2));
        assert!(expired[0].promoted);
        assert_eq!(cache.total_size().unwrap(), 0);

        let stats = cache.stats().unwrap();
        assert_eq!((stats.expirations, stats.evictions, stats.promotions), (2, 0, 2));
        assert_eq!(archive.periods(&key(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_expired_neighbour_does_not_age_new_data() {
        let clock = clock();
        let cache = CacheTier::new(1_000, clock.clone()).with_max_age(Duration::hours(1));
        cache
            .put(key(1), &period("2022-01-01", "2022-01-02"), DataBlock::empty(), 100)
            .unwrap();
        clock.advance(Duration::hours(2));

        let outcome = cache
            .put(key(1), &period("2022-01-02", "2022-01-03"), DataBlock::empty(), 100)
            .unwrap();
        assert_eq!(outcome.expired.len(), 1);
        let periods = cache.periods(&key(1)).unwrap();
        assert_eq!(periods.len(), 1);
        assert!(periods[0].same_span(&period("2022-01-02", "2022-01-03")));
    }

    #[test]
    fn test_shrink_by_evicts_least_recently_used_first() {
        let clock = clock();
        let cache = CacheTier::new(1_000, clock.clone());
        let p = period("2022-01-01", "2022-01-02");
        cache.put(key(1), &p, DataBlock::empty(), 100).unwrap();
        cache.put(key(2), &p, DataBlock::empty(), 300).unwrap();
        clock.advance(Duration::minutes(1));
        cache.put(key(3), &p, DataBlock::empty(), 200).unwrap();
        clock.advance(Duration::minutes(1));
        cache.get(&key(1), &p).unwrap();

        // key 2 is oldest and largest, then key 3
        let evicted = cache.shrink_by(350).unwrap();
        let keys: Vec<GeoKey> = evicted.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![key(2), key(3)]);
        assert_eq!(cache.total_size().unwrap(), 100);
        assert_eq!(cache.stats().unwrap().evictions, 2);

        assert!(cache.shrink_by(0).unwrap().is_empty());
        assert!(matches!(
            cache.shrink_by(1_001),
            Err(StorageError::ClearExceedsLimit { requested: 1_001, limit: 1_000 })
        ));
    }

    #[test]
    fn test_shrink_to_target() {
        let cache = CacheTier::new(1_000, clock());
        let p = period("2022-01-01", "2022-01-02");
        for (i, size) in [100, 200, 300].into_iter().enumerate() {
            cache.put(key(i as u32), &p, DataBlock::empty(), size).unwrap();
        }

        let evicted = cache.shrink_to(250).unwrap();
        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[0].key, key(2));
        assert_eq!(cache.total_size().unwrap(), 100);
        assert!(cache.shrink_to(0).unwrap().len() == 1);
        assert_eq!(cache.total_size().unwrap(), 0);
    }
}
