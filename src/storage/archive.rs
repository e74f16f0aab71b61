//! Archive tier
//!
//! A period-bounded store: every segment must lie inside the retention
//! window. There is no implicit eviction; the archive only shrinks through
//! [`ArchiveTier::remove`] and [`ArchiveTier::clear_period`].
//!
//! The contents can be persisted to a single snapshot file and reopened.

use crate::clock::Clock;
use crate::index::{Coverage, CoverageIndex, IndexStats};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::period::TimePeriod;
use crate::storage::segment::{prorate, read_snapshot, write_snapshot, Segment, TierRead};
use crate::storage::types::{DataBlock, GeoKey, Tier};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ArchiveTier {
    index: Mutex<CoverageIndex>,
    retention: TimePeriod,
    clock: Arc<dyn Clock>,
}

impl ArchiveTier {
    pub fn new(retention: TimePeriod, clock: Arc<dyn Clock>) -> Self {
        Self {
            index: Mutex::new(CoverageIndex::new()),
            retention,
            clock,
        }
    }

    /// Open an archive from a snapshot file; a missing file gives an empty archive
    ///
    /// Segments that fell out of the retention window since the snapshot was
    /// written are clipped on load.
    pub fn open(path: &Path, retention: TimePeriod, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let archive = Self::new(retention, clock);
        if !path.exists() {
            info!("No archive snapshot at {:?}, starting empty", path);
            return Ok(archive);
        }

        let segments = read_snapshot(path)?;
        let loaded = segments.len();
        let window = archive.retention_now();
        let index = CoverageIndex::from_segments(
            segments.into_iter().filter_map(|seg| seg.clipped(&window)),
        )?;

        info!(
            "Loaded archive snapshot {:?}: {} segments ({} after retention)",
            path,
            loaded,
            index.segment_count()
        );
        *archive.lock()? = index;
        Ok(archive)
    }

    /// Write the archive contents to a snapshot file
    pub fn persist(&self, path: &Path) -> StorageResult<()> {
        let segments: Vec<Segment> = self.lock()?.iter().cloned().collect();
        write_snapshot(path, &segments)?;
        info!("Persisted {} archive segments to {:?}", segments.len(), path);
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, CoverageIndex>> {
        self.index
            .lock()
            .map_err(|e| StorageError::Lock(format!("Failed to lock archive index: {}", e)))
    }

    /// The retention window anchored at the current clock time
    pub fn retention_now(&self) -> TimePeriod {
        self.retention.anchored(self.clock.now())
    }

    pub fn retention(&self) -> &TimePeriod {
        &self.retention
    }

    /// Store data for `key` over `period`
    ///
    /// Fails with `OutOfRetentionWindow` unless `period` lies entirely inside
    /// the retention window.
    pub fn put(
        &self,
        key: GeoKey,
        period: &TimePeriod,
        data: DataBlock,
        size_bytes: u64,
    ) -> StorageResult<u64> {
        let now = self.clock.now();
        let period = period.anchored(now);
        let retention = self.retention.anchored(now);
        if !retention.contains_period(&period) {
            return Err(StorageError::OutOfRetentionWindow {
                period: period.to_string(),
                retention: retention.to_string(),
            });
        }

        let segment = Segment::new(key, period, Tier::Archive, size_bytes, data, now);
        let added = self.lock()?.insert(segment)?;
        debug!("Archived {} {} (+{} bytes)", key, period, added);
        Ok(added)
    }

    /// Store the part of `period` that lies inside retention, dropping the rest
    ///
    /// Returns the bytes added; zero when nothing falls inside retention.
    pub fn put_within_retention(
        &self,
        key: GeoKey,
        period: &TimePeriod,
        data: &DataBlock,
        size_bytes: u64,
    ) -> StorageResult<u64> {
        let now = self.clock.now();
        let period = period.anchored(now);
        let Some(kept) = period.overlap(&self.retention.anchored(now)) else {
            debug!("{} {} lies outside archive retention, not archived", key, period);
            return Ok(0);
        };

        let size = prorate(
            size_bytes,
            kept.end_millis() - kept.start_millis(),
            period.end_millis() - period.start_millis(),
        );
        let data = data.slice(kept.start_millis(), kept.end_millis());
        self.put(key, &kept, data, size)
    }

    /// Stored data for `key` inside `period`, touching what was read
    pub fn get(&self, key: &GeoKey, period: &TimePeriod) -> StorageResult<TierRead> {
        let now = self.clock.now();
        let period = period.anchored(now);
        let mut index = self.lock()?;
        let pieces = index.segments_overlapping(key, &period);
        if !pieces.is_empty() {
            index.touch(key, &period, now);
        }
        let missing = period.difference_all(pieces.iter().map(|p| &p.period));
        Ok(TierRead { pieces, missing })
    }

    /// Coverage without touching access times
    pub fn coverage(&self, key: &GeoKey, period: &TimePeriod) -> StorageResult<Coverage> {
        let period = period.anchored(self.clock.now());
        Ok(self.lock()?.coverage_of(key, &period))
    }

    /// Remove `period` for one key, returning the bytes freed
    pub fn remove(&self, key: &GeoKey, period: &TimePeriod) -> StorageResult<u64> {
        let period = period.anchored(self.clock.now());
        Ok(self.lock()?.remove(key, &period))
    }

    /// Remove `period` across all keys; returns the keys that lost data
    ///
    /// Fails with `OutOfRetentionWindow` unless `period` lies inside the
    /// retention window.
    pub fn clear_period(&self, period: &TimePeriod) -> StorageResult<Vec<GeoKey>> {
        let now = self.clock.now();
        let period = period.anchored(now);
        let retention = self.retention.anchored(now);
        if !retention.contains_period(&period) {
            return Err(StorageError::OutOfRetentionWindow {
                period: period.to_string(),
                retention: retention.to_string(),
            });
        }
        let affected = self.lock()?.remove_all(&period);
        info!("Cleared {} from archive, {} keys affected", period, affected.len());
        Ok(affected)
    }

    pub fn periods(&self, key: &GeoKey) -> StorageResult<Vec<TimePeriod>> {
        Ok(self.lock()?.periods(key))
    }

    pub fn total_size(&self) -> StorageResult<u64> {
        Ok(self.lock()?.total_size())
    }

    pub fn stats(&self) -> StorageResult<IndexStats> {
        Ok(self.lock()?.stats())
    }
}
