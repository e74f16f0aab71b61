//! Coverage index - per-GeoKey ordered, non-overlapping segments
//!
//! Maps GeoKey → (start_ms → Segment). For one key the stored periods are
//! pairwise disjoint and never adjacent: every insert coalesces the incoming
//! range with the segments it overlaps or touches.
//!
//! # Size accounting
//! ```text
//! stored:    [====A 60B====)      [===B 40B===)
//! incoming:          [=======C 100B=========)
//! retained:               [==C' (uncovered part only)
//! merged:    [====A + C' + B  (60 + share(C') + 40)====)
//! ```
//! Data already stored wins on overlap. The incoming size is pro-rated by
//! the duration it actually contributes, so re-inserting a covered period
//! adds nothing.

use super::IndexStats;
use crate::storage::error::StorageResult;
use crate::storage::period::TimePeriod;
use crate::storage::segment::{prorate, Segment};
use crate::storage::types::{DataBlock, GeoKey};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Result of a coverage query, both lists ordered by start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    pub covered: Vec<TimePeriod>,
    pub missing: Vec<TimePeriod>,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.covered.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CoverageIndex {
    segments: BTreeMap<GeoKey, BTreeMap<i64, Segment>>,
    total_size: u64,
}

impl CoverageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from stored segments
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> StorageResult<Self> {
        let mut index = Self::new();
        for segment in segments {
            index.insert(segment)?;
        }
        Ok(index)
    }

    /// Starts of the segments of `key` intersecting `[start, end)`, ascending
    fn overlapping_starts(&self, key: &GeoKey, start: i64, end: i64) -> Vec<i64> {
        let Some(by_start) = self.segments.get(key) else {
            return Vec::new();
        };
        let mut starts: Vec<i64> = by_start
            .range(..end)
            .rev()
            .take_while(|(_, seg)| seg.end_millis() > start)
            .map(|(s, _)| *s)
            .collect();
        starts.reverse();
        starts
    }

    /// Like `overlapping_starts` but also picks up segments ending at `start`
    /// or beginning at `end`
    fn touching_starts(&self, key: &GeoKey, start: i64, end: i64) -> Vec<i64> {
        let Some(by_start) = self.segments.get(key) else {
            return Vec::new();
        };
        let mut starts: Vec<i64> = by_start
            .range(..=end)
            .rev()
            .take_while(|(_, seg)| seg.end_millis() >= start)
            .map(|(s, _)| *s)
            .collect();
        starts.reverse();
        starts
    }

    /// Insert a segment, coalescing with what is stored for its key
    ///
    /// Returns the number of bytes added to the total size.
    pub fn insert(&mut self, mut incoming: Segment) -> StorageResult<u64> {
        let key = incoming.key;
        let (start, end) = (incoming.start_millis(), incoming.end_millis());
        incoming.data = incoming.data.slice(start, end);
        let neighbours = self.touching_starts(&key, start, end);

        if neighbours.is_empty() {
            let added = incoming.size_bytes;
            self.segments.entry(key).or_default().insert(start, incoming);
            self.total_size += added;
            return Ok(added);
        }

        let by_start = self.segments.entry(key).or_default();
        let existing: Vec<Segment> = neighbours
            .iter()
            .filter_map(|s| by_start.remove(s))
            .collect();

        // Only the parts nobody covers yet are kept from the incoming segment
        let uncovered = incoming
            .period
            .difference_all(existing.iter().map(|seg| &seg.period));
        let retained_ms: i64 = uncovered
            .iter()
            .map(|p| p.end_millis() - p.start_millis())
            .sum();
        let added = prorate(incoming.size_bytes, retained_ms, end - start);

        let mut merged_period = incoming.period;
        let mut merged_size = added;
        let mut merged_data = DataBlock::empty();
        let mut last_accessed = incoming.last_accessed;
        let mut stored_at = incoming.stored_at;
        for seg in existing {
            merged_period = merged_period.union(&seg.period)?;
            merged_size += seg.size_bytes;
            last_accessed = last_accessed.max(seg.last_accessed);
            stored_at = stored_at.min(seg.stored_at);
            merged_data.merge(seg.data.slice(seg.start_millis(), seg.end_millis()));
        }
        for piece in &uncovered {
            merged_data.merge(incoming.data.slice(piece.start_millis(), piece.end_millis()));
        }

        let merged = Segment {
            key,
            period: merged_period,
            tier: incoming.tier,
            size_bytes: merged_size,
            last_accessed,
            stored_at,
            data: merged_data,
        };
        by_start.insert(merged.start_millis(), merged);
        self.total_size += added;
        Ok(added)
    }

    /// Covered and missing parts of `requested` for `key`
    pub fn coverage_of(&self, key: &GeoKey, requested: &TimePeriod) -> Coverage {
        let covered: Vec<TimePeriod> = self
            .overlapping_starts(key, requested.start_millis(), requested.end_millis())
            .iter()
            .filter_map(|s| self.segments.get(key).and_then(|m| m.get(s)))
            .filter_map(|seg| requested.overlap(&seg.period))
            .collect();
        let missing = requested.difference_all(&covered);
        Coverage { covered, missing }
    }

    /// Stored segments of `key` clipped to `period`, ascending
    pub fn segments_overlapping(&self, key: &GeoKey, period: &TimePeriod) -> Vec<Segment> {
        let Some(by_start) = self.segments.get(key) else {
            return Vec::new();
        };
        self.overlapping_starts(key, period.start_millis(), period.end_millis())
            .iter()
            .filter_map(|s| by_start.get(s))
            .filter_map(|seg| seg.clipped(period))
            .collect()
    }

    /// Mark every segment of `key` intersecting `period` as read at `now`
    pub fn touch(&mut self, key: &GeoKey, period: &TimePeriod, now: DateTime<Utc>) -> usize {
        let starts = self.overlapping_starts(key, period.start_millis(), period.end_millis());
        let Some(by_start) = self.segments.get_mut(key) else {
            return 0;
        };
        for start in &starts {
            if let Some(seg) = by_start.get_mut(start) {
                seg.touch(now);
            }
        }
        starts.len()
    }

    /// Truncate or split the segments of `key` intersecting `period`
    ///
    /// Remainders keep a duration-proportional share of the size. Returns
    /// the number of bytes freed.
    pub fn remove(&mut self, key: &GeoKey, period: &TimePeriod) -> u64 {
        let starts = self.overlapping_starts(key, period.start_millis(), period.end_millis());
        if starts.is_empty() {
            return 0;
        }
        let Some(by_start) = self.segments.get_mut(key) else {
            return 0;
        };

        let mut freed = 0;
        for start in starts {
            let Some(seg) = by_start.remove(&start) else {
                continue;
            };
            let whole = seg.duration_millis();
            let mut kept = 0;
            for piece in seg.period.difference(period) {
                let (s, e) = (piece.start_millis(), piece.end_millis());
                let size = prorate(seg.size_bytes, e - s, whole);
                kept += size;
                by_start.insert(
                    s,
                    Segment {
                        key: seg.key,
                        period: piece,
                        tier: seg.tier,
                        size_bytes: size,
                        last_accessed: seg.last_accessed,
                        stored_at: seg.stored_at,
                        data: seg.data.slice(s, e),
                    },
                );
            }
            freed += seg.size_bytes - kept;
        }

        if by_start.is_empty() {
            self.segments.remove(key);
        }
        self.total_size -= freed;
        freed
    }

    /// Remove `period` from every key, returning the keys that held data there
    pub fn remove_all(&mut self, period: &TimePeriod) -> Vec<GeoKey> {
        let affected: Vec<GeoKey> = self
            .segments
            .keys()
            .filter(|key| {
                !self
                    .overlapping_starts(key, period.start_millis(), period.end_millis())
                    .is_empty()
            })
            .copied()
            .collect();
        for key in &affected {
            self.remove(key, period);
        }
        affected
    }

    /// Remove one whole segment
    pub fn remove_segment(&mut self, key: &GeoKey, start_millis: i64) -> Option<Segment> {
        let by_start = self.segments.get_mut(key)?;
        let seg = by_start.remove(&start_millis)?;
        if by_start.is_empty() {
            self.segments.remove(key);
        }
        self.total_size -= seg.size_bytes;
        Some(seg)
    }

    /// Start of the segment of `key` containing `instant_millis`
    pub fn segment_containing(&self, key: &GeoKey, instant_millis: i64) -> Option<i64> {
        let (start, seg) = self
            .segments
            .get(key)?
            .range(..=instant_millis)
            .next_back()?;
        (seg.end_millis() > instant_millis).then_some(*start)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn segment_count(&self) -> usize {
        self.segments.values().map(|m| m.len()).sum()
    }

    pub fn keys(&self) -> Vec<GeoKey> {
        self.segments.keys().copied().collect()
    }

    /// Stored periods of `key`, ascending
    pub fn periods(&self, key: &GeoKey) -> Vec<TimePeriod> {
        self.segments
            .get(key)
            .map(|m| m.values().map(|seg| seg.period).collect())
            .unwrap_or_default()
    }

    /// All segments, ordered by key then start
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values().flat_map(|m| m.values())
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            keys: self.segments.len(),
            segments: self.segment_count(),
            total_size: self.total_size,
        }
    }
}
