//! Stored segments and the archive snapshot file format
//!
//! A [`Segment`] is one contiguous, absolute range of data for one GeoKey in
//! one tier. Segments are the unit of coverage accounting and of eviction.
//!
//! Archive snapshots persist a list of segments in a single file.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (32 bytes)                       │
//! │   magic: [u8; 4] = "WPLA"               │
//! │   version: u16                          │
//! │   segment_count: u32                    │
//! │   body_len: u64                         │
//! │   body_checksum: u32                    │
//! │   reserved: [u8; 6]                     │
//! │   header_checksum: u32                  │
//! ├─────────────────────────────────────────┤
//! │ BODY (body_len bytes)                   │
//! │   bincode(Vec<Segment>)                 │
//! └─────────────────────────────────────────┘
//! ```

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::period::TimePeriod;
use crate::storage::types::{DataBlock, GeoKey, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes for snapshot file identification
const SNAPSHOT_MAGIC: [u8; 4] = *b"WPLA";

/// Current snapshot format version
const SNAPSHOT_VERSION: u16 = 2;

/// Header size in bytes
const HEADER_SIZE: usize = 32;

/// One stored range of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub key: GeoKey,
    /// Always absolute once stored
    pub period: TimePeriod,
    pub tier: Tier,
    pub size_bytes: u64,
    pub last_accessed: DateTime<Utc>,
    /// When the oldest data in this segment was written
    pub stored_at: DateTime<Utc>,
    pub data: DataBlock,
}

impl Segment {
    /// Create a segment, freezing the period at `now`
    ///
    /// Observations outside the frozen period are dropped.
    pub fn new(
        key: GeoKey,
        period: TimePeriod,
        tier: Tier,
        size_bytes: u64,
        data: DataBlock,
        now: DateTime<Utc>,
    ) -> Self {
        let period = period.anchored(now);
        let data = data.slice(period.start_millis(), period.end_millis());
        Self {
            key,
            period,
            tier,
            size_bytes,
            last_accessed: now,
            stored_at: now,
            data,
        }
    }

    pub fn start_millis(&self) -> i64 {
        self.period.start_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.period.end_millis()
    }

    pub fn duration_millis(&self) -> i64 {
        self.end_millis() - self.start_millis()
    }

    /// Time since the segment was written
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.stored_at)
    }

    /// Record a read hit
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }

    /// The part of this segment inside `period`, size pro-rated by duration
    pub fn clipped(&self, period: &TimePeriod) -> Option<Segment> {
        let overlap = self.period.overlap(period)?;
        let (start, end) = (overlap.start_millis(), overlap.end_millis());
        Some(Segment {
            key: self.key,
            period: overlap,
            tier: self.tier,
            size_bytes: prorate(self.size_bytes, end - start, self.duration_millis()),
            last_accessed: self.last_accessed,
            stored_at: self.stored_at,
            data: self.data.slice(start, end),
        })
    }
}

/// Result of reading a period from a tier
#[derive(Debug, Clone, Default)]
pub struct TierRead {
    /// Stored data clipped to the requested period, ascending
    pub pieces: Vec<Segment>,
    /// Parts of the requested period the tier does not hold
    pub missing: Vec<TimePeriod>,
}

impl TierRead {
    pub fn covered(&self) -> Vec<TimePeriod> {
        self.pieces.iter().map(|p| p.period).collect()
    }

    pub fn is_hit(&self) -> bool {
        !self.pieces.is_empty()
    }
}

/// Share of `size` belonging to `part_ms` out of `whole_ms`
///
/// Integer arithmetic; rounds down so pieces never sum above the original.
pub fn prorate(size: u64, part_ms: i64, whole_ms: i64) -> u64 {
    if whole_ms <= 0 || part_ms >= whole_ms {
        return size;
    }
    if part_ms <= 0 {
        return 0;
    }
    ((size as u128 * part_ms as u128) / whole_ms as u128) as u64
}

/// Formats bytes to a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes < TB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    }
}

/// Snapshot file header
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub version: u16,
    pub segment_count: u32,
    pub body_len: u64,
    pub body_checksum: u32,
}

impl SnapshotHeader {
    pub fn for_body(segment_count: u32, body: &[u8]) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            segment_count,
            body_len: body.len() as u64,
            body_checksum: crc32fast::hash(body),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&SNAPSHOT_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.segment_count.to_le_bytes());
        buf[10..18].copy_from_slice(&self.body_len.to_le_bytes());
        buf[18..22].copy_from_slice(&self.body_checksum.to_le_bytes());
        // bytes 22-27 reserved

        let checksum = crc32fast::hash(&buf[0..28]);
        buf[28..32].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        let stored_checksum = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);
        let computed_checksum = crc32fast::hash(&buf[0..28]);

        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Snapshot header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        if buf[0..4] != SNAPSHOT_MAGIC {
            return Err(StorageError::Corruption(format!(
                "Invalid snapshot magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != SNAPSHOT_VERSION {
            return Err(StorageError::Corruption(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }

        let segment_count = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let mut body_len = [0u8; 8];
        body_len.copy_from_slice(&buf[10..18]);
        let body_checksum = u32::from_le_bytes([buf[18], buf[19], buf[20], buf[21]]);

        Ok(Self {
            version,
            segment_count,
            body_len: u64::from_le_bytes(body_len),
            body_checksum,
        })
    }
}

/// Write segments to a snapshot file, replacing it atomically
pub fn write_snapshot(path: &Path, segments: &[Segment]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let body = bincode::serialize(segments)?;
    let header = SnapshotHeader::for_body(segments.len() as u32, &body);

    let tmp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&body)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read segments back from a snapshot file
pub fn read_snapshot(path: &Path) -> StorageResult<Vec<Segment>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf)?;
    let header = SnapshotHeader::from_bytes(&header_buf)?;

    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    if body.len() as u64 != header.body_len {
        return Err(StorageError::Corruption(format!(
            "Snapshot body truncated: expected {} bytes, found {}",
            header.body_len,
            body.len()
        )));
    }
    if crc32fast::hash(&body) != header.body_checksum {
        return Err(StorageError::Corruption(
            "Snapshot body checksum mismatch".to_string(),
        ));
    }

    let segments: Vec<Segment> = bincode::deserialize(&body)?;
    if segments.len() != header.segment_count as usize {
        return Err(StorageError::Corruption(format!(
            "Snapshot declares {} segments but holds {}",
            header.segment_count,
            segments.len()
        )));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FactorId;
    use crate::geo::GeoLocation;
    use crate::storage::types::Observation;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn key() -> GeoKey {
        GeoKey::new(GeoLocation::wgs84(5.18, 52.1).key(), FactorId(167))
    }

    fn segment(start: &str, end: &str, size: u64) -> Segment {
        let period = TimePeriod::parse(start, end).unwrap();
        let hours = period.duration().num_hours();
        let data = DataBlock::new(
            (0..hours)
                .map(|h| Observation::new(period.start_millis() + h * 3_600_000, h as f64))
                .collect(),
        );
        Segment::new(key(), period, Tier::Archive, size, data, Utc::now())
    }

    #[test]
    fn test_prorate() {
        assert_eq!(prorate(100, 50, 100), 50);
        assert_eq!(prorate(100, 100, 100), 100);
        assert_eq!(prorate(100, 0, 100), 0);
        assert_eq!(prorate(10, 1, 3), 3);
        assert_eq!(prorate(u64::MAX, 1, 2), u64::MAX / 2);
    }

    #[test]
    fn test_new_drops_observations_outside_period() {
        let period = TimePeriod::parse("2022-01-01", "2022-01-02").unwrap();
        let data = DataBlock::new(vec![
            Observation::new(period.start_millis() - 3_600_000, -1.0),
            Observation::new(period.start_millis(), 1.0),
            Observation::new(period.end_millis(), 999.0),
        ]);

        let seg = Segment::new(key(), period, Tier::Cache, 100, data, Utc::now());
        assert_eq!(seg.data.len(), 1);
        assert_eq!(seg.data.observations()[0].value, 1.0);
    }

    #[test]
    fn test_clipped_segment() {
        let seg = segment("2022-01-01", "2022-01-11", 1000);
        let window = TimePeriod::parse("2022-01-03", "2022-01-05").unwrap();

        let clipped = seg.clipped(&window).unwrap();
        assert!(clipped.period.same_span(&window));
        assert_eq!(clipped.size_bytes, 200);
        assert_eq!(clipped.data.len(), 48);

        let outside = TimePeriod::parse("2023-01-01", "2023-01-02").unwrap();
        assert!(seg.clipped(&outside).is_none());
    }

    #[test]
    fn test_touch_only_moves_forward() {
        let mut seg = segment("2022-01-01", "2022-01-02", 10);
        let earlier = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let before = seg.last_accessed;
        seg.touch(earlier);
        assert_eq!(seg.last_accessed, before);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(500 * 1024 * 1024), "500.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_snapshot_header_roundtrip() {
        let header = SnapshotHeader::for_body(3, b"some body");
        let restored = SnapshotHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(restored, header);

        let mut corrupt = header.to_bytes();
        corrupt[7] ^= 0xFF;
        assert!(matches!(
            SnapshotHeader::from_bytes(&corrupt),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_snapshot_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.snapshot");

        let segments = vec![
            segment("2022-01-01", "2022-01-03", 100),
            segment("2022-02-01", "2022-02-02", 50),
        ];
        write_snapshot(&path, &segments).unwrap();

        let restored = read_snapshot(&path).unwrap();
        assert_eq!(restored, segments);
    }

    #[test]
    fn test_snapshot_detects_body_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.snapshot");
        write_snapshot(&path, &[segment("2022-01-01", "2022-01-02", 10)]).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_snapshot(&path),
            Err(StorageError::Corruption(_))
        ));
    }
}
