//! Core data types for the storage engine
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Observation`: one value of one factor at one instant
//! - `DataBlock`: an ordered run of observations, the unit of data stored and fetched
//! - `GeoKey`: the (location, factor) identity that coverage is indexed by
//! - `Selection`: a caller's request (locations x period x factors)
//! - `Tier` and `Source`: where stored or merged data came from

use crate::catalog::FactorId;
use crate::geo::{GeoLocation, LocationKey};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::period::TimePeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single measured or modelled value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn at(instant: DateTime<Utc>, value: f64) -> Self {
        Self::new(instant.timestamp_millis(), value)
    }
}

/// Ordered observations for one GeoKey
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataBlock {
    observations: Vec<Observation>,
}

impl DataBlock {
    /// Bytes per observation: timestamp(8) + value(8)
    const OBSERVATION_SIZE: u64 = 16;
    /// Fixed Vec overhead
    const BLOCK_OVERHEAD: u64 = 24;

    /// Build a block; observations are sorted by timestamp
    pub fn new(mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        Self { observations }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Get estimated size in bytes (for cache budgeting)
    pub fn estimated_size(&self) -> u64 {
        Self::BLOCK_OVERHEAD + self.observations.len() as u64 * Self::OBSERVATION_SIZE
    }

    /// Observations inside `[start_ms, end_ms)`
    pub fn slice(&self, start_ms: i64, end_ms: i64) -> DataBlock {
        let lo = self.observations.partition_point(|o| o.timestamp < start_ms);
        let hi = self.observations.partition_point(|o| o.timestamp < end_ms);
        DataBlock {
            observations: self.observations[lo..hi].to_vec(),
        }
    }

    /// Observations outside `[start_ms, end_ms)`
    pub fn without(&self, start_ms: i64, end_ms: i64) -> DataBlock {
        DataBlock {
            observations: self
                .observations
                .iter()
                .filter(|o| o.timestamp < start_ms || o.timestamp >= end_ms)
                .copied()
                .collect(),
        }
    }

    /// Merge another block in, keeping timestamp order
    ///
    /// On duplicate timestamps the value already present wins.
    pub fn merge(&mut self, other: DataBlock) {
        if other.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(self.observations.len() + other.observations.len());
        let mut left = std::mem::take(&mut self.observations).into_iter().peekable();
        let mut right = other.observations.into_iter().peekable();

        loop {
            match (left.peek(), right.peek()) {
                (Some(l), Some(r)) if l.timestamp < r.timestamp => merged.extend(left.next()),
                (Some(l), Some(r)) if l.timestamp > r.timestamp => merged.extend(right.next()),
                (Some(_), Some(_)) => {
                    merged.extend(left.next());
                    right.next();
                }
                (Some(_), None) => merged.extend(left.next()),
                (None, Some(_)) => merged.extend(right.next()),
                (None, None) => break,
            }
        }
        self.observations = merged;
    }
}

impl From<Vec<Observation>> for DataBlock {
    fn from(observations: Vec<Observation>) -> Self {
        DataBlock::new(observations)
    }
}

/// Index unit of stored coverage: one location and one factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeoKey {
    pub location: LocationKey,
    pub factor: FactorId,
}

impl GeoKey {
    pub fn new(location: LocationKey, factor: FactorId) -> Self {
        Self { location, factor }
    }
}

impl fmt::Display for GeoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.location, self.factor)
    }
}

/// Backing tier of a stored segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cache,
    Archive,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Cache => write!(f, "cache"),
            Tier::Archive => write!(f, "archive"),
        }
    }
}

/// Where a piece of merged data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Archive,
    Upstream,
}

impl From<Tier> for Source {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Cache => Source::Cache,
            Tier::Archive => Source::Archive,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Cache => write!(f, "cache"),
            Source::Archive => write!(f, "archive"),
            Source::Upstream => write!(f, "upstream"),
        }
    }
}

/// A caller's request: every factor at every location over one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub locations: Vec<GeoLocation>,
    pub period: TimePeriod,
    /// Model-specific factor names, resolved through the factor catalog
    pub factors: Vec<String>,
}

impl Selection {
    pub fn new(period: TimePeriod) -> Self {
        Self {
            locations: Vec::new(),
            period,
            factors: Vec::new(),
        }
    }

    /// Builder: add a location
    pub fn location(mut self, location: GeoLocation) -> Self {
        self.locations.push(location);
        self
    }

    /// Builder: add a factor by model-specific name
    pub fn factor(mut self, factor: impl Into<String>) -> Self {
        self.factors.push(factor.into());
        self
    }

    /// Reject selections that cannot be expanded into GeoKeys
    pub fn validate(&self) -> StorageResult<()> {
        if self.locations.is_empty() {
            return Err(StorageError::InvalidSelection(
                "at least one location is required".to_string(),
            ));
        }
        if self.factors.is_empty() {
            return Err(StorageError::InvalidSelection(
                "at least one factor is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(ts: &[i64]) -> DataBlock {
        DataBlock::new(ts.iter().map(|&t| Observation::new(t, t as f64)).collect())
    }

    fn timestamps(block: &DataBlock) -> Vec<i64> {
        block.observations().iter().map(|o| o.timestamp).collect()
    }

    #[test]
    fn test_block_sorted_on_creation() {
        let b = block(&[30, 10, 20]);
        assert_eq!(timestamps(&b), vec![10, 20, 30]);
        assert_eq!(b.estimated_size(), 24 + 3 * 16);
    }

    #[test]
    fn test_block_slice_and_without() {
        let b = block(&[10, 20, 30, 40]);
        assert_eq!(timestamps(&b.slice(20, 40)), vec![20, 30]);
        assert_eq!(timestamps(&b.without(20, 40)), vec![10, 40]);
        assert!(b.slice(50, 60).is_empty());
    }

    #[test]
    fn test_block_merge_keeps_existing_on_duplicates() {
        let mut a = DataBlock::new(vec![Observation::new(10, 1.0), Observation::new(30, 3.0)]);
        let b = DataBlock::new(vec![Observation::new(20, 2.0), Observation::new(30, 99.0)]);
        a.merge(b);
        assert_eq!(timestamps(&a), vec![10, 20, 30]);
        assert_eq!(a.observations()[2].value, 3.0);
    }

    #[test]
    fn test_selection_validation() {
        let period = TimePeriod::parse("2022-01-01", "2022-02-01").unwrap();
        assert!(matches!(
            Selection::new(period).validate(),
            Err(StorageError::InvalidSelection(_))
        ));
        assert!(Selection::new(period)
            .location(GeoLocation::wgs84(5.0, 52.0))
            .validate()
            .is_err());

        let selection = Selection::new(period)
            .location(GeoLocation::wgs84(5.0, 52.0))
            .factor("2t");
        assert!(selection.validate().is_ok());
    }

    #[test]
    fn test_geo_key_display() {
        let key = GeoKey::new(GeoLocation::wgs84(5.0, 52.0).key(), FactorId(167));
        assert_eq!(key.to_string(), "EPSG:4326(5.000000,52.000000)/param:167");
    }
}
