//! Request lifecycle and response types
//!
//! Every request moves through
//! `Received → ResolvingCoverage → Fetching → Merging → Complete | PartialFailure`
//! and ends in a [`Response`]: the merged [`Dataset`] plus a [`GapsReport`]
//! listing everything that could not be delivered.

use crate::geo::GeoLocation;
use crate::storage::period::TimePeriod;
use crate::storage::types::{GeoKey, Observation, Source};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    ResolvingCoverage,
    Fetching,
    Merging,
    Complete,
    PartialFailure,
}

impl RequestState {
    pub fn is_final(&self) -> bool {
        matches!(self, RequestState::Complete | RequestState::PartialFailure)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Received => "received",
            RequestState::ResolvingCoverage => "resolving_coverage",
            RequestState::Fetching => "fetching",
            RequestState::Merging => "merging",
            RequestState::Complete => "complete",
            RequestState::PartialFailure => "partial_failure",
        };
        write!(f, "{}", name)
    }
}

/// Which source delivered one stretch of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub period: TimePeriod,
    pub source: Source,
}

/// Merged data for one GeoKey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub key: GeoKey,
    pub location: GeoLocation,
    /// Ordered by timestamp, clipped to the requested period
    pub observations: Vec<Observation>,
    /// Ordered by start
    pub provenance: Vec<Provenance>,
}

impl Series {
    /// Stretches delivered by `source`
    pub fn periods_from(&self, source: Source) -> Vec<TimePeriod> {
        self.provenance
            .iter()
            .filter(|p| p.source == source)
            .map(|p| p.period)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub series: Vec<Series>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn get(&self, key: &GeoKey) -> Option<&Series> {
        self.series.iter().find(|s| s.key == *key)
    }

    pub fn observation_count(&self) -> usize {
        self.series.iter().map(|s| s.observations.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum GapReason {
    /// Outside the validity window or the upstream's available period
    PermanentlyUnavailable,
    FetchFailed(String),
    /// Still outstanding when the request timed out or was cancelled
    Cancelled,
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapReason::PermanentlyUnavailable => write!(f, "permanently unavailable"),
            GapReason::FetchFailed(reason) => write!(f, "fetch failed: {}", reason),
            GapReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub key: GeoKey,
    pub period: TimePeriod,
    pub reason: GapReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapsReport {
    pub gaps: Vec<Gap>,
    /// Requested factor names the catalog does not know
    pub unknown_factors: Vec<String>,
}

impl GapsReport {
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty() && self.unknown_factors.is_empty()
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &Gap> {
        self.gaps
            .iter()
            .filter(|g| g.reason == GapReason::PermanentlyUnavailable)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Gap> {
        self.gaps
            .iter()
            .filter(|g| matches!(g.reason, GapReason::FetchFailed(_)))
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &Gap> {
        self.gaps.iter().filter(|g| g.reason == GapReason::Cancelled)
    }

    pub(crate) fn push(&mut self, key: GeoKey, period: TimePeriod, reason: GapReason) {
        self.gaps.push(Gap {
            key,
            period,
            reason,
        });
    }

    pub(crate) fn sort(&mut self) {
        self.gaps
            .sort_by_key(|g| (g.key, g.period.start_millis()));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: Uuid,
    pub state: RequestState,
    pub dataset: Dataset,
    pub gaps: GapsReport,
}

impl Response {
    pub fn is_complete(&self) -> bool {
        self.state == RequestState::Complete
    }
}
