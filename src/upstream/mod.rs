//! Upstream model sources
//!
//! The storage engine treats the source of meteorological data as a black
//! box behind the [`Upstream`] trait: it asks for one GeoKey over one period
//! and gets a [`DataBlock`] or a [`FetchError`] back. Retries, rate limiting
//! and protocol details belong to the implementation.
//!
//! - **SyntheticUpstream**: deterministic generated series, with injectable
//!   failures and latency for tests and demos

mod synthetic;

pub use synthetic::SyntheticUpstream;

use crate::geo::GeoLocation;
use crate::storage::period::TimePeriod;
use crate::storage::types::{DataBlock, GeoKey};
use async_trait::async_trait;

/// Common trait for all upstream model sources
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Unique name for this source
    fn name(&self) -> &str;

    /// Period this source can deliver data for
    fn available_period(&self) -> TimePeriod {
        TimePeriod::default_validity_window()
    }

    /// Fetch data for one key over one absolute period
    async fn fetch(
        &self,
        key: &GeoKey,
        location: &GeoLocation,
        period: &TimePeriod,
    ) -> Result<DataBlock, FetchError>;
}

/// Errors that can occur while fetching from an upstream source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),
}
