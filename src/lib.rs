//! # Stratus
//!
//! Temporal-spatial storage for meteorological datasets. Requests name
//! locations, factors and a time period; Stratus answers from a size-bounded
//! cache and a retention-bounded archive and fetches only the missing parts
//! from an upstream source.
//!
//! ## Features
//!
//! - **Coverage index**: Non-overlapping segments per location and factor
//! - **Two tiers**: LRU cache with a byte budget and maximum age, archive with a retention window
//! - **Gap fetching**: Concurrent upstream fetches, bounded and cancellable
//! - **Partial results**: Every request returns data plus a report of what is missing
//!
//! ## Modules
//!
//! - [`storage`]: Periods, tiers and the storage engine
//! - [`index`]: Coverage index shared by both tiers
//! - [`geo`]: Locations, CRS and geodesy
//! - [`catalog`]: Harmonised factor catalog
//! - [`upstream`]: Upstream source trait and a synthetic source
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratus::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = StorageEngine::new(
//!         StorageConfiguration::default(),
//!         Arc::new(SyntheticUpstream::new()),
//!     )?;
//!
//!     let selection = Selection::new(TimePeriod::parse("-7d", "now")?)
//!         .location(GeoLocation::wgs84(5.18, 52.1))
//!         .factor("2t")
//!         .factor("tp");
//!
//!     let response = engine.handle(&selection).await?;
//!     println!(
//!         "{}: {} observations, {} gaps",
//!         response.state,
//!         response.dataset.observation_count(),
//!         response.gaps.gaps.len()
//!     );
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod geo;
pub mod index;
pub mod logging;
pub mod storage;
pub mod upstream;

// Re-export top-level types for convenience
pub use storage::{
    Dataset, GapReason, GapsReport, GeoKey, Observation, RequestState, Response, Selection,
    Source, StorageConfiguration, StorageEngine, StorageError, StorageMode, StorageResult,
    StorageStats, TimePeriod,
};

pub use index::{Coverage, CoverageIndex, IndexStats};

pub use geo::{Crs, GeoLocation, Geodesy, SphericalGeodesy};

pub use catalog::{Factor, FactorCatalog, FactorId, StaticCatalog};

pub use clock::{Clock, ManualClock, SystemClock};

pub use upstream::{FetchError, SyntheticUpstream, Upstream};

pub use config::{Config, ConfigError, LoggingConfig};
