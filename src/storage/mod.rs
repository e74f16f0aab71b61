//! Stratus Storage
//!
//! This module provides the two-tier storage around an upstream source:
//!
//! - **period**: Half-open time periods, absolute or relative to now
//! - **types**: Observations, data blocks, GeoKeys and selections
//! - **segment**: Stored segments and the archive snapshot format
//! - **cache**: Size-bounded tier with pluggable eviction
//! - **archive**: Retention-bounded tier
//! - **request**: Request lifecycle, datasets and gap reports
//! - **engine**: Orchestrates tiers and upstream fetches per request
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Read Path:
//!   Selection → GeoKeys → Cache → Archive → Gaps → Upstream (concurrent)
//!
//! Store Path:
//!   Fetched block → Cache (evict, maybe promote) → Archive (within retention)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratus::geo::GeoLocation;
//! use stratus::storage::{Selection, StorageConfiguration, StorageEngine, TimePeriod};
//! use stratus::upstream::SyntheticUpstream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = StorageEngine::new(
//!         StorageConfiguration::default(),
//!         Arc::new(SyntheticUpstream::new()),
//!     )?;
//!
//!     let selection = Selection::new(TimePeriod::parse("2022-01-01", "2022-02-01")?)
//!         .location(GeoLocation::wgs84(5.18, 52.1))
//!         .factor("2t");
//!
//!     let response = engine.handle(&selection).await?;
//!     println!("{} observations", response.dataset.observation_count());
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cache;
pub mod engine;
pub mod error;
pub mod period;
pub mod request;
pub mod segment;
pub mod types;

// Re-export commonly used types
pub use archive::ArchiveTier;
pub use cache::{CacheStats, CacheTier, EvictionPolicy, Evicted, LruLargestFirst, PutOutcome};
pub use engine::{
    EngineBuilder, KeyLocks, KeyPlan, Plan, StorageConfiguration, StorageEngine, StorageMode,
    StorageStats,
};
pub use error::{StorageError, StorageResult};
pub use period::{TimeBound, TimePeriod};
pub use request::{
    Dataset, Gap, GapReason, GapsReport, Provenance, RequestState, Response, Series,
};
pub use segment::{format_bytes, Segment, TierRead};
pub use types::{DataBlock, GeoKey, Observation, Selection, Source, Tier};
