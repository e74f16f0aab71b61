//! Stratus Index Structures
//!
//! Provides the in-memory coverage accounting shared by both storage tiers:
//!
//! - **CoverageIndex**: GeoKey → ordered, non-overlapping segments with
//!   coverage queries, coalescing insert and splitting remove
//!
//! # Architecture
//!
//! ```text
//! Query: "2t at De Bilt, 2022-02-01 .. 2022-04-01"
//!        ↓
//! CoverageIndex: segments for (De Bilt, 2t) → [2022-01-01 .. 2022-03-01)
//!        ↓
//! covered: [2022-02-01 .. 2022-03-01)   missing: [2022-03-01 .. 2022-04-01)
//!        ↓
//! Only the missing part goes upstream
//! ```

mod coverage;

pub use coverage::{Coverage, CoverageIndex};

use serde::{Deserialize, Serialize};

/// Statistics about index usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of GeoKeys with stored data
    pub keys: usize,
    /// Number of stored segments
    pub segments: usize,
    /// Sum of segment sizes in bytes
    pub total_size: u64,
}
