//! Factor catalog
//!
//! Meteorological models name their physical quantities in many ways ("T",
//! "temperature", "2t", "167"). The catalog resolves those model-specific
//! names to one harmonised [`FactorId`] (the ecCodes parameter id). GeoKeys are
//! built from catalog ids only; the coverage algorithm never looks at names.
//!
//! The catalog is loaded once at start-up and is read-only afterwards.

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Harmonised factor identity (ecCodes parameter id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactorId(pub u32);

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param:{}", self.0)
    }
}

/// Definition of a harmonised factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub id: FactorId,
    /// ecCodes short name, e.g. "2t"
    pub short_name: String,
    /// Human-readable name, e.g. "2 metre temperature"
    pub name: String,
    /// SI unit
    pub unit: String,
    /// Model-specific names that map to this factor
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Factor {
    pub fn new(
        id: u32,
        short_name: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: FactorId(id),
            short_name: short_name.into(),
            name: name.into(),
            unit: unit.into(),
            aliases: Vec::new(),
        }
    }

    /// Builder: add a model-specific alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Resolves model factor names to harmonised identities
pub trait FactorCatalog: Send + Sync {
    /// Harmonised id for a model-specific factor name
    fn resolve(&self, model_factor: &str) -> Option<FactorId>;

    /// Definition of a harmonised factor
    fn describe(&self, id: FactorId) -> Option<&Factor>;

    /// Split names into resolved ids and unknown names, keeping request order
    fn split_known(&self, model_factors: &[String]) -> (Vec<FactorId>, Vec<String>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in model_factors {
            match self.resolve(name) {
                Some(id) if !known.contains(&id) => known.push(id),
                Some(_) => {}
                None => unknown.push(name.clone()),
            }
        }
        (known, unknown)
    }
}

/// On-disk catalog format
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "factor")]
    factors: Vec<Factor>,
}

/// In-memory catalog with case-insensitive alias lookup
#[derive(Debug, Default)]
pub struct StaticCatalog {
    factors: HashMap<FactorId, Factor>,
    /// Lower-cased name/alias → id
    name_to_id: HashMap<String, FactorId>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the common surface parameters
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for factor in [
            Factor::new(167, "2t", "2 metre temperature", "K")
                .alias("temperature")
                .alias("t2m")
                .alias("T"),
            Factor::new(168, "2d", "2 metre dewpoint temperature", "K")
                .alias("dewpoint")
                .alias("TD"),
            Factor::new(165, "10u", "10 metre U wind component", "m s**-1").alias("u10"),
            Factor::new(166, "10v", "10 metre V wind component", "m s**-1").alias("v10"),
            Factor::new(134, "sp", "Surface pressure", "Pa")
                .alias("pressure")
                .alias("P"),
            Factor::new(228, "tp", "Total precipitation", "m")
                .alias("precipitation"),
            Factor::new(157, "r", "Relative humidity", "%").alias("humidity"),
            Factor::new(164, "tcc", "Total cloud cover", "(0 - 1)").alias("cloud_cover"),
        ] {
            catalog.register(factor);
        }
        catalog
    }

    /// Parse a TOML catalog (`[[factor]]` tables)
    pub fn from_toml_str(content: &str) -> StorageResult<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| StorageError::Config(format!("invalid factor catalog: {}", e)))?;

        let mut catalog = Self::new();
        for factor in file.factors {
            catalog.register(factor);
        }
        Ok(catalog)
    }

    /// Load a TOML catalog file
    pub fn load(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Register a factor; an existing id is replaced
    pub fn register(&mut self, factor: Factor) -> FactorId {
        let id = factor.id;
        self.name_to_id.insert(id.0.to_string(), id);
        self.name_to_id.insert(factor.short_name.to_lowercase(), id);
        self.name_to_id.insert(factor.name.to_lowercase(), id);
        for alias in &factor.aliases {
            self.name_to_id.insert(alias.to_lowercase(), id);
        }
        self.factors.insert(id, factor);
        id
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// All factors, ordered by id
    pub fn all(&self) -> Vec<&Factor> {
        let mut factors: Vec<&Factor> = self.factors.values().collect();
        factors.sort_by_key(|f| f.id);
        factors
    }
}

impl FactorCatalog for StaticCatalog {
    fn resolve(&self, model_factor: &str) -> Option<FactorId> {
        self.name_to_id
            .get(&model_factor.trim().to_lowercase())
            .copied()
    }

    fn describe(&self, id: FactorId) -> Option<&Factor> {
        self.factors.get(&id)
    }
}
