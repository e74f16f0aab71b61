//! Location registry
//!
//! Maps incoming locations onto stable [`LocationKey`]s. Two locations that the
//! geodesy collaborator considers equal (for instance the same point expressed
//! in two reference systems) share one key, so their stored coverage is shared.
//!
//! Every key seen is remembered as an alias of its canonical key, so only the
//! first sighting of a location pays for the geodesic scan. The registry holds
//! at most `capacity` locations and aliases; past that, unseen locations
//! resolve to their own key without being remembered.

use super::{GeoLocation, Geodesy, LocationKey};
use std::collections::HashMap;
use tracing::debug;

/// Default bound on remembered locations
pub const DEFAULT_REGISTRY_CAPACITY: usize = 65_536;

#[derive(Debug)]
pub struct LocationRegistry {
    /// Canonical locations in registration order, used for the equality scan
    known: Vec<(LocationKey, GeoLocation)>,
    by_key: HashMap<LocationKey, GeoLocation>,
    /// Exact key of every resolved location to its canonical key
    aliases: HashMap<LocationKey, LocationKey>,
    capacity: usize,
}

impl Default for LocationRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            known: Vec::new(),
            by_key: HashMap::new(),
            aliases: HashMap::new(),
            capacity,
        }
    }

    /// Key for `location`, registering it if no equal location is known
    pub fn resolve(&mut self, location: &GeoLocation, geodesy: &dyn Geodesy) -> LocationKey {
        let exact = location.key();
        if let Some(canonical) = self.aliases.get(&exact) {
            return *canonical;
        }

        let canonical = match self
            .known
            .iter()
            .find(|(_, known)| geodesy.locations_equal(known, location))
        {
            Some((key, _)) => *key,
            None if self.known.len() < self.capacity => {
                self.known.push((exact, *location));
                self.by_key.insert(exact, *location);
                exact
            }
            None => {
                debug!("Location registry full, not remembering {}", location);
                return exact;
            }
        };

        if self.aliases.len() < self.capacity {
            self.aliases.insert(exact, canonical);
        }
        canonical
    }

    /// The location first registered under `key`
    pub fn location(&self, key: &LocationKey) -> Option<&GeoLocation> {
        self.by_key.get(key)
    }

    /// Number of canonical locations
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
