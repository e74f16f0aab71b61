//! Synthetic upstream source
//!
//! Generates a smooth diurnal series per factor and location, one value per
//! step. The same key and instant always give the same value, so data fetched
//! twice can be compared. Failures and latency can be injected per factor.

use super::{FetchError, Upstream};
use crate::catalog::FactorId;
use crate::geo::GeoLocation;
use crate::storage::period::TimePeriod;
use crate::storage::types::{DataBlock, GeoKey, Observation};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct SyntheticUpstream {
    name: String,
    step: Duration,
    available: TimePeriod,
    latency: std::time::Duration,
    failing: HashMap<FactorId, FetchError>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(GeoKey, TimePeriod)>>,
}

impl Default for SyntheticUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticUpstream {
    pub fn new() -> Self {
        Self {
            name: "synthetic".to_string(),
            step: Duration::hours(1),
            available: TimePeriod::default_validity_window(),
            latency: std::time::Duration::ZERO,
            failing: HashMap::new(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Builder: distance between generated observations
    ///
    /// Steps under one millisecond are ignored.
    pub fn step(mut self, step: Duration) -> Self {
        if step.num_milliseconds() > 0 {
            self.step = step;
        }
        self
    }

    /// Builder: restrict the period this source reports as available
    pub fn available(mut self, period: TimePeriod) -> Self {
        self.available = period;
        self
    }

    /// Builder: sleep this long before answering each fetch
    pub fn latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Builder: every fetch for `factor` fails with `error`
    pub fn failing(mut self, factor: FactorId, error: FetchError) -> Self {
        self.failing.insert(factor, error);
        self
    }

    /// Number of fetches answered or failed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every (key, period) asked for, in call order
    pub fn requested(&self) -> Vec<(GeoKey, TimePeriod)> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Deterministic value for a factor at a location and instant
    pub fn value_at(factor: FactorId, location: &GeoLocation, timestamp_ms: i64) -> f64 {
        let hour_of_day = (timestamp_ms.rem_euclid(86_400_000)) as f64 / 3_600_000.0;
        let diurnal = (2.0 * std::f64::consts::PI * (hour_of_day - 9.0) / 24.0).sin();
        let (base, amplitude) = match factor.0 {
            167 | 168 => (283.15 - location.y.abs() * 0.1, 5.0),
            134 => (101_325.0, 150.0),
            157 => (75.0, 15.0),
            _ => (factor.0 as f64 / 10.0, 1.0),
        };
        base + amplitude * diurnal
    }
}

#[async_trait]
impl Upstream for SyntheticUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_period(&self) -> TimePeriod {
        self.available
    }

    async fn fetch(
        &self,
        key: &GeoKey,
        location: &GeoLocation,
        period: &TimePeriod,
    ) -> Result<DataBlock, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.requested.lock() {
            requested.push((*key, *period));
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.failing.get(&key.factor) {
            return Err(error.clone());
        }

        let step_ms = self.step.num_milliseconds();
        let (start, end) = (period.start_millis(), period.end_millis());
        let first = start + (step_ms - start.rem_euclid(step_ms)) % step_ms;

        let observations: Vec<Observation> = (0..)
            .map(|i| first + i * step_ms)
            .take_while(|ts| *ts < end)
            .map(|ts| Observation::new(ts, Self::value_at(key.factor, location, ts)))
            .collect();

        debug!(
            "{} generated {} observations for {} {}",
            self.name,
            observations.len(),
            key,
            period
        );
        Ok(DataBlock::new(observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(factor: u32) -> (GeoKey, GeoLocation) {
        let location = GeoLocation::wgs84(5.18, 52.1);
        (GeoKey::new(location.key(), FactorId(factor)), location)
    }

    #[tokio::test]
    async fn test_generates_hourly_series() {
        let upstream = SyntheticUpstream::new();
        let (k, loc) = key(167);
        let period = TimePeriod::parse("2022-01-01", "2022-01-02").unwrap();

        let block = upstream.fetch(&k, &loc, &period).await.unwrap();
        assert_eq!(block.len(), 24);
        assert_eq!(block.observations()[0].timestamp, period.start_millis());
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_sub_millisecond_step_keeps_hourly() {
        let upstream = SyntheticUpstream::new().step(Duration::microseconds(500));
        let (k, loc) = key(167);
        let period = TimePeriod::parse("2022-01-01", "2022-01-02").unwrap();

        let block = upstream.fetch(&k, &loc, &period).await.unwrap();
        assert_eq!(block.len(), 24);
    }

    #[tokio::test]
    async fn test_unaligned_period_starts_on_next_step() {
        let upstream = SyntheticUpstream::new();
        let (k, loc) = key(167);
        let period = TimePeriod::parse("2022-01-01T00:30", "2022-01-01T03:00").unwrap();

        let block = upstream.fetch(&k, &loc, &period).await.unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(
            block.observations()[0].timestamp,
            period.start_millis() + 30 * 60_000
        );
    }

    #[tokio::test]
    async fn test_deterministic_values() {
        let upstream = SyntheticUpstream::new();
        let (k, loc) = key(134);
        let period = TimePeriod::parse("2022-03-01", "2022-03-02").unwrap();

        let a = upstream.fetch(&k, &loc, &period).await.unwrap();
        let b = upstream.fetch(&k, &loc, &period).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(upstream.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let upstream = SyntheticUpstream::new()
            .failing(FactorId(228), FetchError::Upstream("HTTP 503".to_string()));
        let period = TimePeriod::parse("2022-01-01", "2022-01-02").unwrap();

        let (k, loc) = key(228);
        assert_eq!(
            upstream.fetch(&k, &loc, &period).await,
            Err(FetchError::Upstream("HTTP 503".to_string()))
        );
        let (k, loc) = key(167);
        assert!(upstream.fetch(&k, &loc, &period).await.is_ok());
    }
}
