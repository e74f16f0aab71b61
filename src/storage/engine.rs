//! Stratus Storage Engine
//!
//! The engine is the façade over both tiers:
//! - Resolve: Selection → GeoKeys → cache coverage → archive coverage → gaps
//! - Fetch: gaps inside the validity window → upstream, concurrently
//! - Store: fetched data → cache (evicting) and archive (inside retention)
//! - Merge: cached + archived + fetched pieces → Dataset, plus a GapsReport
//!
//! Tiers are only constructed when the configured mode uses them. Tier
//! indexes sit behind short-lived `std::sync` locks; inserts for one GeoKey
//! are additionally serialized through an async per-key lock.

use crate::catalog::{FactorCatalog, StaticCatalog};
use crate::clock::{Clock, SystemClock};
use crate::geo::{GeoLocation, Geodesy, LocationRegistry, SphericalGeodesy};
use crate::index::IndexStats;
use crate::storage::archive::ArchiveTier;
use crate::storage::cache::{CacheStats, CacheTier, Evicted};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::period::TimePeriod;
use crate::storage::request::{
    Dataset, GapReason, GapsReport, Provenance, RequestState, Response, Series,
};
use crate::storage::segment::format_bytes;
use crate::storage::types::{DataBlock, GeoKey, Selection, Source};
use crate::upstream::{FetchError, Upstream};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which tiers the engine runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Every request goes upstream
    NoStorage,
    #[default]
    Cache,
    Archive,
    CacheAndArchive,
}

impl StorageMode {
    pub fn uses_cache(&self) -> bool {
        matches!(self, StorageMode::Cache | StorageMode::CacheAndArchive)
    }

    pub fn uses_archive(&self) -> bool {
        matches!(self, StorageMode::Archive | StorageMode::CacheAndArchive)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageMode::NoStorage => "no_storage",
            StorageMode::Cache => "cache",
            StorageMode::Archive => "archive",
            StorageMode::CacheAndArchive => "cache_and_archive",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StorageMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "no_storage" | "none" => Ok(StorageMode::NoStorage),
            "cache" => Ok(StorageMode::Cache),
            "archive" => Ok(StorageMode::Archive),
            "cache_and_archive" | "both" => Ok(StorageMode::CacheAndArchive),
            other => Err(StorageError::Config(format!(
                "unknown storage mode '{}'. Use: no_storage, cache, archive, cache_and_archive",
                other
            ))),
        }
    }
}

/// Configuration for the storage engine, fixed at construction
#[derive(Debug, Clone)]
pub struct StorageConfiguration {
    pub mode: StorageMode,
    /// Cache budget in bytes (default: 500MB)
    pub cache_size_limit_bytes: u64,
    /// Cached segments older than this expire (default: 24 hours)
    pub max_cache_age: Option<chrono::Duration>,
    /// Required by archive modes
    pub archive_retention: Option<TimePeriod>,
    /// Push evicted cache segments to the archive instead of dropping them
    pub cache_to_archive_promotion: bool,
    /// Nothing outside this window is ever fetched
    pub validity_window: TimePeriod,
    /// Upper bound on concurrent upstream fetches (default: 8)
    pub max_concurrent_fetches: usize,
    /// Per-request deadline; outstanding fetches are cancelled when it passes
    pub request_timeout: Option<Duration>,
    /// Archive snapshot file, loaded at start and written on shutdown
    pub archive_snapshot: Option<PathBuf>,
}

impl Default for StorageConfiguration {
    fn default() -> Self {
        Self {
            mode: StorageMode::Cache,
            cache_size_limit_bytes: 500 * 1024 * 1024,
            max_cache_age: Some(chrono::Duration::minutes(24 * 60)),
            archive_retention: None,
            cache_to_archive_promotion: false,
            validity_window: TimePeriod::default_validity_window(),
            max_concurrent_fetches: 8,
            request_timeout: Some(Duration::from_secs(60)),
            archive_snapshot: None,
        }
    }
}

impl StorageConfiguration {
    pub fn new(mode: StorageMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Reject combinations the engine cannot run with
    pub fn validate(&self) -> StorageResult<()> {
        if self.mode.uses_cache() && self.cache_size_limit_bytes == 0 {
            return Err(StorageError::Config(format!(
                "mode {} requires a non-zero cache size limit",
                self.mode
            )));
        }
        if let Some(age) = self.max_cache_age {
            if age.num_minutes() < 1 {
                return Err(StorageError::Config(format!(
                    "max cache age must be at least one minute, got {}s",
                    age.num_seconds()
                )));
            }
        }
        if self.mode.uses_archive() && self.archive_retention.is_none() {
            return Err(StorageError::Config(format!(
                "mode {} requires an archive retention period",
                self.mode
            )));
        }
        if self.cache_to_archive_promotion && self.mode != StorageMode::CacheAndArchive {
            return Err(StorageError::Config(format!(
                "cache to archive promotion needs mode cache_and_archive, not {}",
                self.mode
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(StorageError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Human-readable description of the active settings
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![("mode", self.mode.to_string())];
        if self.mode.uses_cache() {
            entries.push(("cache_size_limit", format_bytes(self.cache_size_limit_bytes)));
            entries.push((
                "max_cache_age",
                self.max_cache_age
                    .map(|age| format!("{} minutes", age.num_minutes()))
                    .unwrap_or_else(|| "none".to_string()),
            ));
        }
        if let Some(retention) = &self.archive_retention {
            entries.push(("archive_retention", retention.to_string()));
        }
        if self.mode == StorageMode::CacheAndArchive {
            entries.push((
                "cache_to_archive_promotion",
                self.cache_to_archive_promotion.to_string(),
            ));
        }
        entries.push(("validity_window", self.validity_window.to_string()));
        entries.push((
            "max_concurrent_fetches",
            self.max_concurrent_fetches.to_string(),
        ));
        entries.push((
            "request_timeout",
            self.request_timeout
                .map(|t| format!("{}s", t.as_secs_f64()))
                .unwrap_or_else(|| "none".to_string()),
        ));
        if let Some(path) = &self.archive_snapshot {
            entries.push(("archive_snapshot", path.display().to_string()));
        }
        entries
    }
}

/// Async lock per GeoKey, created on first use
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<GeoKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    /// Idle locks are dropped once the table grows past this
    const PRUNE_THRESHOLD: usize = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: GeoKey) -> StorageResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| StorageError::Lock(format!("Failed to lock key table: {}", e)))?;
            if locks.len() > Self::PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(key).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder wiring the engine to its collaborators
pub struct EngineBuilder {
    config: StorageConfiguration,
    upstream: Arc<dyn Upstream>,
    catalog: Arc<dyn FactorCatalog>,
    geodesy: Arc<dyn Geodesy>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    pub fn catalog(mut self, catalog: Arc<dyn FactorCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn geodesy(mut self, geodesy: Arc<dyn Geodesy>) -> Self {
        self.geodesy = geodesy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> StorageResult<StorageEngine> {
        let config = self.config;
        config.validate()?;

        let archive = match (&config.archive_retention, config.mode.uses_archive()) {
            (Some(retention), true) => {
                let tier = match &config.archive_snapshot {
                    Some(path) => ArchiveTier::open(path, *retention, Arc::clone(&self.clock))?,
                    None => ArchiveTier::new(*retention, Arc::clone(&self.clock)),
                };
                Some(Arc::new(tier))
            }
            _ => None,
        };

        let cache = if config.mode.uses_cache() {
            let mut tier = CacheTier::new(config.cache_size_limit_bytes, Arc::clone(&self.clock));
            if let Some(age) = config.max_cache_age {
                tier = tier.with_max_age(age);
            }
            if config.cache_to_archive_promotion {
                if let Some(archive) = &archive {
                    tier = tier.with_promotion(Arc::clone(archive));
                }
            }
            Some(Arc::new(tier))
        } else {
            None
        };

        info!(
            "Storage engine ready: mode={}, upstream={}",
            config.mode,
            self.upstream.name()
        );

        Ok(StorageEngine {
            fetch_slots: Arc::new(Semaphore::new(config.max_concurrent_fetches)),
            config,
            cache,
            archive,
            upstream: self.upstream,
            catalog: self.catalog,
            geodesy: self.geodesy,
            clock: self.clock,
            locations: Mutex::new(LocationRegistry::new()),
            key_locks: KeyLocks::new(),
            counters: EngineCounters::default(),
        })
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    requests: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    bytes_fetched: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
struct Target {
    key: GeoKey,
    location: GeoLocation,
}

/// A selection turned into concrete keys
struct Expanded {
    requested: TimePeriod,
    targets: Vec<Target>,
    unknown_factors: Vec<String>,
}

/// One stretch of data on its way into a series
struct Piece {
    period: TimePeriod,
    source: Source,
    data: DataBlock,
}

struct KeyWork {
    target: Target,
    pieces: Vec<Piece>,
}

/// Outcome of one fetch job; indices refer to the job list
enum FetchOutcome {
    Fetched(usize, DataBlock),
    Unresolved(usize, GapReason),
}

/// Where each part of a selection would come from, without fetching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub requested: TimePeriod,
    pub keys: Vec<KeyPlan>,
    pub unknown_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPlan {
    pub key: GeoKey,
    pub location: GeoLocation,
    pub cached: Vec<TimePeriod>,
    pub archived: Vec<TimePeriod>,
    pub to_fetch: Vec<TimePeriod>,
    pub unavailable: Vec<TimePeriod>,
}

/// The storage engine
pub struct StorageEngine {
    config: StorageConfiguration,
    cache: Option<Arc<CacheTier>>,
    archive: Option<Arc<ArchiveTier>>,
    upstream: Arc<dyn Upstream>,
    catalog: Arc<dyn FactorCatalog>,
    geodesy: Arc<dyn Geodesy>,
    clock: Arc<dyn Clock>,
    /// Maps equal locations onto one key
    locations: Mutex<LocationRegistry>,
    key_locks: KeyLocks,
    fetch_slots: Arc<Semaphore>,
    counters: EngineCounters,
}

impl StorageEngine {
    /// Engine with the builtin catalog, spherical geodesy and system clock
    pub fn new(config: StorageConfiguration, upstream: Arc<dyn Upstream>) -> StorageResult<Self> {
        Self::builder(config, upstream).build()
    }

    pub fn builder(config: StorageConfiguration, upstream: Arc<dyn Upstream>) -> EngineBuilder {
        EngineBuilder {
            config,
            upstream,
            catalog: Arc::new(StaticCatalog::builtin()),
            geodesy: Arc::new(SphericalGeodesy),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn configuration(&self) -> &StorageConfiguration {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<CacheTier>> {
        self.cache.as_ref()
    }

    pub fn archive(&self) -> Option<&Arc<ArchiveTier>> {
        self.archive.as_ref()
    }

    /// Serve a selection
    pub async fn handle(&self, selection: &Selection) -> StorageResult<Response> {
        self.handle_until(selection, std::future::pending::<()>())
            .await
    }

    /// Serve a selection, giving up on outstanding fetches once `cancel` completes
    ///
    /// Data merged so far is still returned; unresolved gaps are reported as
    /// cancelled.
    pub async fn handle_until<F>(&self, selection: &Selection, cancel: F) -> StorageResult<Response>
    where
        F: Future<Output = ()>,
    {
        let request_id = Uuid::new_v4();
        let deadline = self.config.request_timeout.map(|t| Instant::now() + t);
        let mut state = RequestState::Received;
        debug!("[{}] {}", request_id, state);
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let expanded = self.expand(selection, now)?;
        let requested = expanded.requested;
        let mut gaps = GapsReport {
            gaps: Vec::new(),
            unknown_factors: expanded.unknown_factors,
        };

        advance(request_id, &mut state, RequestState::ResolvingCoverage);
        let window = self.fetchable_window(now);
        let mut work = Vec::with_capacity(expanded.targets.len());
        let mut jobs: Vec<(usize, TimePeriod)> = Vec::new();
        for (idx, target) in expanded.targets.into_iter().enumerate() {
            let (pieces, missing) = self.resolve_stored(&target.key, &requested)?;
            for gap in missing {
                let (fetchable, unavailable) = split_by_window(&gap, window.as_ref());
                for period in unavailable {
                    gaps.push(target.key, period, GapReason::PermanentlyUnavailable);
                }
                if let Some(period) = fetchable {
                    jobs.push((idx, period));
                }
            }
            work.push(KeyWork { target, pieces });
        }

        advance(request_id, &mut state, RequestState::Fetching);
        debug!("[{}] dispatching {} fetches", request_id, jobs.len());
        let outcomes = self.fetch_all(&work, &jobs, deadline, cancel).await;

        advance(request_id, &mut state, RequestState::Merging);
        let mut fetched: BTreeMap<usize, Vec<(TimePeriod, DataBlock)>> = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Fetched(job, block) => {
                    let (idx, period) = jobs[job];
                    fetched.entry(idx).or_default().push((period, block));
                }
                FetchOutcome::Unresolved(job, reason) => {
                    let (idx, period) = jobs[job];
                    gaps.push(work[idx].target.key, period, reason);
                }
            }
        }

        for (idx, mut blocks) in fetched {
            blocks.sort_by_key(|(period, _)| period.start_millis());
            self.store_fetched(&work[idx].target.key, &blocks).await?;
            work[idx]
                .pieces
                .extend(blocks.into_iter().map(|(period, data)| Piece {
                    period,
                    source: Source::Upstream,
                    data,
                }));
        }

        let dataset = merge(work, &requested);
        gaps.sort();

        let final_state = if gaps.is_empty() {
            RequestState::Complete
        } else {
            RequestState::PartialFailure
        };
        advance(request_id, &mut state, final_state);
        info!(
            "[{}] {} for {}: {} series, {} observations, {} gaps",
            request_id,
            state,
            requested,
            dataset.len(),
            dataset.observation_count(),
            gaps.gaps.len()
        );

        Ok(Response {
            request_id,
            state,
            dataset,
            gaps,
        })
    }

    /// Report where each part of a selection would come from, without fetching
    pub fn plan(&self, selection: &Selection) -> StorageResult<Plan> {
        let now = self.clock.now();
        let expanded = self.expand(selection, now)?;
        let window = self.fetchable_window(now);

        let mut keys = Vec::with_capacity(expanded.targets.len());
        for target in expanded.targets {
            let mut plan = KeyPlan {
                key: target.key,
                location: target.location,
                cached: Vec::new(),
                archived: Vec::new(),
                to_fetch: Vec::new(),
                unavailable: Vec::new(),
            };

            let mut missing = vec![expanded.requested];
            if let Some(cache) = &self.cache {
                let coverage = cache.coverage(&target.key, &expanded.requested)?;
                plan.cached = coverage.covered;
                missing = coverage.missing;
            }
            if let Some(archive) = &self.archive {
                let mut still_missing = Vec::new();
                for gap in &missing {
                    let coverage = archive.coverage(&target.key, gap)?;
                    plan.archived.extend(coverage.covered);
                    still_missing.extend(coverage.missing);
                }
                missing = still_missing;
            }
            for gap in missing {
                let (fetchable, unavailable) = split_by_window(&gap, window.as_ref());
                plan.to_fetch.extend(fetchable);
                plan.unavailable.extend(unavailable);
            }
            keys.push(plan);
        }

        Ok(Plan {
            requested: expanded.requested,
            keys,
            unknown_factors: expanded.unknown_factors,
        })
    }

    /// Validate a selection and expand it into GeoKeys
    fn expand(&self, selection: &Selection, now: DateTime<Utc>) -> StorageResult<Expanded> {
        selection.validate()?;
        for location in &selection.locations {
            location.validate(self.geodesy.as_ref())?;
        }
        selection.period.validate_at(now)?;
        let requested = selection.period.anchored(now);

        let (factors, unknown_factors) = self.catalog.split_known(&selection.factors);
        if !unknown_factors.is_empty() {
            warn!("Unknown factors skipped: {}", unknown_factors.join(", "));
        }

        let mut registry = self
            .locations
            .lock()
            .map_err(|e| StorageError::Lock(format!("Failed to lock location registry: {}", e)))?;
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for location in &selection.locations {
            let location_key = registry.resolve(location, self.geodesy.as_ref());
            for factor in &factors {
                let key = GeoKey::new(location_key, *factor);
                if seen.insert(key) {
                    targets.push(Target {
                        key,
                        location: *location,
                    });
                }
            }
        }

        Ok(Expanded {
            requested,
            targets,
            unknown_factors,
        })
    }

    /// Cache first, then archive for what the cache lacks
    fn resolve_stored(
        &self,
        key: &GeoKey,
        requested: &TimePeriod,
    ) -> StorageResult<(Vec<Piece>, Vec<TimePeriod>)> {
        let mut pieces = Vec::new();
        let mut missing = vec![*requested];

        if let Some(cache) = &self.cache {
            let read = cache.get(key, requested)?;
            pieces.extend(read.pieces.into_iter().map(|seg| Piece {
                period: seg.period,
                source: Source::Cache,
                data: seg.data,
            }));
            missing = read.missing;
        }

        if let Some(archive) = &self.archive {
            let mut still_missing = Vec::new();
            for gap in &missing {
                let read = archive.get(key, gap)?;
                pieces.extend(read.pieces.into_iter().map(|seg| Piece {
                    period: seg.period,
                    source: Source::Archive,
                    data: seg.data,
                }));
                still_missing.extend(read.missing);
            }
            missing = still_missing;
        }

        Ok((pieces, missing))
    }

    /// Validity window intersected with what the upstream can deliver
    fn fetchable_window(&self, now: DateTime<Utc>) -> Option<TimePeriod> {
        self.config
            .validity_window
            .anchored(now)
            .overlap(&self.upstream.available_period().anchored(now))
    }

    /// Run every fetch job concurrently, bounded by the fetch slots
    async fn fetch_all<F>(
        &self,
        work: &[KeyWork],
        jobs: &[(usize, TimePeriod)],
        deadline: Option<Instant>,
        cancel: F,
    ) -> Vec<FetchOutcome>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        for (job, (idx, period)) in jobs.iter().enumerate() {
            let upstream = Arc::clone(&self.upstream);
            let slots = Arc::clone(&self.fetch_slots);
            let target = work[*idx].target;
            let period = *period;
            tasks.spawn(async move {
                let result = match slots.acquire_owned().await {
                    Ok(_permit) => upstream.fetch(&target.key, &target.location, &period).await,
                    Err(_) => Err(FetchError::Unavailable("fetch slots closed".to_string())),
                };
                (job, result)
            });
        }
        self.counters
            .fetches
            .fetch_add(jobs.len() as u64, Ordering::Relaxed);

        let timeout = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);
        tokio::pin!(cancel);

        let mut pending: HashSet<usize> = (0..jobs.len()).collect();
        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut interrupted = None;

        while !tasks.is_empty() {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((job, Ok(block)))) => {
                        pending.remove(&job);
                        let (_, period) = jobs[job];
                        let block = block.slice(period.start_millis(), period.end_millis());
                        self.counters
                            .bytes_fetched
                            .fetch_add(block.estimated_size(), Ordering::Relaxed);
                        outcomes.push(FetchOutcome::Fetched(job, block));
                    }
                    Some(Ok((job, Err(e)))) => {
                        pending.remove(&job);
                        self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                        let (idx, period) = jobs[job];
                        warn!("Fetch of {} {} failed: {}", work[idx].target.key, period, e);
                        outcomes.push(FetchOutcome::Unresolved(job, GapReason::FetchFailed(e.to_string())));
                    }
                    Some(Err(e)) => warn!("Fetch task did not complete: {}", e),
                    None => break,
                },
                _ = &mut timeout => {
                    interrupted = Some("request timed out");
                    break;
                }
                _ = &mut cancel => {
                    interrupted = Some("request cancelled");
                    break;
                }
            }
        }

        let leftover = match interrupted {
            Some(why) => {
                tasks.abort_all();
                warn!("{}, {} fetches abandoned", why, pending.len());
                GapReason::Cancelled
            }
            None => GapReason::FetchFailed("fetch task panicked".to_string()),
        };

        let mut pending: Vec<usize> = pending.into_iter().collect();
        pending.sort_unstable();
        self.counters
            .fetch_failures
            .fetch_add(pending.len() as u64, Ordering::Relaxed);
        outcomes.extend(
            pending
                .into_iter()
                .map(|job| FetchOutcome::Unresolved(job, leftover.clone())),
        );
        outcomes
    }

    /// Insert fetched blocks for one key, in ascending start order
    async fn store_fetched(
        &self,
        key: &GeoKey,
        blocks: &[(TimePeriod, DataBlock)],
    ) -> StorageResult<()> {
        if self.cache.is_none() && self.archive.is_none() {
            return Ok(());
        }

        let _guard = self.key_locks.lock(*key).await?;
        for (period, block) in blocks {
            let size = block.estimated_size();

            if let Some(cache) = &self.cache {
                match cache.put(*key, period, block.clone(), size) {
                    Ok(outcome) if outcome.fresh_evicted => warn!(
                        "{} {} did not stay cached: its segment grew past the cache limit",
                        key, period
                    ),
                    Ok(outcome) if !outcome.evicted.is_empty() => debug!(
                        "Caching {} {} evicted {} segments ({})",
                        key,
                        period,
                        outcome.evicted.len(),
                        format_bytes(outcome.bytes_evicted())
                    ),
                    Ok(_) => {}
                    Err(StorageError::SegmentTooLarge { size, limit }) => warn!(
                        "{} {} is {} but the cache holds {}; serving without caching",
                        key,
                        period,
                        format_bytes(size),
                        format_bytes(limit)
                    ),
                    Err(e) => return Err(e),
                }
            }

            if let Some(archive) = &self.archive {
                archive.put_within_retention(*key, period, block, size)?;
            }
        }
        Ok(())
    }

    /// Evict at least `bytes` from the cache, least recently used first
    pub fn shrink_cache(&self, bytes: u64) -> StorageResult<Vec<Evicted>> {
        match &self.cache {
            Some(cache) => cache.shrink_by(bytes),
            None => Err(StorageError::Config(format!(
                "mode {} has no cache tier",
                self.config.mode
            ))),
        }
    }

    /// Remove a period from the archive across all keys
    pub fn clear_archive_period(&self, period: &TimePeriod) -> StorageResult<Vec<GeoKey>> {
        match &self.archive {
            Some(archive) => archive.clear_period(period),
            None => Err(StorageError::Config(format!(
                "mode {} has no archive tier",
                self.config.mode
            ))),
        }
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageResult<StorageStats> {
        Ok(StorageStats {
            mode: self.config.mode,
            cache: self.cache.as_ref().map(|c| c.stats()).transpose()?,
            archive: self.archive.as_ref().map(|a| a.stats()).transpose()?,
            requests: self.counters.requests.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            fetch_failures: self.counters.fetch_failures.load(Ordering::Relaxed),
            bytes_fetched: self.counters.bytes_fetched.load(Ordering::Relaxed),
        })
    }

    /// Shutdown the engine gracefully, persisting the archive snapshot
    pub async fn shutdown(&self) -> StorageResult<()> {
        self.fetch_slots.close();
        if let (Some(archive), Some(path)) = (&self.archive, &self.config.archive_snapshot) {
            archive.persist(path)?;
        }
        info!("Storage engine shut down");
        Ok(())
    }
}

impl fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageEngine")
            .field("config", &self.config)
            .field("upstream", &self.upstream.name())
            .field("cache", &self.cache)
            .field("archive", &self.archive)
            .finish()
    }
}

fn advance(request_id: Uuid, state: &mut RequestState, next: RequestState) {
    debug!("[{}] {} -> {}", request_id, state, next);
    *state = next;
}

/// Split a gap into the part inside `window` and the parts outside it
fn split_by_window(
    gap: &TimePeriod,
    window: Option<&TimePeriod>,
) -> (Option<TimePeriod>, Vec<TimePeriod>) {
    match window {
        Some(window) => (gap.overlap(window), gap.difference(window)),
        None => (None, vec![*gap]),
    }
}

/// Combine the pieces of every key into series
fn merge(work: Vec<KeyWork>, requested: &TimePeriod) -> Dataset {
    let (start, end) = (requested.start_millis(), requested.end_millis());
    let mut dataset = Dataset::default();

    for item in work {
        if item.pieces.is_empty() {
            continue;
        }
        let mut pieces = item.pieces;
        pieces.sort_by_key(|p| p.period.start_millis());

        let mut data = DataBlock::empty();
        let mut provenance = Vec::with_capacity(pieces.len());
        for piece in pieces {
            provenance.push(Provenance {
                period: piece.period,
                source: piece.source,
            });
            data.merge(piece.data);
        }

        dataset.series.push(Series {
            key: item.target.key,
            location: item.target.location,
            observations: data.slice(start, end).into_observations(),
            provenance,
        });
    }
    dataset
}

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub mode: StorageMode,
    pub cache: Option<CacheStats>,
    pub archive: Option<IndexStats>,
    pub requests: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub bytes_fetched: u64,
}

impl fmt::Display for StorageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode: {}", self.mode)?;
        if let Some(cache) = &self.cache {
            writeln!(f, "Cache: {}", cache)?;
        }
        if let Some(archive) = &self.archive {
            writeln!(
                f,
                "Archive: {} in {} segments ({} keys)",
                format_bytes(archive.total_size),
                archive.segments,
                archive.keys
            )?;
        }
        write!(
            f,
            "Requests: {}, Fetches: {}, Failed: {}, Fetched: {}",
            self.requests,
            self.fetches,
            self.fetch_failures,
            format_bytes(self.bytes_fetched)
        )
    }
}
