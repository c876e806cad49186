use fxhash::FxHashMap;
use instant::Instant;
use lru::LruCache;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::TileLoadingConfig;
use crate::core::geo::TileCoord;
use crate::core::viewport::TileRange;
use crate::tiles::fetcher::{FetchError, TileImage};
use crate::{MapError, Result};

/// What the cache knows about a tile right now
#[derive(Debug, Clone, PartialEq)]
pub enum TileLookup {
    Ready(Arc<TileImage>),
    /// Fetch in flight or retry scheduled; draw a placeholder
    Pending,
    /// Nothing known; a fetch should be started
    Miss,
    /// Retries exhausted; draw the error placeholder
    PersistentMiss,
}

impl TileLookup {
    pub fn image(&self) -> Option<&Arc<TileImage>> {
        match self {
            TileLookup::Ready(image) => Some(image),
            _ => None,
        }
    }
}

/// Answer to [`TileCache::begin_fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Caller must run fetch attempt number `attempt` (1-based)
    Start { attempt: u32 },
    /// A fetch for this key is already running
    Joined,
    Cached,
    BackingOff { retry_in: Duration },
    GaveUp,
}

/// Result of applying a completed fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Stored {
        evicted: Option<TileCoord>,
        /// False when the tile scrolled out of view while loading
        interested: bool,
    },
    Failed {
        attempts: u32,
        /// `None` once retries are exhausted
        retry_in: Option<Duration>,
        error: FetchError,
    },
    /// Failure of a fetch nobody is waiting for; nothing recorded
    Discarded { error: FetchError },
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub failures: u64,
    pub persistent_misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    attempt: u32,
    interested: bool,
}

#[derive(Debug, Clone)]
struct FailureRecord {
    attempts: u32,
    retry_at: Instant,
    given_up_at: Option<Instant>,
}

/// Bounded in-memory tile store with fetch bookkeeping
///
/// Holds decoded tiles in LRU order, the set of keys with a fetch in flight
/// (so each key is fetched at most once at a time), and failure records that
/// drive exponential backoff. All mutation happens on the owning thread;
/// fetch results arrive through [`TileCache::on_fetch_complete`].
#[derive(Debug)]
pub struct TileCache {
    entries: LruCache<TileCoord, Arc<TileImage>>,
    in_flight: FxHashMap<TileCoord, InFlight>,
    failures: FxHashMap<TileCoord, FailureRecord>,
    recent_ranges: VecDeque<TileRange>,
    config: TileLoadingConfig,
    stats: CacheStats,
}

impl TileCache {
    /// Create a new tile cache with the given capacity and default retry policy
    pub fn new(capacity: usize) -> Self {
        Self::with_config(&TileLoadingConfig {
            cache_size: capacity,
            ..TileLoadingConfig::default()
        })
    }

    pub fn with_config(config: &TileLoadingConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            in_flight: FxHashMap::default(),
            failures: FxHashMap::default(),
            recent_ranges: VecDeque::new(),
            config: config.clone(),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a tile is cached, without touching recency
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.entries.contains(coord)
    }

    pub fn is_in_flight(&self, coord: &TileCoord) -> bool {
        self.in_flight.contains_key(coord)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether an in-flight fetch is still wanted by the current view
    pub fn is_interested(&self, coord: &TileCoord) -> bool {
        self.in_flight.get(coord).map_or(false, |f| f.interested)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Looks a tile up, refreshing its recency when cached
    pub fn get(&mut self, coord: &TileCoord) -> TileLookup {
        self.lookup_at(coord, Instant::now())
    }

    fn lookup_at(&mut self, coord: &TileCoord, now: Instant) -> TileLookup {
        if let Some(image) = self.entries.get(coord) {
            self.stats.hits += 1;
            return TileLookup::Ready(Arc::clone(image));
        }
        self.stats.misses += 1;

        if self.in_flight.contains_key(coord) {
            return TileLookup::Pending;
        }

        let ttl = Duration::from_millis(self.config.failure_ttl_ms);
        match self.failures.get(coord) {
            Some(FailureRecord {
                given_up_at: Some(at),
                ..
            }) => {
                if now.duration_since(*at) >= ttl {
                    self.failures.remove(coord);
                    TileLookup::Miss
                } else {
                    TileLookup::PersistentMiss
                }
            }
            Some(record) if now < record.retry_at => TileLookup::Pending,
            _ => TileLookup::Miss,
        }
    }

    /// Registers intent to fetch `coord`.
    ///
    /// Only [`FetchDecision::Start`] obliges the caller to run a fetch and
    /// report back through [`TileCache::on_fetch_complete`].
    pub fn begin_fetch(&mut self, coord: TileCoord) -> FetchDecision {
        self.begin_fetch_at(coord, Instant::now())
    }

    fn begin_fetch_at(&mut self, coord: TileCoord, now: Instant) -> FetchDecision {
        if self.entries.contains(&coord) {
            return FetchDecision::Cached;
        }
        if let Some(flight) = self.in_flight.get_mut(&coord) {
            flight.interested = true;
            return FetchDecision::Joined;
        }

        let ttl = Duration::from_millis(self.config.failure_ttl_ms);
        let attempt = match self.failures.get(&coord) {
            Some(record) => match record.given_up_at {
                Some(at) if now.duration_since(at) < ttl => return FetchDecision::GaveUp,
                Some(_) => {
                    self.failures.remove(&coord);
                    1
                }
                None if now < record.retry_at => {
                    return FetchDecision::BackingOff {
                        retry_in: record.retry_at.duration_since(now),
                    }
                }
                None => record.attempts + 1,
            },
            None => 1,
        };

        self.in_flight.insert(
            coord,
            InFlight {
                attempt,
                interested: true,
            },
        );
        FetchDecision::Start { attempt }
    }

    /// Applies the outcome of a fetch.
    ///
    /// Successful results are cached even when nobody is waiting for them
    /// any more. Fails only if the capacity invariant is broken.
    pub fn on_fetch_complete(
        &mut self,
        coord: TileCoord,
        result: std::result::Result<TileImage, FetchError>,
    ) -> Result<Completion> {
        self.complete_at(coord, result, Instant::now())
    }

    fn complete_at(
        &mut self,
        coord: TileCoord,
        result: std::result::Result<TileImage, FetchError>,
        now: Instant,
    ) -> Result<Completion> {
        let flight = self.in_flight.remove(&coord).unwrap_or_else(|| {
            log::debug!("completion for tile {} that was not in flight", coord);
            InFlight {
                attempt: self.failures.get(&coord).map_or(1, |r| r.attempts + 1),
                interested: false,
            }
        });

        match result {
            Ok(image) => {
                self.failures.remove(&coord);
                if !flight.interested {
                    log::debug!("caching tile {} that left the view while loading", coord);
                }
                let evicted = self.insert(coord, image)?;
                Ok(Completion::Stored {
                    evicted,
                    interested: flight.interested,
                })
            }
            Err(error) => {
                self.stats.failures += 1;
                if !flight.interested {
                    self.failures.remove(&coord);
                    return Ok(Completion::Discarded { error });
                }

                let attempts = flight.attempt;
                if attempts > self.config.max_retries {
                    log::warn!(
                        "giving up on tile {} after {} attempts: {}",
                        coord,
                        attempts,
                        error
                    );
                    self.stats.persistent_misses += 1;
                    self.failures.insert(
                        coord,
                        FailureRecord {
                            attempts,
                            retry_at: now,
                            given_up_at: Some(now),
                        },
                    );
                    return Ok(Completion::Failed {
                        attempts,
                        retry_in: None,
                        error,
                    });
                }

                let retry_in = self.config.retry_delay(attempts);
                log::debug!(
                    "tile {} attempt {} failed ({}), retrying in {:?}",
                    coord,
                    attempts,
                    error,
                    retry_in
                );
                self.failures.insert(
                    coord,
                    FailureRecord {
                        attempts,
                        retry_at: now + retry_in,
                        given_up_at: None,
                    },
                );
                Ok(Completion::Failed {
                    attempts,
                    retry_in: Some(retry_in),
                    error,
                })
            }
        }
    }

    /// Inserts a tile, evicting the least recently used one when full
    pub fn insert(&mut self, coord: TileCoord, image: TileImage) -> Result<Option<TileCoord>> {
        let evicted = self
            .entries
            .push(coord, Arc::new(image))
            .map(|(key, _)| key)
            .filter(|key| *key != coord);
        self.stats.inserts += 1;
        if evicted.is_some() {
            self.stats.evictions += 1;
        }

        if self.entries.len() > self.capacity() {
            log::error!(
                "tile cache over capacity: {} > {}",
                self.entries.len(),
                self.capacity()
            );
            return Err(MapError::CacheCapacityViolation {
                len: self.entries.len(),
                capacity: self.capacity(),
            });
        }
        Ok(evicted)
    }

    /// Narrows interest to `range`.
    ///
    /// In-flight fetches outside the range keep running but are no longer
    /// awaited, failure records outside it are forgotten, and cached tiles
    /// outside every recently retained range are pruned.
    pub fn retain_interest(&mut self, range: &TileRange) {
        for (coord, flight) in self.in_flight.iter_mut() {
            flight.interested = range.contains(coord);
        }
        self.failures.retain(|coord, _| range.contains(coord));

        if self.config.retained_ranges == 0 {
            return;
        }
        if self.recent_ranges.back() != Some(range) {
            self.recent_ranges.push_back(*range);
        }
        while self.recent_ranges.len() > self.config.retained_ranges {
            self.recent_ranges.pop_front();
        }

        let stale: Vec<TileCoord> = self
            .entries
            .iter()
            .map(|(coord, _)| *coord)
            .filter(|coord| !self.recent_ranges.iter().any(|r| r.contains(coord)))
            .collect();
        if !stale.is_empty() {
            log::debug!("pruning {} tiles outside recent view ranges", stale.len());
        }
        for coord in stale {
            self.entries.pop(&coord);
            self.stats.evictions += 1;
        }
    }

    /// Drops every cached tile and failure record. In-flight fetches are
    /// left to land but are no longer awaited.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.failures.clear();
        self.recent_ranges.clear();
        for flight in self.in_flight.values_mut() {
            flight.interested = false;
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_config(&TileLoadingConfig::default())
    }
}
