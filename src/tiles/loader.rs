use crossbeam_channel::{unbounded, Receiver, Sender};
use fxhash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;

use super::cache::{Completion, FetchDecision, TileCache, TileLookup};
use super::fetcher::{FetchError, TileFetcher, TileImage};
use super::source::TileSource;
use crate::core::config::TileLoadingConfig;
use crate::core::geo::TileCoord;
use crate::core::viewport::TileRange;
use crate::runtime::{AsyncHandle, AsyncSpawner};
use crate::MapError;

/// Result of a fetch task, sent back to the loader's owning thread
#[derive(Debug)]
pub struct TileResult {
    pub coord: TileCoord,
    pub data: Result<TileImage, FetchError>,
}

/// Change reported by [`TileLoader::poll`]
#[derive(Debug)]
pub enum TileUpdate {
    /// The tile is now cached; repaint it
    Ready(TileCoord),
    /// `TileFetchFailure` while retries remain, `PersistentMiss` once they are exhausted
    Failed(MapError),
}

/// Delivers exactly one result per fetch task.
///
/// A task that panics or is aborted drops its reporter without sending, and
/// the drop reports a `FetchError::Runtime` so the key leaves the in-flight set.
struct ResultReporter {
    coord: TileCoord,
    tx: Option<Sender<TileResult>>,
}

impl ResultReporter {
    fn send(mut self, data: Result<TileImage, FetchError>) {
        self.deliver(data);
    }

    fn deliver(&mut self, data: Result<TileImage, FetchError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let coord = self.coord;
        if tx.send(TileResult { coord, data }).is_err() {
            log::debug!("loader dropped before tile {} arrived", coord);
        }
    }
}

impl Drop for ResultReporter {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::debug!("fetch task for tile {} ended without a result", self.coord);
            self.deliver(Err(FetchError::Runtime(
                "fetch task ended without a result".into(),
            )));
        }
    }
}

/// Couples the tile cache with a fetcher and an async spawner
///
/// Fetch tasks run wherever the spawner puts them and report over a channel.
/// Their results are applied to the cache only in [`TileLoader::poll`], so
/// the cache has a single writer. Retries are not timers: a key whose
/// backoff has elapsed is fetched again on its next request.
pub struct TileLoader {
    cache: TileCache,
    source: Arc<dyn TileSource>,
    fetcher: Arc<dyn TileFetcher>,
    spawner: Arc<dyn AsyncSpawner>,
    result_tx: Sender<TileResult>,
    result_rx: Receiver<TileResult>,
    handles: FxHashMap<TileCoord, Box<dyn AsyncHandle>>,
}

impl TileLoader {
    pub fn new(
        config: &TileLoadingConfig,
        source: Arc<dyn TileSource>,
        fetcher: Arc<dyn TileFetcher>,
        spawner: Arc<dyn AsyncSpawner>,
    ) -> Self {
        let (result_tx, result_rx) = unbounded();
        Self {
            cache: TileCache::with_config(config),
            source,
            fetcher,
            spawner,
            result_tx,
            result_rx,
            handles: FxHashMap::default(),
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Number of fetches that have not reported back yet
    pub fn pending(&self) -> usize {
        self.cache.in_flight_len()
    }

    /// Returns what is known about a tile, starting a fetch if needed.
    ///
    /// Never blocks on the network (unless the spawner runs tasks inline).
    pub fn request(&mut self, coord: TileCoord) -> TileLookup {
        let lookup = self.cache.get(&coord);
        if lookup != TileLookup::Miss {
            return lookup;
        }

        match self.cache.begin_fetch(coord) {
            FetchDecision::Start { attempt } => {
                self.dispatch(coord, attempt);
                TileLookup::Pending
            }
            FetchDecision::Joined | FetchDecision::BackingOff { .. } => TileLookup::Pending,
            FetchDecision::Cached => self.cache.get(&coord),
            FetchDecision::GaveUp => TileLookup::PersistentMiss,
        }
    }

    fn dispatch(&mut self, coord: TileCoord, attempt: u32) {
        let url = self.source.url(coord);
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.result_tx.clone();
        log::debug!("requesting tile {} (attempt {})", coord, attempt);

        let handle = self.spawner.spawn_boxed(Box::pin(async move {
            let reporter = ResultReporter {
                coord,
                tx: Some(tx),
            };
            let data = fetcher.fetch(coord, url).await;
            reporter.send(data);
        }));
        self.handles.insert(coord, handle);
    }

    /// Narrows interest to the visible range; see [`TileCache::retain_interest`]
    pub fn retain_interest(&mut self, range: &TileRange) {
        self.cache.retain_interest(range);
    }

    /// Applies every fetch result that has arrived, without blocking
    pub fn poll(&mut self) -> Vec<TileUpdate> {
        let results: Vec<TileResult> = self.result_rx.try_iter().collect();
        self.apply(results)
    }

    /// Waits up to `timeout` for at least one result, then drains the rest.
    ///
    /// Meant for headless callers without a frame loop.
    pub fn poll_blocking(&mut self, timeout: Duration) -> Vec<TileUpdate> {
        if self.pending() == 0 {
            return self.poll();
        }
        let mut results = Vec::new();
        if let Ok(first) = self.result_rx.recv_timeout(timeout) {
            results.push(first);
            results.extend(self.result_rx.try_iter());
        }
        self.apply(results)
    }

    fn apply(&mut self, results: Vec<TileResult>) -> Vec<TileUpdate> {
        let mut updates = Vec::with_capacity(results.len());
        for TileResult { coord, data } in results {
            self.handles.remove(&coord);
            match self.cache.on_fetch_complete(coord, data) {
                Ok(Completion::Stored { .. }) => updates.push(TileUpdate::Ready(coord)),
                Ok(Completion::Failed {
                    retry_in: Some(_),
                    error,
                    ..
                }) => updates.push(TileUpdate::Failed(MapError::TileFetchFailure {
                    coord,
                    source: error,
                })),
                Ok(Completion::Failed { retry_in: None, .. }) => {
                    updates.push(TileUpdate::Failed(MapError::PersistentMiss(coord)))
                }
                Ok(Completion::Discarded { error }) => {
                    log::debug!("discarded failure for off-screen tile {}: {}", coord, error)
                }
                Err(err) => updates.push(TileUpdate::Failed(err)),
            }
        }
        updates
    }

    /// Cancels outstanding fetch tasks where the spawner supports it
    pub fn shutdown(&mut self) {
        for (_, handle) in self.handles.drain() {
            if !handle.is_finished() {
                handle.cancel();
            }
        }
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLoader")
            .field("cache", &self.cache)
            .field("outstanding", &self.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{InlineSpawner, ThreadSpawner};
    use crate::tiles::source::UrlTemplateSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves one canned outcome per call, then succeeds
    #[derive(Default)]
    struct ScriptedFetcher {
        calls: AtomicUsize,
        failures: Mutex<Vec<FetchError>>,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TileFetcher for ScriptedFetcher {
        async fn fetch(&self, coord: TileCoord, url: String) -> Result<TileImage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url);
            match self.failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(TileImage::new(coord, vec![0; 4])),
            }
        }
    }

    fn loader(fetcher: Arc<ScriptedFetcher>, config: TileLoadingConfig) -> TileLoader {
        TileLoader::new(
            &config,
            Arc::new(UrlTemplateSource::new("mem://{z}/{x}/{y}")),
            fetcher,
            Arc::new(InlineSpawner),
        )
    }

    #[test]
    fn test_duplicate_requests_fetch_once() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut loader = loader(Arc::clone(&fetcher), TileLoadingConfig::default());
        let coord = TileCoord::new(3, 5, 4).unwrap();

        assert_eq!(loader.request(coord), TileLookup::Pending);
        assert_eq!(loader.request(coord), TileLookup::Pending);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.urls.lock().unwrap()[0], "mem://4/3/5");

        let updates = loader.poll();
        assert!(matches!(updates.as_slice(), [TileUpdate::Ready(c)] if *c == coord));
        assert!(loader.request(coord).image().is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_surface_as_errors() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher
            .failures
            .lock()
            .unwrap()
            .push(FetchError::Http { status: 404 });
        let mut loader = loader(
            Arc::clone(&fetcher),
            TileLoadingConfig {
                max_retries: 0,
                ..TileLoadingConfig::default()
            },
        );
        let coord = TileCoord::new(0, 0, 1).unwrap();

        loader.request(coord);
        let updates = loader.poll();
        assert!(matches!(
            updates.as_slice(),
            [TileUpdate::Failed(MapError::PersistentMiss(c))] if *c == coord
        ));
        assert_eq!(loader.request(coord), TileLookup::PersistentMiss);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    struct PanickingFetcher;

    #[async_trait]
    impl TileFetcher for PanickingFetcher {
        async fn fetch(&self, _coord: TileCoord, _url: String) -> Result<TileImage, FetchError> {
            panic!("decoder blew up");
        }
    }

    #[test]
    fn test_panicking_fetch_still_completes() {
        let mut loader = TileLoader::new(
            &TileLoadingConfig {
                max_retries: 0,
                ..TileLoadingConfig::default()
            },
            Arc::new(UrlTemplateSource::new("mem://{z}/{x}/{y}")),
            Arc::new(PanickingFetcher),
            Arc::new(ThreadSpawner),
        );
        let coord = TileCoord::new(1, 1, 2).unwrap();

        assert_eq!(loader.request(coord), TileLookup::Pending);
        let updates = loader.poll_blocking(Duration::from_secs(5));
        assert!(matches!(
            updates.as_slice(),
            [TileUpdate::Failed(MapError::PersistentMiss(c))] if *c == coord
        ));
        assert_eq!(loader.pending(), 0);
        assert_eq!(loader.request(coord), TileLookup::PersistentMiss);
    }

    #[test]
    fn test_retry_after_backoff() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.failures.lock().unwrap().push(FetchError::Timeout);
        let mut loader = loader(
            Arc::clone(&fetcher),
            TileLoadingConfig {
                retry_delay_ms: 0,
                ..TileLoadingConfig::default()
            },
        );
        let coord = TileCoord::new(1, 1, 1).unwrap();

        loader.request(coord);
        let updates = loader.poll();
        assert!(matches!(
            updates.as_slice(),
            [TileUpdate::Failed(MapError::TileFetchFailure { source: FetchError::Timeout, .. })]
        ));

        // Zero backoff: the next request retries straight away
        assert_eq!(loader.request(coord), TileLookup::Pending);
        assert!(matches!(loader.poll().as_slice(), [TileUpdate::Ready(_)]));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
