//! Runtime abstraction layer for async operations
//!
//! Tile fetches are the only asynchronous work in the engine. They are
//! handed to an [`AsyncSpawner`] chosen by the embedder, so the engine never
//! assumes a global executor.

use futures::future::BoxFuture;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A trait for spawning async tasks (object-safe)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task, if the executor supports it
    fn cancel(&self);
}

/// Runs each future to completion on the calling thread.
///
/// Useful for headless tools and tests; the caller blocks for the whole fetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineSpawner;

impl AsyncSpawner for InlineSpawner {
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
        futures::executor::block_on(future);
        Box::new(FlagHandle(Arc::new(AtomicBool::new(true))))
    }
}

/// Runs each future on a fresh OS thread with a local executor
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl AsyncSpawner for ThreadSpawner {
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        std::thread::spawn(move || {
            // Set even when the future panics
            let _done = FinishOnDrop(flag);
            futures::executor::block_on(future);
        });
        Box::new(FlagHandle(finished))
    }
}

struct FinishOnDrop(Arc<AtomicBool>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

struct FlagHandle(Arc<AtomicBool>);

impl AsyncHandle for FlagHandle {
    fn is_finished(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn cancel(&self) {}
}

#[cfg(feature = "tokio-runtime")]
pub use tokio_impl::TokioSpawner;

#[cfg(feature = "tokio-runtime")]
mod tokio_impl {
    use super::*;
    use ::tokio::{runtime::Handle, task::JoinHandle};

    /// Tokio-based async spawner bound to a runtime handle
    #[derive(Debug, Clone)]
    pub struct TokioSpawner {
        handle: Handle,
    }

    impl TokioSpawner {
        pub fn new(handle: Handle) -> Self {
            Self { handle }
        }

        /// Spawner for the runtime the caller is running on, if any
        pub fn current() -> Option<Self> {
            Handle::try_current().ok().map(Self::new)
        }
    }

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(&self, future: BoxFuture<'static, ()>) -> Box<dyn AsyncHandle> {
            Box::new(TokioHandle(self.handle.spawn(future)))
        }
    }

    struct TokioHandle(JoinHandle<()>);

    impl AsyncHandle for TokioHandle {
        fn is_finished(&self) -> bool {
            self.0.is_finished()
        }

        fn cancel(&self) {
            self.0.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_inline_spawner_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = InlineSpawner.spawn_boxed(Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(handle.is_finished());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_spawner_completes() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = ThreadSpawner.spawn_boxed(Box::pin(async move {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)), Ok(7));
        // The flag is set right after the future returns
        for _ in 0..500 {
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(handle.is_finished());
    }

    #[test]
    fn test_thread_spawner_finishes_after_panic() {
        let handle = ThreadSpawner.spawn_boxed(Box::pin(async {
            if true {
                panic!("fetch task failed");
            }
        }));
        for _ in 0..500 {
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(handle.is_finished());
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_tokio_spawner_current() {
        let spawner = TokioSpawner::current().expect("inside a runtime");
        let (tx, rx) = futures::channel::oneshot::channel();
        spawner.spawn_boxed(Box::pin(async move {
            let _ = tx.send("done");
        }));
        assert_eq!(rx.await, Ok("done"));
    }
}
