//! Background job execution.
//!
//! Jobs (local read + decode, fetch, asset extraction) never touch bundle
//! records. They report a [`Completion`] over a channel and the coordinator
//! applies it on the owning loop during the next pump.

use std::sync::Arc;

use crate::bundle::BundleId;
use crate::io::{AssetData, BundleImage};

/// Boxed unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes jobs somewhere other than the owning loop's bookkeeping
pub trait JobRunner: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Runs each job immediately on the calling thread.
///
/// Completions still queue on the channel, so continuations only run when
/// the coordinator pumps; deterministic, which makes it the test default.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineRunner;

impl JobRunner for InlineRunner {
    fn spawn(&self, job: Job) {
        job();
    }
}

/// Runs jobs on the global rayon pool
#[cfg(feature = "parallel")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPoolRunner;

#[cfg(feature = "parallel")]
impl JobRunner for ThreadPoolRunner {
    fn spawn(&self, job: Job) {
        rayon::spawn(job);
    }
}

/// Result of a background job, applied on the owning loop
pub(crate) enum Completion {
    Decoded {
        bundle: BundleId,
        result: Result<Arc<dyn BundleImage>, String>,
    },
    Downloaded {
        bundle: BundleId,
        ticket: u64,
        result: Result<Vec<u8>, String>,
    },
    Extracted {
        bundle: BundleId,
        generation: u32,
        asset: String,
        data: Option<AssetData>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_runner_runs_immediately() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        InlineRunner.spawn(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_thread_pool_runner_completes() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        ThreadPoolRunner.spawn(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)), Ok(42));
    }
}
