use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Bounded set of concurrent fetch tasks.
///
/// Tasks return their output; `map` collects them back in input order, so
/// nothing is shared between tasks except what the closure clones in.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new tasks once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `task` once per input with at most `size` in flight and wait for
    /// all of them. `on_complete(done, total)` fires as each task finishes.
    ///
    /// After cancellation no further input is started; tasks already running
    /// finish, and the result only covers the inputs that were started.
    pub async fn map<I, T, F, Fut>(
        &self,
        inputs: Vec<I>,
        task: F,
        mut on_complete: impl FnMut(usize, usize),
    ) -> Vec<Result<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = inputs.len();
        let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
        let mut set = JoinSet::new();
        let mut done = 0;
        let mut started = 0;

        for (idx, input) in inputs.into_iter().enumerate() {
            // Reap finished tasks while waiting for a free slot
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break None,
                    permit = self.permits.clone().acquire_owned() => break permit.ok(),
                    Some(joined) = set.join_next(), if !set.is_empty() => {
                        collect(joined, &mut slots);
                        done += 1;
                        on_complete(done, total);
                    }
                }
            };
            let Some(permit) = permit else {
                if self.cancel.is_cancelled() {
                    log::warn!("Interrupted, {} tasks not started", total - idx);
                } else {
                    log::error!("Worker pool closed, {} tasks not started", total - idx);
                }
                break;
            };
            started += 1;
            let fut = task(input);
            set.spawn(async move {
                let _permit = permit;
                (idx, fut.await)
            });
        }

        while let Some(joined) = set.join_next().await {
            collect(joined, &mut slots);
            done += 1;
            on_complete(done, total);
        }

        slots
            .into_iter()
            .take(started)
            .map(|slot| slot.unwrap_or_else(|| Err(Error::Task("task did not complete".into()))))
            .collect()
    }
}

fn collect<T>(
    joined: std::result::Result<(usize, Result<T>), tokio::task::JoinError>,
    slots: &mut [Option<Result<T>>],
) {
    match joined {
        Ok((idx, output)) => slots[idx] = Some(output),
        Err(e) => log::error!("Worker task aborted: {e}"),
    }
}
