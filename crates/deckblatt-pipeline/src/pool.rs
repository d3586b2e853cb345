// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded worker pool for the synchronous embed step.
//
// Parsing and serialising documents blocks, so each job runs on tokio's
// blocking thread pool. A semaphore caps how many run at once; excess
// requests wait for a permit instead of piling up files and memory.

use std::sync::Arc;

use deckblatt_core::error::{DeckblattError, Result};
use tokio::sync::Semaphore;
use tracing::{Span, debug};

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A pool running at most `size` jobs at once (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a permit is free.
    ///
    /// The caller's tracing span is carried onto the worker thread. A job that
    /// panics is reported as `Worker`.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DeckblattError::Worker("worker pool is closed".into()))?;
        debug!(available = self.available(), "Worker permit acquired");

        let span = Span::current();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            span.in_scope(job)
        });

        handle.await.map_err(|err| {
            if err.is_panic() {
                DeckblattError::Worker("embedding task panicked".into())
            } else {
                DeckblattError::Worker(format!("embedding task did not complete: {}", err))
            }
        })?
    }
}
