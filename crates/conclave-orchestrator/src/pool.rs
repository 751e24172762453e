use conclave_core::{ConclaveError, ConclaveResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

/// Admission-controlled executor for async work items.
///
/// At most `max_concurrent` items run at once. Further submissions wait in
/// FIFO order (the semaphore is fair) up to `max_queue_size`; beyond that they
/// are rejected with [`ConclaveError::Capacity`].
pub struct BoundedPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    max_queue_size: usize,
    queued: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    draining: AtomicBool,
}

impl BoundedPool {
    /// `max_concurrent` is raised to 1 if zero.
    pub fn new(max_concurrent: usize, max_queue_size: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_queue_size,
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Items an otherwise idle pool accepts at once without a `Capacity` rejection.
    pub fn capacity(&self) -> usize {
        self.max_concurrent.saturating_add(self.max_queue_size)
    }

    /// Items currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Items waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously active items seen so far.
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Run `work` once a slot is free.
    pub async fn submit<F, T>(&self, work: F) -> ConclaveResult<T>
    where
        F: Future<Output = T>,
    {
        if self.is_draining() {
            return Err(ConclaveError::Cancelled("pool is draining".into()));
        }
        let permit = self.admit().await?;

        let _active = ActiveGuard::enter(&self.active, &self.peak_active);
        let output = work.await;
        drop(permit);
        Ok(output)
    }

    async fn admit(&self) -> ConclaveResult<OwnedSemaphorePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => {
                return Err(ConclaveError::Cancelled("pool is closed".into()))
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        let reserved = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |q| {
                (q < self.max_queue_size).then_some(q + 1)
            });
        if reserved.is_err() {
            debug!(
                max_queue_size = self.max_queue_size,
                "Pool queue full, rejecting work item"
            );
            return Err(ConclaveError::Capacity(format!(
                "queue full ({} waiting)",
                self.max_queue_size
            )));
        }

        let acquired = {
            let _slot = QueueSlot(&self.queued);
            self.semaphore.clone().acquire_owned().await
        };
        let permit =
            acquired.map_err(|_| ConclaveError::Cancelled("pool is closed".into()))?;
        if self.is_draining() {
            return Err(ConclaveError::Cancelled(
                "pool drained before work item started".into(),
            ));
        }
        Ok(permit)
    }

    /// Stop admitting work and wait for in-flight items to finish.
    ///
    /// Items still queued when the drain starts are cancelled as they reach
    /// the front of the queue. After the drain the pool rejects every submission.
    pub async fn drain(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            active = self.active(),
            queued = self.queued(),
            "Draining pool"
        );
        let all = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        if let Ok(permits) = self.semaphore.acquire_many(all).await {
            permits.forget();
        }
        self.semaphore.close();
        info!("Pool drained");
    }
}

struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
