//! Pre-warmed pool of predictor handles
//!
//! ## Construction
//!
//! All handles are created eagerly and sequentially: handle 0 is the main
//! predictor built from configuration, handles `1..size` are clones of it made
//! one after another. Handles are never created on demand, because cloning is
//! not safe to run concurrently with other work on the main handle. A failed
//! clone fails construction; a pool is never smaller than requested.
//!
//! ## Checkout
//!
//! A semaphore holds one permit per idle handle. [`PredictorPool::acquire`]
//! waits for a permit, then takes a handle from the free list. The returned
//! [`PooledPredictor`] gives exclusive access and puts the handle back when
//! dropped, which covers early returns, errors, panics and cancelled futures.
//! There is no FIFO guarantee among waiters.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, info, trace};

use crate::error::{Result, RocketQaError};
use crate::predictor::Predictor;
use crate::tensor::Tensor;

/// Resolve a requested pool size; anything below 1 means one handle per CPU.
pub fn resolve_pool_size(requested: usize) -> usize {
    if requested < 1 {
        num_cpus::get()
    } else {
        requested
    }
}

/// Snapshot of pool usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub available: usize,
    pub in_use: usize,
    /// Highest number of handles checked out at the same time.
    pub peak_in_use: usize,
    pub total_acquired: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} in use (peak {}), {} acquisitions",
            self.in_use, self.size, self.peak_in_use, self.total_acquired
        )
    }
}

/// Fixed-size pool of exclusive predictor handles.
pub struct PredictorPool<P: Predictor> {
    /// Idle handles. Its length equals the semaphore's available permits
    /// whenever no checkout or return is in progress.
    free: Mutex<Vec<P>>,
    permits: Semaphore,
    size: usize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
    total_acquired: AtomicU64,
}

impl<P: Predictor> PredictorPool<P> {
    /// Build the main predictor from `config` and pre-warm `size` handles.
    ///
    /// A `size` of 0 defaults to the number of CPUs.
    ///
    /// # Errors
    ///
    /// Propagates the first failure to create or clone a handle.
    pub fn new(config: &P::Config, size: usize) -> Result<Self> {
        let main = P::create(config)?;
        Self::from_main(main, size)
    }

    /// Pre-warm a pool from an already created main predictor.
    pub fn from_main(main: P, size: usize) -> Result<Self> {
        let size = resolve_pool_size(size);
        let start = Instant::now();
        info!(size, "pre-warming predictor pool");

        let mut handles = Vec::with_capacity(size);
        for i in 1..size {
            let clone = main.try_clone().map_err(|e| {
                RocketQaError::Predictor(format!("failed to clone predictor {i} of {size}: {e}"))
            })?;
            debug!(handle = i, "cloned predictor");
            handles.push(clone);
        }
        handles.push(main);

        info!(
            size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "predictor pool ready"
        );

        Ok(Self {
            free: Mutex::new(handles),
            permits: Semaphore::new(size),
            size,
            in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
            total_acquired: AtomicU64::new(0),
        })
    }

    /// Wait until a handle is free and check it out.
    ///
    /// # Errors
    ///
    /// [`RocketQaError::PoolClosed`] if the pool is closed before a handle frees up.
    pub async fn acquire(&self) -> Result<PooledPredictor<'_, P>> {
        let permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(RocketQaError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                trace!(size = self.size, "waiting for a free predictor");
                self.permits
                    .acquire()
                    .await
                    .map_err(|_| RocketQaError::PoolClosed)?
            }
        };
        self.checkout(permit)
    }

    /// Like [`Self::acquire`], giving up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledPredictor<'_, P>> {
        match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => self.checkout(permit),
            Ok(Err(_)) => Err(RocketQaError::PoolClosed),
            Err(_) => {
                debug!(?timeout, "timed out waiting for a free predictor");
                Err(RocketQaError::PoolTimeout(timeout))
            }
        }
    }

    /// Check out a handle only if one is idle right now.
    pub fn try_acquire(&self) -> Result<Option<PooledPredictor<'_, P>>> {
        match self.permits.try_acquire() {
            Ok(permit) => self.checkout(permit).map(Some),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(RocketQaError::PoolClosed),
        }
    }

    /// Scoped checkout: run one inference on a pooled handle.
    pub async fn infer(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let mut predictor = self.acquire().await?;
        predictor.infer(inputs)
    }

    /// Reject all current and future waiters. Checked-out handles still return normally.
    pub fn close(&self) {
        if !self.permits.is_closed() {
            self.permits.close();
            info!(stats = %self.stats(), "predictor pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Total number of handles, fixed at construction.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of idle handles.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            available: self.available(),
            in_use: self.in_use.load(Ordering::SeqCst),
            peak_in_use: self.peak_in_use.load(Ordering::SeqCst),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
        }
    }

    fn checkout<'a>(&'a self, permit: SemaphorePermit<'a>) -> Result<PooledPredictor<'a, P>> {
        // a permit always has a matching idle handle
        let predictor = self.free.lock().pop().ok_or_else(|| {
            RocketQaError::Predictor("predictor pool free list is empty".to_string())
        })?;

        let in_use = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_use.fetch_max(in_use, Ordering::SeqCst);
        self.total_acquired.fetch_add(1, Ordering::Relaxed);

        Ok(PooledPredictor {
            pool: self,
            predictor: Some(predictor),
            _permit: permit,
        })
    }

    fn checkin(&self, predictor: P) {
        self.free.lock().push(predictor);
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<P: Predictor> fmt::Debug for PredictorPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictorPool")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Exclusive checkout of one pooled predictor.
///
/// Dereferences to the predictor. Dropping the guard returns the handle to
/// the pool first and releases its permit second.
pub struct PooledPredictor<'a, P: Predictor> {
    pool: &'a PredictorPool<P>,
    /// Only `None` once `Drop` has taken the handle back.
    predictor: Option<P>,
    _permit: SemaphorePermit<'a>,
}

impl<P: Predictor> PooledPredictor<'_, P> {
    /// Return the handle to the pool now. Same effect as dropping the guard.
    pub fn release(self) {}
}

impl<P: Predictor> fmt::Debug for PooledPredictor<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledPredictor")
            .field("pool_size", &self.pool.size)
            .finish_non_exhaustive()
    }
}

impl<P: Predictor> Deref for PooledPredictor<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        match &self.predictor {
            Some(p) => p,
            None => unreachable!("pooled predictor used after release"),
        }
    }
}

impl<P: Predictor> DerefMut for PooledPredictor<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        match &mut self.predictor {
            Some(p) => p,
            None => unreachable!("pooled predictor used after release"),
        }
    }
}

impl<P: Predictor> Drop for PooledPredictor<'_, P> {
    fn drop(&mut self) {
        if let Some(predictor) = self.predictor.take() {
            self.pool.checkin(predictor);
        }
        // the permit field is dropped after this body, once the handle is back
    }
}
