//! CPU slices for benchmark sandboxes.
//!
//! [`allocate`] is the pure position arithmetic; [`CpuLedger`] is the
//! process-wide bookkeeping that keeps two live sandboxes off the same CPUs.
use rbs_exec::SandboxHandle;
use rbs_model::{CpuRequest, CpuSlice};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CpuError {
    #[error("invalid cpu request: {0}")]
    InvalidRequest(String),
    #[error("slice {slice} exceeds the pool of {pool} cpus")]
    ExceedsPool { slice: CpuSlice, pool: usize },
    #[error("slice {slice} overlaps live reservation {live}")]
    Overlap { slice: CpuSlice, live: CpuSlice },
}

/// Contiguous slice of `ceil(request)` CPUs starting at `position`, plus the
/// position the next slice starts at.
pub fn allocate(request: CpuRequest, position: usize) -> Result<(CpuSlice, usize), CpuError> {
    let count = request
        .whole_cpus()
        .map_err(|e| CpuError::InvalidRequest(e.to_string()))?;
    let end = position.checked_add(count).ok_or_else(|| {
        CpuError::InvalidRequest(format!("{} cpus from position {position}", request.0))
    })?;
    Ok((CpuSlice::new(position, end), end))
}

/// A sandbox whose stop was not confirmed, with the slices it still pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredStop {
    pub handle: SandboxHandle,
    pub slices: Vec<CpuSlice>,
}

/// Live CPU reservations of this process.
#[derive(Debug)]
pub struct CpuLedger {
    pool: usize,
    live: Vec<CpuSlice>,
    deferred: Vec<DeferredStop>,
}

impl CpuLedger {
    pub fn new(pool: usize) -> Self {
        Self {
            pool,
            live: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn reserve(&mut self, slice: CpuSlice) -> Result<(), CpuError> {
        if slice.end > self.pool {
            return Err(CpuError::ExceedsPool {
                slice,
                pool: self.pool,
            });
        }
        if let Some(live) = self.live.iter().find(|l| l.overlaps(&slice)) {
            return Err(CpuError::Overlap { slice, live: *live });
        }
        debug!(target: "rbs.core.cpu", %slice, "cpus reserved");
        self.live.push(slice);
        Ok(())
    }

    /// Return a slice to the pool. Releasing an unknown slice is a no-op.
    pub fn release(&mut self, slice: CpuSlice) {
        if let Some(idx) = self.live.iter().position(|l| *l == slice) {
            self.live.swap_remove(idx);
            debug!(target: "rbs.core.cpu", %slice, "cpus released");
        }
    }

    /// Keep `slices` reserved until `handle` is confirmed stopped.
    pub fn defer(&mut self, handle: SandboxHandle, slices: Vec<CpuSlice>) {
        warn!(
            target: "rbs.core.cpu",
            ?handle,
            ?slices,
            "sandbox stop unconfirmed; keeping cpus reserved"
        );
        self.deferred.push(DeferredStop { handle, slices });
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredStop> {
        std::mem::take(&mut self.deferred)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Number of CPUs not covered by a live reservation.
    pub fn available(&self) -> usize {
        let used: usize = self.live.iter().map(CpuSlice::len).sum();
        self.pool.saturating_sub(used)
    }

    pub fn is_reserved(&self, slice: &CpuSlice) -> bool {
        self.live.contains(slice)
    }
}
