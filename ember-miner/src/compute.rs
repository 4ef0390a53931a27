//! Compute backend contract and the CPU reference backend.
//!
//! The search kernel itself is a collaborator: the orchestrator only needs
//! enumeration, context acquisition, an opaque search operation, and
//! deterministic teardown. GPU backends (OpenCL, CUDA) implement these traits
//! out of tree; the [`CpuBackend`] here is a correctness reference that scans
//! nonces linearly with double SHA-256, in the spirit of the pack's baseline
//! CPU engines.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::pow::PowFamily;
use crate::types::Hash32;
use crate::work::WorkItem;

/// A detected compute unit, prior to acquisition.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Stable index for the process lifetime
    pub index: u32,
    /// Display name
    pub name: String,
}

/// Search-space parameters for one batch, derived from device tunables.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Nonces to cover in this batch (2^intensity)
    pub global_size: u64,
    /// Backend work-group hint
    pub local_size: u32,
}

/// A candidate solution from one search batch.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub nonce: u64,
    pub hash: Hash32,
}

/// Result of one search batch.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Candidates meeting the work item's target
    pub candidates: Vec<Candidate>,
    /// Normalized work units completed, for hash-rate accounting
    pub diff_one_shares: u64,
}

/// Acquired per-device compute resources (buffers, kernel, queue).
///
/// The search operation may block for substantial time per invocation;
/// callers race it against shutdown at a higher level.
#[async_trait]
pub trait ComputeContext: Send {
    /// Run one search batch over `work`.
    async fn search(&mut self, work: &WorkItem, params: &SearchParams) -> Result<SearchOutcome>;

    /// Tear down device resources. Called exactly once, at shutdown.
    async fn release(&mut self);
}

/// Factory for compute contexts.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Detected compute units, enumerated once at startup.
    fn enumerate(&self) -> Vec<DeviceDescriptor>;

    /// Acquire a context for one device. Failure is non-fatal to the
    /// process; the device is simply marked invalid.
    async fn acquire(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn ComputeContext>>;
}

/// CPU reference backend: linear double-SHA-256 scan.
pub struct CpuBackend {
    devices: u32,
    family: PowFamily,
}

/// Cap per batch so a context stays responsive to shutdown.
const CPU_BATCH_CAP: u64 = 1 << 16;
/// Yield to the runtime this often within a batch.
const CPU_YIELD_EVERY: u64 = 4096;

impl CpuBackend {
    pub fn new(devices: u32, family: PowFamily) -> Self {
        Self { devices, family }
    }
}

#[async_trait]
impl ComputeBackend for CpuBackend {
    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        (0..self.devices)
            .map(|index| DeviceDescriptor {
                index,
                name: format!("CPU reference #{index}"),
            })
            .collect()
    }

    async fn acquire(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn ComputeContext>> {
        if self.family != PowFamily::Blake2bD {
            // Cycle-finding kernels are GPU-only; there is no CPU reference.
            return Err(Error::Compute(format!(
                "family '{}' has no CPU reference kernel",
                self.family
            )));
        }
        Ok(Box::new(CpuContext {
            // Spread devices across the nonce space so they don't duplicate
            // each other's work.
            next_nonce: (descriptor.index as u64) << 40,
            released: false,
        }))
    }
}

struct CpuContext {
    next_nonce: u64,
    released: bool,
}

#[async_trait]
impl ComputeContext for CpuContext {
    async fn search(&mut self, work: &WorkItem, params: &SearchParams) -> Result<SearchOutcome> {
        if self.released {
            return Err(Error::Compute("context already released".into()));
        }

        let batch = params.global_size.min(CPU_BATCH_CAP);
        let mut outcome = SearchOutcome::default();
        let start = self.next_nonce;

        for i in 0..batch {
            let nonce = start.wrapping_add(i);
            let hash = Hash32::double_sha256(&work.encode_header(nonce));
            if hash.meets_target(work.target()) {
                outcome.candidates.push(Candidate { nonce, hash });
            }
            if i % CPU_YIELD_EVERY == CPU_YIELD_EVERY - 1 {
                tokio::task::yield_now().await;
            }
        }

        self.next_nonce = start.wrapping_add(batch);
        outcome.diff_one_shares = batch;
        Ok(outcome)
    }

    async fn release(&mut self) {
        self.released = true;
    }
}
