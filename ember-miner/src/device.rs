//! Device lifecycle, mining loop, and status reporting.
//!
//! One [`Device`] exists per physical compute unit for the process lifetime.
//! Work arrives through a single-slot inbound channel and results leave
//! through a single-slot outbound channel; both block their sender when full,
//! which is the only back-pressure mechanism in the pipeline. A stalled
//! consumer delays its producer instead of dropping anything.
//!
//! Per-device mutable state (validity, rate window) is touched only by the
//! device's own loops and the orchestrator's setup phase, so atomics and a
//! small state mutex suffice; there are no cross-device locks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::compute::{ComputeBackend, ComputeContext, DeviceDescriptor, SearchParams};
use crate::error::{Error, Result};
use crate::pow::PowFamily;
use crate::tracing::prelude::*;
use crate::types::{HashRate, HashRateTracker};
use crate::work::{SubmissionRecord, WorkItem};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);
/// Invalid devices stay quiet; back off instead of logging every tick.
const INVALID_BACKOFF: Duration = Duration::from_secs(2);
/// Intensity is a search-space exponent; clamp to keep 2^intensity in u64.
const MAX_INTENSITY: u32 = 48;

/// Device lifecycle state. `Invalid` is terminal for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Initializing,
    Valid,
    Invalid,
}

/// One compute unit and its mining state.
pub struct Device {
    descriptor: DeviceDescriptor,
    family: PowFamily,

    state: Mutex<DeviceState>,
    intensity: AtomicU32,
    work_size: AtomicU32,

    /// Set by `set_work` before the item is even delivered; cleared when the
    /// mine loop adopts it. While set, outbound submissions are stale.
    has_new_work: AtomicBool,
    current_work_id: AtomicU64,
    rate: HashRateTracker,

    context: tokio::sync::Mutex<Option<Box<dyn ComputeContext>>>,

    work_tx: mpsc::Sender<Arc<WorkItem>>,
    work_rx: Mutex<Option<mpsc::Receiver<Arc<WorkItem>>>>,
    submit_tx: mpsc::Sender<SubmissionRecord>,
    submit_rx: Mutex<Option<mpsc::Receiver<SubmissionRecord>>>,
}

impl Device {
    pub fn new(
        descriptor: DeviceDescriptor,
        family: PowFamily,
        intensity: u32,
        work_size: u32,
    ) -> Arc<Self> {
        // Single-slot channels: capacity 1 is load-bearing, the staleness
        // design depends on "at most one pending item" semantics.
        let (work_tx, work_rx) = mpsc::channel(1);
        let (submit_tx, submit_rx) = mpsc::channel(1);

        Arc::new(Self {
            descriptor,
            family,
            state: Mutex::new(DeviceState::Uninitialized),
            intensity: AtomicU32::new(intensity.min(MAX_INTENSITY)),
            work_size: AtomicU32::new(work_size),
            has_new_work: AtomicBool::new(false),
            current_work_id: AtomicU64::new(0),
            rate: HashRateTracker::new(),
            context: tokio::sync::Mutex::new(None),
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            submit_tx,
            submit_rx: Mutex::new(Some(submit_rx)),
        })
    }

    pub fn id(&self) -> u32 {
        self.descriptor.index
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn family(&self) -> PowFamily {
        self.family
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    pub fn is_valid(&self) -> bool {
        self.state() == DeviceState::Valid
    }

    /// Exclude this device from mining for the rest of the process lifetime.
    pub fn mark_invalid(&self) {
        *self.state.lock() = DeviceState::Invalid;
    }

    pub fn intensity(&self) -> u32 {
        self.intensity.load(Ordering::Relaxed)
    }

    pub fn set_intensity(&self, intensity: u32) {
        self.intensity
            .store(intensity.min(MAX_INTENSITY), Ordering::Relaxed);
    }

    pub fn work_size(&self) -> u32 {
        self.work_size.load(Ordering::Relaxed)
    }

    pub fn set_work_size(&self, work_size: u32) {
        self.work_size.store(work_size, Ordering::Relaxed);
    }

    pub fn average_rate(&self) -> HashRate {
        self.rate.average()
    }

    /// Acquire the compute context. Failure marks the device invalid and is
    /// contained: the rest of the pool keeps mining.
    pub async fn initialize(&self, backend: &dyn ComputeBackend) {
        *self.state.lock() = DeviceState::Initializing;

        match backend.acquire(&self.descriptor).await {
            Ok(ctx) => {
                *self.context.lock().await = Some(ctx);
                *self.state.lock() = DeviceState::Valid;
                debug!(device = self.id(), name = %self.name(), "Device initialized");
            }
            Err(e) => {
                *self.state.lock() = DeviceState::Invalid;
                warn!(
                    device = self.id(),
                    name = %self.name(),
                    error = %e,
                    "Device initialization failed; continuing without it"
                );
            }
        }
    }

    /// Publish a new work item to the device.
    ///
    /// Marks "newer work pending" immediately, before the mine loop picks the
    /// item up, and blocks while a previous item is still unconsumed.
    pub async fn set_work(&self, item: Arc<WorkItem>) -> Result<()> {
        self.has_new_work.store(true, Ordering::Release);
        self.work_tx
            .send(item)
            .await
            .map_err(|_| Error::Device(format!("device {} no longer accepts work", self.id())))
    }

    fn adopt(&self, item: &WorkItem) {
        self.current_work_id.store(item.id(), Ordering::Relaxed);
        self.has_new_work.store(false, Ordering::Release);
    }

    fn search_params(&self) -> SearchParams {
        SearchParams {
            global_size: 1u64 << self.intensity(),
            local_size: self.work_size(),
        }
    }

    /// The compute loop: adopt pending work, search, push submissions.
    ///
    /// Every blocking wait races the shutdown token. A full outbound slot
    /// blocks the loop, which is acceptable: a device can only usefully hold
    /// one unclaimed submission.
    pub async fn mine(self: Arc<Self>, shutdown: CancellationToken) {
        let Some(mut work_rx) = self.work_rx.lock().take() else {
            return;
        };
        if !self.is_valid() {
            return;
        }

        let mut current: Option<Arc<WorkItem>> = None;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Pick up anything pending between batches; newest wins.
            loop {
                match work_rx.try_recv() {
                    Ok(item) => {
                        self.adopt(&item);
                        current = Some(item);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }

            let Some(work) = current.clone() else {
                // Nothing to mine yet; wait for the first item.
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    item = work_rx.recv() => match item {
                        Some(item) => {
                            self.adopt(&item);
                            current = Some(item);
                        }
                        None => break,
                    }
                }
                continue;
            };

            let params = self.search_params();
            let outcome = {
                let mut guard = self.context.lock().await;
                let Some(ctx) = guard.as_mut() else {
                    break;
                };
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = ctx.search(&work, &params) => result,
                }
            };

            match outcome {
                Ok(outcome) => {
                    self.rate.record(outcome.diff_one_shares);
                    for candidate in outcome.candidates {
                        debug!(
                            device = self.id(),
                            work = work.id(),
                            nonce = format!("{:#x}", candidate.nonce),
                            hash = %candidate.hash,
                            "Candidate found"
                        );
                        let record = work.submission(candidate.nonce);
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            sent = self.submit_tx.send(record) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        device = self.id(),
                        error = %e,
                        "Search failed; marking device invalid"
                    );
                    self.mark_invalid();
                    break;
                }
            }
        }
    }

    /// Periodic hash-rate report.
    pub async fn report_status(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + STATUS_INTERVAL,
            STATUS_INTERVAL,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.is_valid() {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(INVALID_BACKOFF) => {}
                        }
                        continue;
                    }
                    if let Some(rate) = self.rate.sample() {
                        info!(
                            device = self.id(),
                            name = %self.name(),
                            rate = %rate.format(self.family.rate_unit()),
                            "Device hash rate"
                        );
                    }
                }
            }
        }
    }

    /// Forward outbound submissions to the shared sink, dropping any record
    /// produced while newer work was already pending; that result was
    /// computed against superseded work and must not be submitted.
    pub async fn forward_shares(
        self: Arc<Self>,
        sink: mpsc::Sender<SubmissionRecord>,
        shutdown: CancellationToken,
    ) {
        let Some(mut submit_rx) = self.submit_rx.lock().take() else {
            return;
        };

        loop {
            let record = tokio::select! {
                _ = shutdown.cancelled() => break,
                record = submit_rx.recv() => record,
            };
            let Some(record) = record else {
                break;
            };

            if self.has_new_work.load(Ordering::Acquire) {
                trace!(
                    device = self.id(),
                    "Dropping submission computed against superseded work"
                );
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                sent = sink.send(record) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Tear down the compute context. Safe to call more than once; the
    /// second call finds nothing to release.
    pub async fn release(&self) {
        if let Some(mut ctx) = self.context.lock().await.take() {
            ctx.release().await;
            debug!(device = self.id(), "Compute context released");
        }
    }
}

#[cfg(test)]
impl Device {
    pub(crate) fn state_for_tests(&self) -> parking_lot::MutexGuard<'_, DeviceState> {
        self.state.lock()
    }

    pub(crate) fn work_receiver_for_tests(&self) -> mpsc::Receiver<Arc<WorkItem>> {
        self.work_rx.lock().take().unwrap()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
