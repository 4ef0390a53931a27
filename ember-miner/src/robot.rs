//! The mining orchestrator.
//!
//! [`Robot`] owns the device pool, the shutdown token, the global share
//! counters, and the work source. `run()` fans work out to devices on a
//! timer, fans submissions back in through one bounded channel, classifies
//! outcomes, and reports aggregate statistics until shutdown.
//!
//! The device list is frozen once setup completes, so every loop iterates it
//! without locking. Counters are atomics; a failing device is contained to
//! itself and never stops the pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::api::{self, AppState};
use crate::compute::ComputeBackend;
use crate::config::Config;
use crate::device::Device;
use crate::error::Result;
use crate::stats::ShareCounters;
use crate::tracing::prelude::*;
use crate::work::{SubmissionRecord, SubmitError, WorkSource};

const WORK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Orchestrates the device pool against one work source.
pub struct Robot {
    config: Arc<Config>,
    devices: Arc<Vec<Arc<Device>>>,
    backend: Arc<dyn ComputeBackend>,
    source: Arc<dyn WorkSource>,
    counters: Arc<ShareCounters>,
    /// Transactions carried by accepted solo blocks (excluding coinbase)
    total_transactions: Arc<AtomicU64>,
    /// Set after the first successful fetch; the status loop stays quiet
    /// until there is something to report.
    job_seen: Arc<AtomicBool>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    api_state: AppState,
}

impl Robot {
    /// Build the orchestrator. Devices are created from the backend's
    /// enumeration, one per compute unit, and stay fixed for the process
    /// lifetime. Fails only on configuration errors (unknown pow family).
    pub fn new(
        config: Arc<Config>,
        backend: Arc<dyn ComputeBackend>,
        source: Arc<dyn WorkSource>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let family = config.family()?;
        let devices: Vec<Arc<Device>> = backend
            .enumerate()
            .into_iter()
            .map(|descriptor| {
                Device::new(
                    descriptor,
                    family,
                    config.devices.intensity,
                    config.devices.work_size,
                )
            })
            .collect();

        Ok(Self {
            config,
            devices: Arc::new(devices),
            backend,
            source,
            counters: Arc::new(ShareCounters::new()),
            total_transactions: Arc::new(AtomicU64::new(0)),
            job_seen: Arc::new(AtomicBool::new(false)),
            shutdown,
            tracker: TaskTracker::new(),
            api_state: AppState::new(),
        })
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn counters(&self) -> Arc<ShareCounters> {
        self.counters.clone()
    }

    pub fn total_transactions(&self) -> Arc<AtomicU64> {
        self.total_transactions.clone()
    }

    /// Run until the shutdown token fires and every task has exited.
    pub async fn run(self) -> Result<()> {
        let mode = self.source.mode();
        info!(mode = %mode, devices = self.devices.len(), "Miner starting");

        // Reply-handling task supplied by the source (pool protocol); the
        // default solo implementation just waits for shutdown.
        self.tracker.spawn({
            let source = self.source.clone();
            let shutdown = self.shutdown.clone();
            async move {
                if let Err(e) = source.run(shutdown).await {
                    error!(error = %e, "Work source task failed");
                }
            }
        });

        // Initialization failures are contained: the device is marked
        // invalid and the rest of the pool keeps going.
        for device in self.devices.iter() {
            device.initialize(self.backend.as_ref()).await;
        }
        apply_allow_list(&self.devices, self.config.devices.allow.as_deref());
        self.api_state.register_devices(&self.devices).await;

        for device in self.devices.iter() {
            self.tracker
                .spawn(device.clone().mine(self.shutdown.clone()));
            self.tracker
                .spawn(device.clone().report_status(self.shutdown.clone()));
        }

        // Submission fan-in: one forwarding task per device, one bounded
        // sink. Capacity 1 keeps back-pressure end to end.
        let (sink_tx, sink_rx) = mpsc::channel(1);
        for device in self.devices.iter() {
            self.tracker.spawn(
                device
                    .clone()
                    .forward_shares(sink_tx.clone(), self.shutdown.clone()),
            );
        }
        drop(sink_tx);

        self.tracker.spawn(listen_work(
            self.devices.clone(),
            self.source.clone(),
            self.job_seen.clone(),
            self.shutdown.clone(),
        ));
        self.tracker.spawn(drain_submissions(
            self.source.clone(),
            self.counters.clone(),
            self.total_transactions.clone(),
            sink_rx,
            self.shutdown.clone(),
        ));
        self.tracker.spawn(report_status(
            self.source.clone(),
            self.counters.clone(),
            self.total_transactions.clone(),
            self.job_seen.clone(),
            self.api_state.clone(),
            self.shutdown.clone(),
        ));

        if let Some(stats) = &self.config.stats {
            let listen = stats.listen.clone();
            let state = self.api_state.clone();
            let shutdown = self.shutdown.clone();
            self.tracker.spawn(async move {
                if let Err(e) = api::serve(&listen, state, shutdown).await {
                    error!(error = %e, "Stats endpoint failed");
                }
            });
        }

        self.tracker.close();
        self.tracker.wait().await;

        // All loops have exited; contexts can be torn down deterministically.
        for device in self.devices.iter() {
            device.release().await;
        }
        info!("Miner stopped.");
        Ok(())
    }
}

/// Devices configured out of the allow-list never start mining.
fn apply_allow_list(devices: &[Arc<Device>], allow: Option<&[u32]>) {
    let Some(allow) = allow else { return };
    for device in devices {
        if !allow.contains(&device.id()) {
            device.mark_invalid();
            info!(
                device = device.id(),
                name = %device.name(),
                "Device excluded by allow-list"
            );
        }
    }
}

/// Work-refresh loop: poll the source and broadcast to every valid device.
///
/// Fetch failures are transient: the loop retries on the next tick and a
/// failed fetch never disturbs work already broadcast.
async fn listen_work(
    devices: Arc<Vec<Arc<Device>>>,
    source: Arc<dyn WorkSource>,
    job_seen: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    info!("Listening for new work");
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + WORK_POLL_INTERVAL,
        WORK_POLL_INTERVAL,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match source.fetch().await {
                    Ok(Some(item)) => {
                        job_seen.store(true, Ordering::Relaxed);
                        debug!(work = item.id(), height = item.header().height, "Broadcasting new work");
                        for device in devices.iter() {
                            if !device.is_valid() {
                                continue;
                            }
                            // A full inbound slot blocks the broadcast; the
                            // race keeps shutdown responsive regardless.
                            tokio::select! {
                                _ = shutdown.cancelled() => return,
                                delivered = device.set_work(item.clone()) => {
                                    if let Err(e) = delivered {
                                        debug!(device = device.id(), error = %e, "Work delivery failed");
                                    }
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(error = %e, "Work fetch failed; retrying on next tick");
                    }
                }
            }
        }
    }
}

/// Submission-drain loop: classify every record and keep the counters.
async fn drain_submissions(
    source: Arc<dyn WorkSource>,
    counters: Arc<ShareCounters>,
    total_transactions: Arc<AtomicU64>,
    mut sink_rx: mpsc::Receiver<SubmissionRecord>,
    shutdown: CancellationToken,
) {
    info!("Listening for submissions");
    loop {
        let record = tokio::select! {
            _ = shutdown.cancelled() => break,
            record = sink_rx.recv() => record,
        };
        let Some(record) = record else { break };
        handle_record(source.as_ref(), &counters, &total_transactions, record).await;
    }
}

/// Route one record to the source and classify the outcome.
async fn handle_record(
    source: &dyn WorkSource,
    counters: &ShareCounters,
    total_transactions: &AtomicU64,
    record: SubmissionRecord,
) {
    if matches!(record, SubmissionRecord::Discarded) {
        counters.record_stale();
        return;
    }

    match source.submit(&record).await {
        Ok(()) => {
            counters.record_accepted();
            match &record {
                SubmissionRecord::Solo {
                    height, tx_count, ..
                } => {
                    let total = total_transactions
                        .fetch_add(u64::from(*tx_count), Ordering::Relaxed)
                        + u64::from(*tx_count);
                    info!(
                        height,
                        transactions = tx_count,
                        total_transactions = total,
                        "Block accepted (transaction counts exclude coinbase)"
                    );
                }
                SubmissionRecord::Pool { job_id, .. } => {
                    debug!(job = %job_id, "Share accepted");
                }
                SubmissionRecord::Discarded => {}
            }
        }
        // Same work resubmitted: neither accepted nor rejected.
        Err(SubmitError::SameWork) => {
            debug!("Submission ignored: work unchanged");
        }
        Err(SubmitError::Stale) => {
            counters.record_stale();
            debug!("Submission was stale");
        }
        Err(e) => {
            counters.record_rejected();
            warn!(error = %e, "Submission rejected");
        }
    }
}

/// Periodic global summary, mirrored into the API state.
async fn report_status(
    source: Arc<dyn WorkSource>,
    counters: Arc<ShareCounters>,
    total_transactions: Arc<AtomicU64>,
    job_seen: Arc<AtomicBool>,
    api_state: AppState,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + STATUS_INTERVAL,
        STATUS_INTERVAL,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if !job_seen.load(Ordering::Relaxed) {
                    continue;
                }
                // Pool clients keep their own authoritative counters.
                let snapshot = match source.counters() {
                    Some(pool_counters) => pool_counters.snapshot(),
                    None => counters.snapshot(),
                };
                api_state
                    .update_stats(snapshot, total_transactions.load(Ordering::Relaxed))
                    .await;
                info!(
                    accepted = snapshot.accepted,
                    stale = snapshot.stale,
                    rejected = snapshot.rejected,
                    total = snapshot.total(),
                    "Global stats"
                );
            }
        }
    }
}
