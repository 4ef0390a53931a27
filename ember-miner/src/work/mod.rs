//! Work items, submission records, and the work source contract.
//!
//! The orchestrator depends only on the [`WorkSource`] trait; solo RPC and
//! pool protocol clients implement it externally. A [`LocalJobSource`] is
//! provided for running without network connectivity and for tests.

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::merkle::{self, TxHashes};
use crate::stats::ShareCounters;
use crate::types::Hash32;

pub use local::LocalJobSource;

/// Where work comes from and where solutions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Mining against a node, submitting complete blocks
    Solo,
    /// Mining against a pool, submitting partial-difficulty shares
    Pool,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMode::Solo => write!(f, "solo"),
            SourceMode::Pool => write!(f, "pool"),
        }
    }
}

/// Block header template carried by a work item.
///
/// The transaction merkle root is computed once, when the work item is
/// assembled, and never changes afterwards.
#[derive(Debug, Clone)]
pub struct HeaderTemplate {
    pub version: u32,
    pub prev_block: Hash32,
    pub tx_root: Hash32,
    pub height: u64,
    pub time: u32,
    pub bits: u32,
}

/// Mode-specific job parameters.
#[derive(Debug, Clone)]
pub enum WorkPayload {
    /// Solo job: the block body, coinbase first
    Solo { transactions: Vec<TxHashes> },
    /// Pool job: parameters assigned by the pool protocol
    Pool { job_id: String, extranonce2: String },
}

/// One mining job, immutable once published.
///
/// A new job is always a new `WorkItem` behind a fresh `Arc`; devices holding
/// a reference never observe a job changing underneath them. `id` is a
/// monotonically increasing generation marker used for staleness detection.
#[derive(Debug)]
pub struct WorkItem {
    id: u64,
    header: HeaderTemplate,
    target: Hash32,
    payload: WorkPayload,
}

/// Fixed header encoding searched by compute backends:
/// version ‖ prev_block ‖ tx_root ‖ time ‖ bits ‖ height ‖ nonce,
/// integers little-endian.
pub const HEADER_LEN: usize = 4 + 32 + 32 + 4 + 4 + 8 + 8;

impl WorkItem {
    /// Assemble a solo work item, computing the merkle root from the ordered
    /// transaction list (coinbase first).
    pub fn assemble_solo(
        id: u64,
        mut header: HeaderTemplate,
        target: Hash32,
        transactions: Vec<TxHashes>,
    ) -> Self {
        header.tx_root = merkle::merkle_root(&transactions, false);
        Self {
            id,
            header,
            target,
            payload: WorkPayload::Solo { transactions },
        }
    }

    /// Wrap a pool-assigned job. The header template arrives fully formed
    /// from the pool, merkle root included.
    pub fn from_pool_job(
        id: u64,
        header: HeaderTemplate,
        target: Hash32,
        job_id: String,
        extranonce2: String,
    ) -> Self {
        Self {
            id,
            header,
            target,
            payload: WorkPayload::Pool { job_id, extranonce2 },
        }
    }

    /// Generation marker; newer jobs always carry larger ids.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn header(&self) -> &HeaderTemplate {
        &self.header
    }

    pub fn target(&self) -> &Hash32 {
        &self.target
    }

    pub fn payload(&self) -> &WorkPayload {
        &self.payload
    }

    /// Serialize the header with the given nonce for hashing or submission.
    pub fn encode_header(&self, nonce: u64) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.header.version.to_le_bytes());
        bytes[4..36].copy_from_slice(self.header.prev_block.as_bytes());
        bytes[36..68].copy_from_slice(self.header.tx_root.as_bytes());
        bytes[68..72].copy_from_slice(&self.header.time.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.header.bits.to_le_bytes());
        bytes[76..84].copy_from_slice(&self.header.height.to_le_bytes());
        bytes[84..92].copy_from_slice(&nonce.to_le_bytes());
        bytes
    }

    /// Build the submission record for a candidate nonce found against this
    /// work item.
    pub fn submission(&self, nonce: u64) -> SubmissionRecord {
        match &self.payload {
            WorkPayload::Solo { transactions } => SubmissionRecord::Solo {
                header: hex::encode(self.encode_header(nonce)),
                height: self.header.height,
                // Coinbase is not reported in the acceptance total.
                tx_count: transactions.len().saturating_sub(1) as u32,
            },
            WorkPayload::Pool { job_id, extranonce2 } => SubmissionRecord::Pool {
                job_id: job_id.clone(),
                extranonce2: extranonce2.clone(),
                ntime: self.header.time,
                nonce,
            },
        }
    }
}

/// A candidate solution with enough context to route and log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionRecord {
    /// Sentinel for a result discarded before submission; counted as stale.
    Discarded,
    /// Complete block for solo submission
    Solo {
        header: String,
        height: u64,
        tx_count: u32,
    },
    /// Partial-difficulty share for pool submission
    Pool {
        job_id: String,
        extranonce2: String,
        ntime: u32,
        nonce: u64,
    },
}

/// Submission outcomes the orchestrator classifies.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// The work was already submitted; neither accepted nor rejected.
    #[error("work unchanged since previous submission")]
    SameWork,

    /// The work was superseded before the submission landed.
    #[error("submitted against stale work")]
    Stale,

    /// Any other refusal from the node or pool.
    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// Abstraction over "get next work" and "submit solution".
///
/// `fetch` returns promptly: `Ok(None)` means "no new work available now",
/// not an error. A returned item is always strictly newer than any previous
/// one (monotonic generation ids, by construction of the implementations).
#[async_trait]
pub trait WorkSource: Send + Sync {
    fn mode(&self) -> SourceMode;

    /// Fetch the next work item, if a new one is available.
    async fn fetch(&self) -> Result<Option<Arc<WorkItem>>>;

    /// Submit a candidate solution.
    async fn submit(&self, record: &SubmissionRecord) -> std::result::Result<(), SubmitError>;

    /// Source-side share counters, when the source keeps its own (pool
    /// protocol clients do; the status loop prefers these in pool mode).
    fn counters(&self) -> Option<Arc<ShareCounters>> {
        None
    }

    /// Reply-handling task for sources that need one (pool protocol).
    ///
    /// The orchestrator spawns this once at startup and lets it run until
    /// shutdown. The default is a no-op that waits for cancellation.
    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        shutdown.cancelled().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(seed: u8) -> TxHashes {
        TxHashes {
            id: Hash32::double_sha256(&[seed]),
            witness: Hash32::double_sha256(&[seed, 0xff]),
        }
    }

    fn header() -> HeaderTemplate {
        HeaderTemplate {
            version: 1,
            prev_block: Hash32::double_sha256(b"prev"),
            tx_root: Hash32::ZERO,
            height: 42,
            time: 1_700_000_000,
            bits: 0x2000ffff,
        }
    }

    #[test]
    fn test_assemble_solo_computes_merkle_root() {
        let txs = vec![tx(0), tx(1), tx(2)];
        let item = WorkItem::assemble_solo(1, header(), Hash32([0xff; 32]), txs.clone());
        assert_eq!(item.header().tx_root, crate::merkle::merkle_root(&txs, false));
        assert!(!item.header().tx_root.is_zero());
    }

    #[test]
    fn test_encode_header_layout() {
        let item = WorkItem::assemble_solo(1, header(), Hash32([0xff; 32]), vec![tx(0)]);
        let bytes = item.encode_header(0xdead_beef);
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[76..84], &42u64.to_le_bytes());
        assert_eq!(&bytes[84..92], &0xdead_beefu64.to_le_bytes());
    }

    #[test]
    fn test_solo_submission_excludes_coinbase_from_tx_count() {
        let txs = vec![tx(0), tx(1), tx(2), tx(3)];
        let item = WorkItem::assemble_solo(7, header(), Hash32([0xff; 32]), txs);
        match item.submission(99) {
            SubmissionRecord::Solo {
                height, tx_count, ..
            } => {
                assert_eq!(height, 42);
                assert_eq!(tx_count, 3);
            }
            other => panic!("expected solo record, got {other:?}"),
        }
    }

    #[test]
    fn test_pool_submission_carries_job_parameters() {
        let item = WorkItem::from_pool_job(
            3,
            header(),
            Hash32([0xff; 32]),
            "job-9".into(),
            "0a0b".into(),
        );
        match item.submission(5) {
            SubmissionRecord::Pool { job_id, nonce, .. } => {
                assert_eq!(job_id, "job-9");
                assert_eq!(nonce, 5);
            }
            other => panic!("expected pool record, got {other:?}"),
        }
    }
}
