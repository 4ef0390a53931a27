//! Locally generated solo work.
//!
//! Produces valid work items without any network connectivity, useful for:
//! - exercising devices before a node or pool is configured
//! - keeping the orchestrator testable end to end
//!
//! Generated jobs carry monotonically increasing generation ids and heights.
//! The submit path verifies returned headers against the target and reports
//! the same sentinel conditions a real node would (`SameWork`, `Stale`), so
//! every classification path in the orchestrator is reachable locally.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::Result;
use crate::merkle::TxHashes;
use crate::tracing::prelude::*;
use crate::types::Hash32;
use crate::work::{
    HeaderTemplate, SourceMode, SubmissionRecord, SubmitError, WorkItem, WorkSource,
};

use async_trait::async_trait;

/// Build a target with `zero_bits` leading zero bits (little-endian compare).
///
/// `zero_bits = 0` accepts every hash; larger values are harder.
pub fn target_with_zero_bits(zero_bits: u32) -> Hash32 {
    let mut bytes = [0xffu8; 32];
    let full_bytes = (zero_bits / 8) as usize;
    let rem = zero_bits % 8;
    for byte in bytes.iter_mut().rev().take(full_bytes) {
        *byte = 0;
    }
    if rem > 0 && full_bytes < 32 {
        bytes[31 - full_bytes] = 0xff >> rem;
    }
    Hash32(bytes)
}

struct LocalState {
    next_id: u64,
    /// Height of the most recently issued job (0 before the first)
    height: u64,
    last_issue: Option<Instant>,
    /// Header hash of the last accepted block, for same-work detection
    last_accepted: Option<Hash32>,
}

/// Solo work source that fabricates jobs locally.
pub struct LocalJobSource {
    /// Minimum spacing between distinct jobs
    interval: Duration,
    target: Hash32,
    /// Per-process salt so synthetic transactions differ between runs
    salt: u64,
    state: Mutex<LocalState>,
}

impl LocalJobSource {
    pub fn new(interval: Duration, difficulty_bits: u32) -> Self {
        Self {
            interval,
            target: target_with_zero_bits(difficulty_bits),
            salt: rand::random(),
            state: Mutex::new(LocalState {
                next_id: 0,
                height: 0,
                last_issue: None,
                last_accepted: None,
            }),
        }
    }

    fn synthetic_transactions(&self, height: u64) -> Vec<TxHashes> {
        // Coinbase plus a small, height-dependent body.
        let count = 1 + (height % 3) as usize;
        (0..count)
            .map(|i| {
                let seed = [
                    self.salt.to_le_bytes(),
                    height.to_le_bytes(),
                    (i as u64).to_le_bytes(),
                ]
                .concat();
                TxHashes {
                    id: Hash32::double_sha256(&seed),
                    witness: Hash32::double_sha256(&[&seed[..], &[0xff]].concat()),
                }
            })
            .collect()
    }

    fn build_item(&self, id: u64, height: u64) -> WorkItem {
        let header = HeaderTemplate {
            version: 1,
            prev_block: Hash32::double_sha256(&height.to_le_bytes()),
            tx_root: Hash32::ZERO, // filled in by assemble_solo
            height,
            time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as u32,
            bits: 0x2000_ffff,
        };
        WorkItem::assemble_solo(id, header, self.target, self.synthetic_transactions(height))
    }
}

#[async_trait]
impl WorkSource for LocalJobSource {
    fn mode(&self) -> SourceMode {
        SourceMode::Solo
    }

    async fn fetch(&self) -> Result<Option<Arc<WorkItem>>> {
        let mut state = self.state.lock();
        if let Some(last) = state.last_issue {
            if last.elapsed() < self.interval {
                return Ok(None);
            }
        }

        state.next_id += 1;
        state.height += 1;
        state.last_issue = Some(Instant::now());
        let item = Arc::new(self.build_item(state.next_id, state.height));
        debug!(
            id = item.id(),
            height = state.height,
            "Generated local job"
        );
        Ok(Some(item))
    }

    async fn submit(&self, record: &SubmissionRecord) -> std::result::Result<(), SubmitError> {
        let SubmissionRecord::Solo { header, height, .. } = record else {
            return Err(SubmitError::Rejected(
                "local source only accepts solo blocks".into(),
            ));
        };

        let bytes = hex::decode(header)
            .map_err(|e| SubmitError::Rejected(format!("bad header encoding: {e}")))?;
        let hash = Hash32::double_sha256(&bytes);

        let mut state = self.state.lock();
        if *height < state.height {
            return Err(SubmitError::Stale);
        }
        if state.last_accepted == Some(hash) {
            return Err(SubmitError::SameWork);
        }
        if !hash.meets_target(&self.target) {
            return Err(SubmitError::Rejected("header hash above target".into()));
        }

        state.last_accepted = Some(hash);
        // A found block supersedes the current job immediately.
        state.last_issue = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::WorkPayload;

    fn source() -> LocalJobSource {
        // Zero interval and an accept-everything target keep tests direct.
        LocalJobSource::new(Duration::ZERO, 0)
    }

    #[tokio::test]
    async fn test_fetch_yields_monotonically_newer_jobs() {
        let source = source();
        let a = source.fetch().await.unwrap().unwrap();
        let b = source.fetch().await.unwrap().unwrap();
        assert!(b.id() > a.id());
        assert!(b.header().height > a.header().height);
    }

    #[tokio::test]
    async fn test_fetch_respects_interval() {
        let source = LocalJobSource::new(Duration::from_secs(3600), 0);
        assert!(source.fetch().await.unwrap().is_some());
        assert!(source.fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jobs_carry_coinbase_and_merkle_root() {
        let source = source();
        let item = source.fetch().await.unwrap().unwrap();
        let WorkPayload::Solo { transactions } = item.payload() else {
            panic!("local jobs are solo");
        };
        assert!(!transactions.is_empty());
        assert!(!item.header().tx_root.is_zero());
    }

    #[tokio::test]
    async fn test_submit_accepts_then_flags_same_work() {
        let source = source();
        let item = source.fetch().await.unwrap().unwrap();
        let record = item.submission(1);

        assert!(source.submit(&record).await.is_ok());
        assert!(matches!(
            source.submit(&record).await,
            Err(SubmitError::SameWork)
        ));
    }

    #[tokio::test]
    async fn test_submit_against_superseded_height_is_stale() {
        let source = source();
        let old = source.fetch().await.unwrap().unwrap();
        let _new = source.fetch().await.unwrap().unwrap();

        let record = old.submission(1);
        assert!(matches!(
            source.submit(&record).await,
            Err(SubmitError::Stale)
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_hash_above_target() {
        // 255 leading zero bits: nothing passes.
        let source = LocalJobSource::new(Duration::ZERO, 255);
        let item = source.fetch().await.unwrap().unwrap();
        let record = item.submission(1);
        assert!(matches!(
            source.submit(&record).await,
            Err(SubmitError::Rejected(_))
        ));
    }

    #[test]
    fn test_target_zero_bits_extremes() {
        assert_eq!(target_with_zero_bits(0), Hash32([0xff; 32]));
        let hard = target_with_zero_bits(32);
        assert_eq!(&hard.as_bytes()[28..], &[0, 0, 0, 0]);
        assert_eq!(hard.as_bytes()[27], 0xff);
    }
}
