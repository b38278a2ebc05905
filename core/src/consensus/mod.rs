use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::account::Account;
use crate::block::Block;
use crate::error::ChainError;
use crate::hash::{is_block_hash_valid, Hash};
use crate::tx::SignedTx;

/// Everything that is fixed before the proof-of-work search starts. The
/// block time is stamped here, not per attempt, so retries hash the same
/// payload with only the nonce varying.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub parent: Hash,
    pub number: u64,
    pub time: u64,
    pub miner: Account,
    pub txs: Vec<SignedTx>,
}

impl PendingBlock {
    pub fn new(parent: Hash, number: u64, miner: Account, txs: Vec<SignedTx>) -> Self {
        PendingBlock {
            parent,
            number,
            time: chrono::Utc::now().timestamp() as u64,
            miner,
            txs,
        }
    }
}

/// Searches for a nonce whose block hash satisfies the difficulty predicate.
/// CPU-bound; run it under `spawn_blocking`. The cancel token is polled on
/// every attempt so a synced block or shutdown stops the search promptly.
///
/// Nonces are drawn at random per attempt; proof-of-work needs no
/// cryptographic randomness, only spread.
pub fn mine(
    pending: PendingBlock,
    difficulty: u64,
    cancel: &CancellationToken,
) -> Result<Block, ChainError> {
    if pending.txs.is_empty() {
        return Err(ChainError::EmptyBlock);
    }

    let start = std::time::Instant::now();
    let mut rng = rand::thread_rng();
    let mut attempt: u64 = 0;

    let mut block = Block::new(
        pending.parent,
        pending.number,
        0,
        pending.time,
        pending.miner,
        pending.txs,
    );

    loop {
        if cancel.is_cancelled() {
            log::info!("mining cancelled");
            return Err(ChainError::MiningCancelled);
        }

        attempt += 1;
        if attempt == 1 || attempt % 1_000_000 == 0 {
            log::info!(
                "mining {} pending transactions, attempt {}",
                block.txs.len(),
                attempt
            );
        }

        block.header.nonce = rng.gen();
        let hash = block.hash()?;

        if is_block_hash_valid(&hash, difficulty) {
            log::info!(
                "mined new block '{}' with proof-of-work: height {}, nonce {}, attempts {}, took {:?}",
                hash,
                block.header.number,
                block.header.nonce,
                attempt,
                start.elapsed()
            );
            return Ok(block);
        }
    }
}
