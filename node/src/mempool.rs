use std::collections::HashMap;

use tokio::sync::mpsc;

use picochain_core::{Block, ChainError, SignedTx};

/// Pending transactions keyed by signed-tx hash, plus an archive of hashes
/// that already made it into a block. The archive is the replay shield: a
/// transaction re-submitted anywhere after it was mined is a no-op.
/// Process-local and non-durable; pending txs die with the node.
pub struct Mempool {
    pending: HashMap<String, SignedTx>,
    archive: HashMap<String, SignedTx>,
    new_pending_txs: mpsc::Sender<SignedTx>,
}

impl Mempool {
    pub fn new(new_pending_txs: mpsc::Sender<SignedTx>) -> Self {
        Mempool {
            pending: HashMap::new(),
            archive: HashMap::new(),
            new_pending_txs,
        }
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of the pending set, in no particular order.
    pub fn pending_txs(&self) -> Vec<SignedTx> {
        self.pending.values().cloned().collect()
    }

    pub fn is_archived(&self, tx_hash_hex: &str) -> bool {
        self.archive.contains_key(tx_hash_hex)
    }

    /// Adds a transaction unless its hash is already pending or archived.
    /// Returns whether the transaction was actually added.
    pub fn add_pending(&mut self, tx: SignedTx, from_peer: &str) -> Result<bool, ChainError> {
        let tx_hash = tx.hash()?.hex();

        if self.pending.contains_key(&tx_hash) || self.archive.contains_key(&tx_hash) {
            return Ok(false);
        }

        log::info!("added pending TX '{}' from peer '{}'", tx_hash, from_peer);

        // signal-only channel: non-blocking send, overflow drops
        if let Err(e) = self.new_pending_txs.try_send(tx.clone()) {
            log::debug!("pending TX signal dropped: {}", e);
        }

        self.pending.insert(tx_hash, tx);
        Ok(true)
    }

    /// Archives every transaction of a freshly added block and drops it from
    /// the pending set.
    pub fn remove_mined(&mut self, block: &Block) -> Result<(), ChainError> {
        if !block.txs.is_empty() && !self.pending.is_empty() {
            log::info!("removing mined TXs from the in-memory pending pool");
        }

        for tx in &block.txs {
            let tx_hash = tx.hash()?.hex();
            if self.pending.remove(&tx_hash).is_some() {
                log::info!("archiving mined TX '{}'", tx_hash);
            }
            self.archive.insert(tx_hash, tx.clone());
        }

        Ok(())
    }
}
