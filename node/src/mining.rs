use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use picochain_core::consensus::{self, PendingBlock};
use picochain_core::{Block, ChainError};

use crate::{NodeHandle, MINING_INTERVAL_SECONDS};

/// Periodically turns the pending pool into a mined block. A block arriving
/// from sync while a search is running cancels that search via a child token
/// and archives the peer's transactions so they are not mined twice.
pub async fn mining_task(
    node: NodeHandle,
    cancel: CancellationToken,
    mut synced_blocks: mpsc::Receiver<Block>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(MINING_INTERVAL_SECONDS));
    ticker.tick().await;

    let mut current_round: Option<CancellationToken> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let has_pending = !node.mempool.lock().unwrap().pending_is_empty();
                if has_pending && !node.is_mining.load(Ordering::SeqCst) {
                    node.is_mining.store(true, Ordering::SeqCst);

                    let round_cancel = cancel.child_token();
                    current_round = Some(round_cancel.clone());

                    let node = node.clone();
                    tokio::spawn(async move {
                        if let Err(e) = mine_pending_txs(&node, round_cancel).await {
                            match e.downcast_ref::<ChainError>() {
                                Some(ChainError::MiningCancelled) => {}
                                _ => log::error!(
                                    "an error occurred while mining pending transactions: {}",
                                    e
                                ),
                            }
                        }
                        node.is_mining.store(false, Ordering::SeqCst);
                    });
                }
            }
            Some(block) = synced_blocks.recv() => {
                if node.is_mining.load(Ordering::SeqCst) {
                    if let Ok(hash) = block.hash() {
                        log::info!("another peer mined the next block '{}' faster", hash);
                    }
                    if let Some(round) = current_round.take() {
                        round.cancel();
                    }
                }
                if let Err(e) = node.mempool.lock().unwrap().remove_mined(&block) {
                    log::warn!("failed to archive synced block txs: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                log::info!("mining task shutting down");
                return;
            }
        }
    }
}

async fn mine_pending_txs(node: &NodeHandle, cancel: CancellationToken) -> anyhow::Result<()> {
    let (parent, number, difficulty) = {
        let state = node.state.lock().unwrap();
        (
            state.latest_block_hash(),
            state.next_block_number(),
            state.mining_difficulty(),
        )
    };
    let txs = node.mempool.lock().unwrap().pending_txs();

    let pending = PendingBlock::new(parent, number, node.info.account, txs);
    let mined =
        tokio::task::spawn_blocking(move || consensus::mine(pending, difficulty, &cancel))
            .await??;

    node.mempool.lock().unwrap().remove_mined(&mined)?;
    node.state.lock().unwrap().add_block(mined)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use picochain_core::{wallet, Account, State, Tx};
    use secp256k1::SecretKey;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    use crate::mempool::Mempool;
    use crate::{NodeHandles, PeerNode};

    struct TestNode {
        node: NodeHandle,
        secret: SecretKey,
        sender: Account,
        _pending_rx: mpsc::Receiver<picochain_core::SignedTx>,
    }

    fn test_node(name: &str) -> TestNode {
        let data_dir = std::env::temp_dir().join(format!("picochain_test_mining_{}", name));
        let _ = std::fs::remove_dir_all(&data_dir);

        let secret = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
        let sender = wallet::account_from_secret(&secret);

        let genesis = format!("{{\"balances\":{{\"{}\":1000000}},\"forkTIP1\":0}}", sender);
        picochain_core::fs::init_data_dir_if_not_exists(&data_dir, genesis.as_bytes()).unwrap();
        let state = State::new_from_disk(&data_dir, 1).unwrap();

        // nothing in these tests publishes synced blocks
        let (synced_tx, _) = mpsc::channel(1);
        let (pending_tx, pending_rx) = mpsc::channel(16);

        let node = Arc::new(NodeHandles {
            data_dir: PathBuf::from(&data_dir),
            info: PeerNode::new("127.0.0.1", 8085, false, sender, false, "1"),
            state: Mutex::new(state),
            mempool: Mutex::new(Mempool::new(pending_tx)),
            peers: Mutex::new(HashMap::new()),
            is_mining: AtomicBool::new(false),
            synced_blocks_tx: synced_tx,
        });
        TestNode {
            node,
            secret,
            sender,
            _pending_rx: pending_rx,
        }
    }

    fn transfer(test: &TestNode, value: u64, nonce: u64) -> picochain_core::SignedTx {
        let mut tx = Tx::base(test.sender, test.sender, value, nonce, "");
        tx.time = 1700000000 + nonce;
        wallet::sign_tx(tx, &test.secret).unwrap()
    }

    fn queue(test: &TestNode, tx: picochain_core::SignedTx) {
        test.node
            .mempool
            .lock()
            .unwrap()
            .add_pending(tx, "self")
            .unwrap();
    }

    #[tokio::test]
    async fn mines_pending_txs_into_a_block() {
        let test = test_node("mine");
        queue(&test, transfer(&test, 3, 1));

        mine_pending_txs(&test.node, CancellationToken::new())
            .await
            .unwrap();

        let state = test.node.state.lock().unwrap();
        assert_eq!(state.latest_block().header.number, 0);
        assert_eq!(state.next_account_nonce(&test.sender), 2);
        // value went back to the sender, who also pockets reward and gas
        assert_eq!(state.balances()[&test.sender], 1_000_100);
        assert!(test.node.mempool.lock().unwrap().pending_is_empty());

        let _ = std::fs::remove_dir_all(&test.node.data_dir);
    }

    #[tokio::test]
    async fn cancelled_round_leaves_state_untouched() {
        let test = test_node("cancel");
        queue(&test, transfer(&test, 3, 1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = mine_pending_txs(&test.node, cancel).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChainError>(),
            Some(ChainError::MiningCancelled)
        ));

        let state = test.node.state.lock().unwrap();
        assert!(!state.has_genesis_block());
        assert_eq!(test.node.mempool.lock().unwrap().pending_count(), 1);

        let _ = std::fs::remove_dir_all(&test.node.data_dir);
    }

    #[tokio::test]
    async fn synced_block_cancels_and_archives() {
        // a peer mines T1 first; our node archives T1 and keeps only T2
        let test = test_node("race");
        let t1 = transfer(&test, 3, 1);
        queue(&test, t1.clone());
        queue(&test, transfer(&test, 4, 2));

        // identical signed bytes, so the hash matches the queued T1
        let peer_tx = t1;
        let peer_block = {
            let state = test.node.state.lock().unwrap();
            let pending = PendingBlock::new(
                state.latest_block_hash(),
                state.next_block_number(),
                test.sender,
                vec![peer_tx],
            );
            consensus::mine(pending, 1, &CancellationToken::new()).unwrap()
        };

        test.node
            .state
            .lock()
            .unwrap()
            .add_block(peer_block.clone())
            .unwrap();
        test.node
            .mempool
            .lock()
            .unwrap()
            .remove_mined(&peer_block)
            .unwrap();

        // the remaining pending tx still mines into the next block
        assert_eq!(test.node.mempool.lock().unwrap().pending_count(), 1);
        mine_pending_txs(&test.node, CancellationToken::new())
            .await
            .unwrap();

        let state = test.node.state.lock().unwrap();
        assert_eq!(state.latest_block().header.number, 1);
        assert_eq!(state.next_account_nonce(&test.sender), 3);
        assert!(test.node.mempool.lock().unwrap().pending_is_empty());

        let _ = std::fs::remove_dir_all(&test.node.data_dir);
    }
}
