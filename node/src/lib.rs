pub mod mempool;
pub mod messages;
pub mod mining;
pub mod server;
pub mod sync;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use picochain_core::{Account, Block, State};

use crate::mempool::Mempool;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u64 = 8080;
pub const HTTPS_PORT: u64 = 443;

pub const MINING_INTERVAL_SECONDS: u64 = 10;
pub const SYNC_INTERVAL_SECONDS: u64 = 10;

/// Buffered capacity of the new-pending-tx signal channel. Sends are
/// non-blocking and drop on overflow.
pub const PENDING_TX_CHANNEL_CAPACITY: usize = 10_000;

pub const VERSION_MAJOR: &str = "1";
pub const VERSION_MINOR: &str = "0";
pub const VERSION_FIX: &str = "0";
pub const VERSION_VERBAL: &str = "TX Gas";

/// `"<major>.<minor>.<fix>-alpha <short_git_commit> <verbal>"`. The commit
/// comes from the GIT_COMMIT env var at build time; shorter than six chars
/// means no commit is shown.
pub fn version() -> String {
    let commit = option_env!("GIT_COMMIT").unwrap_or("");
    let short = if commit.len() >= 6 { &commit[..6] } else { "" };
    format!(
        "{}.{}.{}-alpha {} {}",
        VERSION_MAJOR, VERSION_MINOR, VERSION_FIX, short, VERSION_VERBAL
    )
}

/// A peer as it travels over the wire and sits in the known-peers table.
/// `connected` is process-local bookkeeping and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerNode {
    pub ip: String,
    pub port: u64,
    pub is_bootstrap: bool,
    pub account: Account,
    pub node_version: String,
    #[serde(skip)]
    pub connected: bool,
}

impl PeerNode {
    pub fn new(
        ip: &str,
        port: u64,
        is_bootstrap: bool,
        account: Account,
        connected: bool,
        node_version: &str,
    ) -> Self {
        PeerNode {
            ip: ip.to_string(),
            port,
            is_bootstrap,
            account,
            node_version: node_version.to_string(),
            connected,
        }
    }

    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Peers serving on 443 are reached over https, everything else plain
    /// http.
    pub fn api_protocol(&self) -> &'static str {
        if self.port == HTTPS_PORT {
            "https"
        } else {
            "http"
        }
    }
}

// Shared, mutex-guarded node internals. Locks are held briefly and never
// across awaits; every add_block goes through the state mutex.
pub struct NodeHandles {
    pub data_dir: PathBuf,
    pub info: PeerNode,
    pub state: Mutex<State>,
    pub mempool: Mutex<Mempool>,
    pub peers: Mutex<HashMap<String, PeerNode>>,
    pub is_mining: AtomicBool,
    pub synced_blocks_tx: mpsc::Sender<Block>,
}

pub type NodeHandle = Arc<NodeHandles>;

/// The node runtime: boots the state from disk, then runs the sync task,
/// the mining task and the HTTP API until cancelled.
pub struct Node {
    data_dir: PathBuf,
    info: PeerNode,
    bootstrap: PeerNode,
    mining_difficulty: u64,
}

impl Node {
    pub fn new(
        data_dir: PathBuf,
        ip: &str,
        port: u64,
        miner: Account,
        bootstrap: PeerNode,
        mining_difficulty: u64,
    ) -> Self {
        Node {
            data_dir,
            info: PeerNode::new(ip, port, false, miner, false, &version()),
            bootstrap,
            mining_difficulty,
        }
    }

    pub async fn run(
        self,
        cancel: CancellationToken,
        ssl_disabled: bool,
        ssl_email: &str,
    ) -> anyhow::Result<()> {
        log::info!(
            "launching node version '{}', listening on {}:{}",
            self.info.node_version,
            self.info.ip,
            self.info.port
        );

        let state = State::new_from_disk(&self.data_dir, self.mining_difficulty)?;
        log::info!(
            "blockchain state loaded, latest block hash '{}'",
            state.latest_block_hash()
        );

        let (synced_blocks_tx, synced_blocks_rx) = mpsc::channel(1);
        let (pending_txs_tx, pending_txs_rx) = mpsc::channel(PENDING_TX_CHANNEL_CAPACITY);

        let mut peers = HashMap::new();
        if !self.bootstrap.ip.is_empty() {
            peers.insert(self.bootstrap.tcp_address(), self.bootstrap.clone());
        }

        let node: NodeHandle = Arc::new(NodeHandles {
            data_dir: self.data_dir,
            info: self.info,
            state: Mutex::new(state),
            mempool: Mutex::new(Mempool::new(pending_txs_tx)),
            peers: Mutex::new(peers),
            is_mining: AtomicBool::new(false),
            synced_blocks_tx,
        });

        tokio::spawn(sync::sync_task(node.clone(), cancel.clone()));
        tokio::spawn(mining::mining_task(node.clone(), cancel.clone(), synced_blocks_rx));

        // the pending-tx channel is a pure signal; hold the receiver open for
        // the lifetime of the node without draining it
        let _pending_txs_rx = pending_txs_rx;

        server::serve(node, cancel, ssl_disabled, ssl_email).await
    }
}
