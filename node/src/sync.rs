use std::time::Duration;

use tokio_util::sync::CancellationToken;

use picochain_core::Hash;

use crate::messages::{AddPeerResponse, StatusResponse, SyncResponse};
use crate::{NodeHandle, PeerNode, SYNC_INTERVAL_SECONDS};

/// Pulls chain state from every known peer on a fixed cadence: status first,
/// then self-registration, missing blocks, newly advertised peers, and
/// pending transactions.
pub async fn sync_task(node: NodeHandle, cancel: CancellationToken) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("could not build sync HTTP client: {}", e);
            return;
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(SYNC_INTERVAL_SECONDS));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                do_sync(&node, &client).await;
            }
            _ = cancel.cancelled() => {
                log::info!("sync task shutting down");
                return;
            }
        }
    }
}

async fn do_sync(node: &NodeHandle, client: &reqwest::Client) {
    log::debug!("polling known peers for new blocks and peers...");

    let peers: Vec<PeerNode> = node.peers.lock().unwrap().values().cloned().collect();

    for peer in peers {
        if node.info.ip == peer.ip && node.info.port == peer.port {
            continue;
        }
        if peer.ip.is_empty() {
            continue;
        }

        let status = match query_peer_status(client, &peer).await {
            Ok(status) => status,
            Err(e) => {
                log::warn!(
                    "unable to query status of peer '{}': {}, removing it",
                    peer.tcp_address(),
                    e
                );
                node.peers.lock().unwrap().remove(&peer.tcp_address());
                continue;
            }
        };

        if let Err(e) = join_known_peers(node, client, &peer).await {
            log::warn!("unable to join peer '{}': {}", peer.tcp_address(), e);
            continue;
        }

        if let Err(e) = sync_blocks(node, client, &peer, &status).await {
            log::warn!("block sync with peer '{}' failed: {}", peer.tcp_address(), e);
            continue;
        }

        sync_known_peers(node, &status);

        if let Err(e) = sync_pending_txs(node, &peer, &status) {
            log::warn!(
                "pending tx sync with peer '{}' failed: {}",
                peer.tcp_address(),
                e
            );
        }
    }
}

async fn query_peer_status(
    client: &reqwest::Client,
    peer: &PeerNode,
) -> anyhow::Result<StatusResponse> {
    let url = format!(
        "{}://{}/node/status",
        peer.api_protocol(),
        peer.tcp_address()
    );
    let status = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<StatusResponse>()
        .await?;
    Ok(status)
}

/// Registers this node with a peer it has not connected to yet. The peer is
/// marked connected only when it reports success; otherwise the next sync
/// round retries.
async fn join_known_peers(
    node: &NodeHandle,
    client: &reqwest::Client,
    peer: &PeerNode,
) -> anyhow::Result<()> {
    if peer.connected {
        return Ok(());
    }

    let url = format!("{}://{}/node/peer", peer.api_protocol(), peer.tcp_address());
    let response = client
        .get(&url)
        .query(&[
            ("ip", node.info.ip.clone()),
            ("port", node.info.port.to_string()),
            ("miner", node.info.account.to_string()),
            ("version", node.info.node_version.clone()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json::<AddPeerResponse>()
        .await?;

    if !response.error.is_empty() {
        anyhow::bail!(response.error);
    }

    {
        let mut peers = node.peers.lock().unwrap();
        if let Some(known) = peers.get_mut(&peer.tcp_address()) {
            known.connected = response.success;
        }
    }

    if !response.success {
        anyhow::bail!("unable to join known peers of '{}'", peer.tcp_address());
    }

    Ok(())
}

async fn sync_blocks(
    node: &NodeHandle,
    client: &reqwest::Client,
    peer: &PeerNode,
    status: &StatusResponse,
) -> anyhow::Result<()> {
    let (local_number, local_hash) = {
        let state = node.state.lock().unwrap();
        (state.latest_block().header.number, state.latest_block_hash())
    };

    // a peer with no blocks has nothing for us
    if status.block_hash.is_empty() {
        return Ok(());
    }
    if status.block_number < local_number {
        return Ok(());
    }
    // same genesis block on both sides
    if status.block_number == 0 && !local_hash.is_empty() {
        return Ok(());
    }

    let new_blocks_count = if local_hash.is_empty() && status.block_number == 0 {
        1
    } else {
        status.block_number - local_number
    };
    log::info!(
        "found {} new blocks from peer '{}'",
        new_blocks_count,
        peer.tcp_address()
    );

    let blocks = fetch_blocks_from_peer(client, peer, local_hash).await?;

    for block in blocks {
        {
            let mut state = node.state.lock().unwrap();
            state.add_block(block.clone())?;
        }
        // hands the block to the mining task, which cancels any in-flight
        // search and archives the mined txs
        let _ = node.synced_blocks_tx.send(block).await;
    }

    Ok(())
}

async fn fetch_blocks_from_peer(
    client: &reqwest::Client,
    peer: &PeerNode,
    from_block: Hash,
) -> anyhow::Result<Vec<picochain_core::Block>> {
    log::info!("importing blocks from peer '{}'...", peer.tcp_address());

    let url = format!("{}://{}/node/sync", peer.api_protocol(), peer.tcp_address());
    let response = client
        .get(&url)
        .query(&[("fromBlock", from_block.hex())])
        .send()
        .await?
        .error_for_status()?
        .json::<SyncResponse>()
        .await?;

    Ok(response.blocks)
}

fn sync_known_peers(node: &NodeHandle, status: &StatusResponse) {
    let mut peers = node.peers.lock().unwrap();
    for (address, peer) in &status.peers_known {
        if peer.ip == node.info.ip && peer.port == node.info.port {
            continue;
        }
        if !peers.contains_key(address) {
            log::info!("found new peer '{}'", address);
            peers.insert(address.clone(), peer.clone());
        }
    }
}

fn sync_pending_txs(
    node: &NodeHandle,
    peer: &PeerNode,
    status: &StatusResponse,
) -> anyhow::Result<()> {
    let mut mempool = node.mempool.lock().unwrap();
    for tx in &status.pending_txs {
        mempool.add_pending(tx.clone(), &peer.tcp_address())?;
    }
    Ok(())
}
