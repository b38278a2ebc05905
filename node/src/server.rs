use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;
use warp::reply::{json, with_status};
use warp::Filter;

use picochain_core::{fs, wallet, Account, Hash, Tx, TX_GAS, TX_GAS_PRICE_DEFAULT};

use crate::messages::{
    AddPeerQuery, AddPeerResponse, BalancesResponse, ErrorResponse, StatusResponse, SyncQuery,
    SyncResponse, TxAddRequest, TxAddResponse,
};
use crate::{NodeHandle, PeerNode, HTTPS_PORT};

/// Builds the JSON route tree for one node. The router is constructed per
/// node instance, never registered globally.
pub fn routes(
    node: NodeHandle,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let node_filter = {
        let node = node.clone();
        warp::any().map(move || node.clone())
    };

    let balances = warp::path!("balances" / "list")
        .and(warp::get())
        .and(node_filter.clone())
        .and_then(balances_handler);

    let status = warp::path!("node" / "status")
        .and(warp::get())
        .and(node_filter.clone())
        .and_then(status_handler);

    let tx_add = warp::path!("tx" / "add")
        .and(warp::post())
        .and(warp::body::json())
        .and(node_filter.clone())
        .and_then(tx_add_handler);

    let sync = warp::path!("node" / "sync")
        .and(warp::get())
        .and(warp::query::<SyncQuery>())
        .and(node_filter.clone())
        .and_then(sync_handler);

    let peer = warp::path!("node" / "peer")
        .and(warp::get())
        .and(warp::query::<AddPeerQuery>())
        .and(node_filter)
        .and_then(add_peer_handler);

    balances
        .or(status)
        .or(tx_add)
        .or(sync)
        .or(peer)
        .with(warp::log("picochain::http"))
}

/// Runs the API until the cancel token fires. Plain HTTP binds the node
/// port; with TLS enabled the server sits on 443 and terminates TLS with the
/// certificate pair an external ACME agent (configured with `ssl_email`)
/// maintains under `<datadir>/tls/`.
pub async fn serve(
    node: NodeHandle,
    cancel: CancellationToken,
    ssl_disabled: bool,
    ssl_email: &str,
) -> anyhow::Result<()> {
    let routes = routes(node.clone());

    if ssl_disabled {
        let addr: SocketAddr = ([0, 0, 0, 0], node.info.port as u16).into();
        let (bound, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, {
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        });
        log::info!("HTTP API listening on http://{}", bound);
        server.await;
    } else {
        let addr: SocketAddr = ([0, 0, 0, 0], HTTPS_PORT as u16).into();
        let tls_dir = node.data_dir.join("tls");
        log::info!(
            "HTTPS API listening on {}, certificates from {:?} (ACME contact: {})",
            addr,
            tls_dir,
            ssl_email
        );
        let server = warp::serve(routes)
            .tls()
            .cert_path(tls_dir.join("cert.pem"))
            .key_path(tls_dir.join("key.pem"))
            .bind(addr);
        tokio::select! {
            _ = server => {}
            _ = cancel.cancelled() => {}
        }
    }

    log::info!("HTTP API stopped");
    Ok(())
}

fn error_reply(error: impl ToString) -> warp::reply::WithStatus<warp::reply::Json> {
    with_status(
        json(&ErrorResponse {
            error: error.to_string(),
        }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

fn ok_reply(content: &impl serde::Serialize) -> warp::reply::WithStatus<warp::reply::Json> {
    with_status(json(content), StatusCode::OK)
}

async fn balances_handler(node: NodeHandle) -> Result<impl warp::Reply, warp::Rejection> {
    let state = node.state.lock().unwrap();
    Ok(ok_reply(&BalancesResponse {
        block_hash: state.latest_block_hash(),
        balances: state.balances().clone(),
    }))
}

async fn status_handler(node: NodeHandle) -> Result<impl warp::Reply, warp::Rejection> {
    let (block_hash, block_number) = {
        let state = node.state.lock().unwrap();
        (
            state.latest_block_hash(),
            state.latest_block().header.number,
        )
    };

    Ok(ok_reply(&StatusResponse {
        block_hash,
        block_number,
        peers_known: node.peers.lock().unwrap().clone(),
        pending_txs: node.mempool.lock().unwrap().pending_txs(),
        node_version: node.info.node_version.clone(),
        account: node.info.account,
    }))
}

async fn tx_add_handler(
    req: TxAddRequest,
    node: NodeHandle,
) -> Result<impl warp::Reply, warp::Rejection> {
    match add_tx(req, &node) {
        Ok(()) => Ok(ok_reply(&TxAddResponse { success: true })),
        Err(e) => Ok(error_reply(e)),
    }
}

/// Builds, signs and enqueues the transaction. The response does not wait
/// for mining; the tx sits in the mempool until the next mining round.
fn add_tx(req: TxAddRequest, node: &NodeHandle) -> anyhow::Result<()> {
    let from: Account = req.from.parse()?;
    if from.is_empty() {
        anyhow::bail!("'from' account is empty or missing");
    }
    let to: Account = req.to.parse()?;

    let nonce = match req.nonce {
        Some(nonce) if nonce > 0 => nonce,
        _ => node.state.lock().unwrap().next_account_nonce(&from),
    };

    let tx = Tx::new(
        from,
        to,
        req.value,
        nonce,
        req.gas.unwrap_or(TX_GAS),
        req.gas_price.unwrap_or(TX_GAS_PRICE_DEFAULT),
        &req.data,
    );

    let signed = wallet::sign_tx_with_keystore_account(
        tx,
        from,
        &req.from_pwd,
        &wallet::keystore_dir_path(&node.data_dir),
    )?;

    node.mempool
        .lock()
        .unwrap()
        .add_pending(signed, &node.info.tcp_address())?;

    Ok(())
}

async fn sync_handler(
    query: SyncQuery,
    node: NodeHandle,
) -> Result<impl warp::Reply, warp::Rejection> {
    let from_block: Hash = match query.from_block.parse() {
        Ok(hash) => hash,
        Err(e) => return Ok(error_reply(e)),
    };

    match fs::get_blocks_after(from_block, &node.data_dir) {
        Ok(blocks) => Ok(ok_reply(&SyncResponse { blocks })),
        Err(e) => Ok(error_reply(e)),
    }
}

async fn add_peer_handler(
    query: AddPeerQuery,
    node: NodeHandle,
) -> Result<impl warp::Reply, warp::Rejection> {
    let account: Account = match query.miner.parse() {
        Ok(account) => account,
        Err(e) => {
            return Ok(ok_reply(&AddPeerResponse {
                success: false,
                error: e.to_string(),
            }))
        }
    };

    let peer = PeerNode::new(&query.ip, query.port, false, account, true, &query.version);
    log::info!("peer '{}' was added into known peers", peer.tcp_address());
    node.peers
        .lock()
        .unwrap()
        .insert(peer.tcp_address(), peer);

    Ok(ok_reply(&AddPeerResponse {
        success: true,
        error: String::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use picochain_core::consensus::{self, PendingBlock};
    use picochain_core::{State, Tx};
    use secp256k1::SecretKey;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    use crate::mempool::Mempool;
    use crate::NodeHandles;

    fn test_node(name: &str) -> (NodeHandle, SecretKey, Account) {
        let data_dir = std::env::temp_dir().join(format!("picochain_test_server_{}", name));
        let _ = std::fs::remove_dir_all(&data_dir);

        let secret = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
        let sender = wallet::account_from_secret(&secret);
        let genesis = format!("{{\"balances\":{{\"{}\":1000000}},\"forkTIP1\":0}}", sender);
        picochain_core::fs::init_data_dir_if_not_exists(&data_dir, genesis.as_bytes()).unwrap();
        let state = State::new_from_disk(&data_dir, 1).unwrap();

        // neither channel is consumed by these tests
        let (synced_tx, _) = mpsc::channel(1);
        let (pending_tx, _) = mpsc::channel(16);

        let node = Arc::new(NodeHandles {
            data_dir,
            info: PeerNode::new("127.0.0.1", 8085, false, sender, false, "1.0.0"),
            state: Mutex::new(state),
            mempool: Mutex::new(Mempool::new(pending_tx)),
            peers: Mutex::new(HashMap::new()),
            is_mining: AtomicBool::new(false),
            synced_blocks_tx: synced_tx,
        });
        (node, secret, sender)
    }

    fn mine_one(node: &NodeHandle, secret: &SecretKey, sender: Account, nonce: u64) {
        let tx = wallet::sign_tx(Tx::base(sender, sender, 1, nonce, ""), secret).unwrap();
        let mut state = node.state.lock().unwrap();
        let pending = PendingBlock::new(
            state.latest_block_hash(),
            state.next_block_number(),
            sender,
            vec![tx],
        );
        let block = consensus::mine(
            pending,
            1,
            &tokio_util::sync::CancellationToken::new(),
        )
        .unwrap();
        state.add_block(block).unwrap();
    }

    #[tokio::test]
    async fn balances_list_returns_snapshot() {
        let (node, _, sender) = test_node("balances");
        let filter = routes(node.clone());

        let res = warp::test::request()
            .method("GET")
            .path("/balances/list")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);

        let body: BalancesResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.balances[&sender], 1_000_000);
        assert!(body.block_hash.is_empty());

        let _ = std::fs::remove_dir_all(&node.data_dir);
    }

    #[tokio::test]
    async fn status_reports_chain_and_peers() {
        let (node, secret, sender) = test_node("status");
        mine_one(&node, &secret, sender, 1);

        let filter = routes(node.clone());
        let res = warp::test::request()
            .method("GET")
            .path("/node/status")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);

        let body: StatusResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.block_number, 0);
        assert!(!body.block_hash.is_empty());
        assert_eq!(body.account, sender);
        assert!(body.pending_txs.is_empty());

        let _ = std::fs::remove_dir_all(&node.data_dir);
    }

    #[tokio::test]
    async fn sync_returns_blocks_after_hash() {
        let (node, secret, sender) = test_node("sync");
        mine_one(&node, &secret, sender, 1);
        mine_one(&node, &secret, sender, 2);

        let filter = routes(node.clone());

        // empty hash means everything from genesis
        let res = warp::test::request()
            .method("GET")
            .path("/node/sync?fromBlock=")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);
        let body: SyncResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.blocks.len(), 2);

        let first_hash = body.blocks[0].hash().unwrap().hex();
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/node/sync?fromBlock={}", first_hash))
            .reply(&filter)
            .await;
        let body: SyncResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.blocks.len(), 1);
        assert_eq!(body.blocks[0].header.number, 1);

        let _ = std::fs::remove_dir_all(&node.data_dir);
    }

    #[tokio::test]
    async fn peer_registration_lands_in_known_peers() {
        let (node, _, _) = test_node("peer");
        let filter = routes(node.clone());

        let res = warp::test::request()
            .method("GET")
            .path(
                "/node/peer?ip=10.0.0.9&port=8080&\
                 miner=0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed&version=1.0.0",
            )
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);

        let body: AddPeerResponse = serde_json::from_slice(res.body()).unwrap();
        assert!(body.success);
        assert!(body.error.is_empty());
        assert!(node.peers.lock().unwrap().contains_key("10.0.0.9:8080"));

        let _ = std::fs::remove_dir_all(&node.data_dir);
    }

    #[tokio::test]
    async fn tx_add_signs_and_enqueues() {
        let (node, _, _) = test_node("txadd");

        // the submitting account must exist in the node keystore
        let account =
            wallet::new_keystore_account(&node.data_dir, "security123").unwrap();
        let filter = routes(node.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/tx/add")
            .json(&serde_json::json!({
                "from": account.to_string(),
                "to": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "value": 5,
                "data": "",
                "fromPwd": "security123",
            }))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 200);

        let body: TxAddResponse = serde_json::from_slice(res.body()).unwrap();
        assert!(body.success);

        let pending = node.mempool.lock().unwrap().pending_txs();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tx.from, account);
        assert_eq!(pending[0].tx.nonce, 1);
        assert!(pending[0].is_authentic().unwrap());

        let _ = std::fs::remove_dir_all(&node.data_dir);
    }

    #[tokio::test]
    async fn tx_add_with_wrong_password_is_a_500() {
        let (node, _, _) = test_node("txpwd");
        let account =
            wallet::new_keystore_account(&node.data_dir, "security123").unwrap();
        let filter = routes(node.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/tx/add")
            .json(&serde_json::json!({
                "from": account.to_string(),
                "to": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "value": 5,
                "data": "",
                "fromPwd": "wrong",
            }))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 500);

        let body: ErrorResponse = serde_json::from_slice(res.body()).unwrap();
        assert!(!body.error.is_empty());
        assert!(node.mempool.lock().unwrap().pending_is_empty());

        let _ = std::fs::remove_dir_all(&node.data_dir);
    }
}
