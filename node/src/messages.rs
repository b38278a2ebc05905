use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use picochain_core::{Account, Block, Hash, SignedTx};

use crate::PeerNode;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalancesResponse {
    pub block_hash: Hash,
    pub balances: HashMap<Account, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub block_hash: Hash,
    pub block_number: u64,
    pub peers_known: HashMap<String, PeerNode>,
    pub pending_txs: Vec<SignedTx>,
    pub node_version: String,
    pub account: Account,
}

#[derive(Debug, Deserialize)]
pub struct TxAddRequest {
    pub from: String,
    pub to: String,
    pub value: u64,
    pub nonce: Option<u64>,
    pub gas: Option<u64>,
    #[serde(rename = "gasPrice")]
    pub gas_price: Option<u64>,
    #[serde(default)]
    pub data: String,
    #[serde(rename = "fromPwd")]
    pub from_pwd: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxAddResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(rename = "fromBlock", default)]
    pub from_block: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
pub struct AddPeerQuery {
    pub ip: String,
    pub port: u64,
    pub miner: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPeerResponse {
    pub success: bool,
    pub error: String,
}
