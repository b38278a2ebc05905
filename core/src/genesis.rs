use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::ChainError;

/// The genesis file compiled into the binary and written to a fresh data
/// directory on first boot.
pub const EMBEDDED_GENESIS: &str = include_str!("genesis.json");

/// Initial balances plus the block number at which the TIP1 gas rules
/// activate. Zero means the gas rules apply from the very first block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub balances: HashMap<Account, u64>,
    #[serde(rename = "forkTIP1", default)]
    pub fork_tip1: u64,
}

pub fn load_genesis(path: &Path) -> Result<Genesis, ChainError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_genesis_to_disk(path: &Path, genesis: &[u8]) -> Result<(), ChainError> {
    std::fs::write(path, genesis)?;
    Ok(())
}
