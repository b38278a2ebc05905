use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::account::Account;
use crate::block::{Block, BlockFs};
use crate::error::ChainError;
use crate::fs;
use crate::genesis;
use crate::hash::{is_block_hash_valid, Hash};
use crate::tx::{SignedTx, TX_FEE, TX_GAS, TX_GAS_PRICE_DEFAULT};

/// Tokens minted to the miner of every block.
pub const BLOCK_REWARD: u64 = 100;
pub const DEFAULT_MINING_DIFFICULTY: u64 = 3;

/// The pure in-memory ledger view: everything `add_block` mutates. Kept as
/// its own struct so a block can be validated and applied against a snapshot
/// and committed only after the disk append succeeded.
#[derive(Debug, Clone, Default)]
struct Ledger {
    balances: HashMap<Account, u64>,
    account_to_nonce: HashMap<Account, u64>,
    latest_block: Block,
    latest_block_hash: Hash,
    has_genesis_block: bool,
}

/// The ledger state machine. Owns the append-only block log exclusively;
/// balances and nonces are always derived by replaying that log on top of
/// the genesis balances.
///
/// Not reentrant: callers serialize `add_block` invocations.
pub struct State {
    ledger: Ledger,
    db_file: File,
    mining_difficulty: u64,
    fork_tip1: u64,
}

impl State {
    /// Boots the state from `data_dir`: creates the directory layout on
    /// first run (writing the embedded genesis), then replays every block
    /// log line through full validation.
    pub fn new_from_disk(data_dir: &Path, mining_difficulty: u64) -> Result<Self, ChainError> {
        fs::init_data_dir_if_not_exists(data_dir, genesis::EMBEDDED_GENESIS.as_bytes())?;

        let genesis = genesis::load_genesis(&fs::genesis_json_file_path(data_dir))?;

        let db_path = fs::blocks_db_file_path(data_dir);
        let db_file = OpenOptions::new().append(true).read(true).open(&db_path)?;

        let mut state = State {
            ledger: Ledger {
                balances: genesis.balances,
                ..Ledger::default()
            },
            db_file,
            mining_difficulty,
            fork_tip1: genesis.fork_tip1,
        };

        let reader = BufReader::new(File::open(&db_path)?);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                // a partially written trailing record reads as EOF
                break;
            }

            let record: BlockFs = serde_json::from_str(&line)?;

            let mut next = state.ledger.clone();
            state.apply_block_to(&record.block, &mut next)?;
            next.latest_block = record.block;
            next.latest_block_hash = record.hash;
            next.has_genesis_block = true;
            state.ledger = next;
        }

        Ok(state)
    }

    pub fn balances(&self) -> &HashMap<Account, u64> {
        &self.ledger.balances
    }

    pub fn account_nonces(&self) -> &HashMap<Account, u64> {
        &self.ledger.account_to_nonce
    }

    pub fn latest_block(&self) -> &Block {
        &self.ledger.latest_block
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.ledger.latest_block_hash
    }

    pub fn has_genesis_block(&self) -> bool {
        self.ledger.has_genesis_block
    }

    pub fn mining_difficulty(&self) -> u64 {
        self.mining_difficulty
    }

    pub fn next_block_number(&self) -> u64 {
        if self.ledger.has_genesis_block {
            self.ledger.latest_block.header.number + 1
        } else {
            0
        }
    }

    /// The nonce the next transaction from `account` must carry.
    pub fn next_account_nonce(&self, account: &Account) -> u64 {
        self.ledger.account_to_nonce.get(account).copied().unwrap_or(0) + 1
    }

    /// The TIP1 gas rules apply from block `fork_tip1` onwards.
    pub fn is_tip1_fork(&self) -> bool {
        self.next_block_number() >= self.fork_tip1
    }

    /// Validates and applies `block` on a snapshot, appends it to the block
    /// log, and commits the snapshot only once the write succeeded. On any
    /// validation or write failure the live state is untouched.
    pub fn add_block(&mut self, block: Block) -> Result<Hash, ChainError> {
        let mut pending = self.ledger.clone();
        self.apply_block_to(&block, &mut pending)?;

        let block_hash = block.hash()?;
        let record = BlockFs {
            hash: block_hash,
            block,
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        log::info!(
            "persisting new block to disk: {}",
            String::from_utf8_lossy(&line).trim_end()
        );
        self.db_file.write_all(&line)?;

        pending.latest_block = record.block;
        pending.latest_block_hash = block_hash;
        pending.has_genesis_block = true;
        self.ledger = pending;

        Ok(block_hash)
    }

    fn apply_block_to(&self, block: &Block, ledger: &mut Ledger) -> Result<(), ChainError> {
        if block.txs.is_empty() {
            return Err(ChainError::InvalidBlock(
                "empty blocks are not allowed".to_string(),
            ));
        }

        let next_expected = ledger.latest_block.header.number + 1;
        if ledger.has_genesis_block && block.header.number != next_expected {
            return Err(ChainError::InvalidBlock(format!(
                "next expected block number must be '{}' not '{}'",
                next_expected, block.header.number
            )));
        }

        // the first block after genesis has no recorded parent to compare
        if ledger.has_genesis_block
            && ledger.latest_block.header.number > 0
            && block.header.parent != ledger.latest_block_hash
        {
            return Err(ChainError::InvalidBlock(format!(
                "next block parent hash must be '{}' not '{}'",
                ledger.latest_block_hash, block.header.parent
            )));
        }

        let hash = block.hash()?;
        if !is_block_hash_valid(&hash, self.mining_difficulty) {
            return Err(ChainError::InvalidBlock(format!(
                "invalid block hash '{}'",
                hash
            )));
        }

        let next_number = if ledger.has_genesis_block {
            next_expected
        } else {
            0
        };
        let is_tip1 = next_number >= self.fork_tip1;

        // apply in time order; the sort is stable so ties keep their stored
        // position
        let mut txs = block.txs.clone();
        txs.sort_by_key(|tx| tx.tx.time);

        for tx in &txs {
            self.apply_tx_to(tx, ledger, is_tip1)?;
        }

        let fees = if is_tip1 {
            block.gas_reward()
        } else {
            block.txs.len() as u64 * TX_FEE
        };
        *ledger.balances.entry(block.header.miner).or_insert(0) += BLOCK_REWARD + fees;

        Ok(())
    }

    fn apply_tx_to(
        &self,
        tx: &SignedTx,
        ledger: &mut Ledger,
        is_tip1: bool,
    ) -> Result<(), ChainError> {
        if !tx.is_authentic()? {
            return Err(ChainError::InvalidBlock(format!(
                "wrong TX, sender '{}' is forged",
                tx.tx.from
            )));
        }

        let expected_nonce = ledger
            .account_to_nonce
            .get(&tx.tx.from)
            .copied()
            .unwrap_or(0)
            + 1;
        if tx.tx.nonce != expected_nonce {
            return Err(ChainError::InvalidBlock(format!(
                "wrong TX, sender '{}' next nonce must be '{}', not '{}'",
                tx.tx.from, expected_nonce, tx.tx.nonce
            )));
        }

        if is_tip1 {
            if tx.tx.gas != TX_GAS {
                return Err(ChainError::InvalidBlock(format!(
                    "insufficient TX gas {}, required {}",
                    tx.tx.gas, TX_GAS
                )));
            }
            if tx.tx.gas_price < TX_GAS_PRICE_DEFAULT {
                return Err(ChainError::InvalidBlock(format!(
                    "insufficient TX gasPrice {}, required at least {}",
                    tx.tx.gas_price, TX_GAS_PRICE_DEFAULT
                )));
            }
        } else if tx.tx.gas != 0 || tx.tx.gas_price != 0 {
            return Err(ChainError::InvalidBlock(
                "gas fields are not in effect before the TIP1 fork".to_string(),
            ));
        }

        let cost = tx.tx.cost(is_tip1);
        let balance = ledger.balances.get(&tx.tx.from).copied().unwrap_or(0);
        if cost > balance {
            return Err(ChainError::InvalidBlock(format!(
                "wrong TX, sender '{}' balance is {} tokens, tx cost is {} tokens",
                tx.tx.from, balance, cost
            )));
        }

        ledger.balances.insert(tx.tx.from, balance - cost);
        *ledger.balances.entry(tx.tx.to).or_insert(0) += tx.tx.value;
        ledger.account_to_nonce.insert(tx.tx.from, tx.tx.nonce);

        Ok(())
    }
}
