use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::ChainError;
use crate::hash::Hash;
use crate::tx::SignedTx;

/// Block metadata. `nonce` is the 32-bit value varied during the
/// proof-of-work search; `time` is fixed when the pending block is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: Hash,
    pub number: u64,
    pub nonce: u32,
    pub time: u64,
    pub miner: Account,
}

/// A header plus its ordered transaction list. The JSON encoding (header
/// first, transactions under `payload`) is the hashing contract shared with
/// peers, so the field order here is load-bearing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(rename = "payload")]
    pub txs: Vec<SignedTx>,
}

impl Block {
    pub fn new(
        parent: Hash,
        number: u64,
        nonce: u32,
        time: u64,
        miner: Account,
        txs: Vec<SignedTx>,
    ) -> Self {
        Block {
            header: BlockHeader {
                parent,
                number,
                nonce,
                time,
                miner,
            },
            txs,
        }
    }

    pub fn hash(&self) -> Result<Hash, ChainError> {
        Ok(Hash::sha256(&serde_json::to_vec(self)?))
    }

    /// Total gas fees collected by the miner of this block.
    pub fn gas_reward(&self) -> u64 {
        self.txs.iter().map(|tx| tx.tx.gas_cost()).sum()
    }
}

/// One line of the append-only block log: the block keyed by its own hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFs {
    pub hash: Hash,
    pub block: Block,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{SignedTx, Tx};

    fn signed(value: u64, time: u64) -> SignedTx {
        let tx = Tx {
            from: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap(),
            to: "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359".parse().unwrap(),
            value,
            nonce: 1,
            data: String::new(),
            time,
            gas: 21,
            gas_price: 1,
        };
        SignedTx::new(tx, vec![7u8; 65])
    }

    #[test]
    fn json_shape_and_round_trip() {
        let block = Block::new(
            Hash::default(),
            0,
            42,
            1700000000,
            Account::default(),
            vec![signed(1, 1700000000)],
        );

        let json = serde_json::to_string(&block).unwrap();
        assert!(json.starts_with("{\"header\":{\"parent\":\""));
        assert!(json.contains("\"number\":0,\"nonce\":42,\"time\":1700000000,\"miner\":"));
        assert!(json.contains("\"payload\":[{"));

        let parsed: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.hash().unwrap(), block.hash().unwrap());
    }

    #[test]
    fn stored_tx_order_changes_the_hash() {
        let a = signed(1, 1700000001);
        let b = signed(2, 1700000000);
        let one = Block::new(
            Hash::default(),
            0,
            42,
            1700000000,
            Account::default(),
            vec![a.clone(), b.clone()],
        );
        let two = Block::new(
            Hash::default(),
            0,
            42,
            1700000000,
            Account::default(),
            vec![b, a],
        );
        assert_ne!(one.hash().unwrap(), two.hash().unwrap());
    }

    #[test]
    fn gas_reward_sums_fees() {
        let block = Block::new(
            Hash::default(),
            0,
            0,
            0,
            Account::default(),
            vec![signed(1, 1), signed(2, 2)],
        );
        assert_eq!(block.gas_reward(), 2 * 21);
    }

    #[test]
    fn block_fs_line_round_trip() {
        let block = Block::new(
            Hash::default(),
            0,
            7,
            1700000000,
            Account::default(),
            vec![signed(1, 1700000000)],
        );
        let record = BlockFs {
            hash: block.hash().unwrap(),
            block,
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.starts_with("{\"hash\":\""));
        let parsed: BlockFs = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.hash, parsed.block.hash().unwrap());
    }
}
