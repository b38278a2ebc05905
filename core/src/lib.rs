pub mod account;
pub mod block;
pub mod consensus;
pub mod error;
pub mod fs;
pub mod genesis;
pub mod hash;
pub mod state;
pub mod tx;
pub mod wallet;

// Explicit re-exports to avoid ambiguous glob re-exports
pub use account::Account;
pub use block::{Block, BlockFs, BlockHeader};
pub use error::ChainError;
pub use genesis::Genesis;
pub use hash::{is_block_hash_valid, Hash};
pub use state::{State, BLOCK_REWARD, DEFAULT_MINING_DIFFICULTY};
pub use tx::{SignedTx, Tx, TX_FEE, TX_GAS, TX_GAS_PRICE_DEFAULT};
