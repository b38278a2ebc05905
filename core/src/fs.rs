use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::block::{Block, BlockFs};
use crate::error::ChainError;
use crate::genesis;
use crate::hash::Hash;

pub fn database_dir_path(data_dir: &Path) -> PathBuf {
    data_dir.join("database")
}

pub fn genesis_json_file_path(data_dir: &Path) -> PathBuf {
    database_dir_path(data_dir).join("genesis.json")
}

pub fn blocks_db_file_path(data_dir: &Path) -> PathBuf {
    database_dir_path(data_dir).join("block.db")
}

/// Lays out a fresh data directory: database/ with the genesis file and an
/// empty block log. A directory that already has a genesis file is left
/// untouched.
pub fn init_data_dir_if_not_exists(data_dir: &Path, genesis_json: &[u8]) -> Result<(), ChainError> {
    if genesis_json_file_path(data_dir).exists() {
        return Ok(());
    }

    fs::create_dir_all(database_dir_path(data_dir))?;
    genesis::write_genesis_to_disk(&genesis_json_file_path(data_dir), genesis_json)?;
    fs::write(blocks_db_file_path(data_dir), b"")?;

    Ok(())
}

/// Returns all blocks recorded after `from_block`, in log order. The empty
/// hash means "from the very first block". The log is scanned line by line
/// with a read-only handle; collection starts on the line right after the
/// matching hash.
pub fn get_blocks_after(from_block: Hash, data_dir: &Path) -> Result<Vec<Block>, ChainError> {
    let file = File::open(blocks_db_file_path(data_dir))?;
    let reader = BufReader::new(file);

    let mut blocks = Vec::new();
    let mut collecting = from_block.is_empty();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            break;
        }

        let record: BlockFs = serde_json::from_str(&line)?;

        if collecting {
            blocks.push(record.block);
            continue;
        }

        if record.hash == from_block {
            collecting = true;
        }
    }

    Ok(blocks)
}
