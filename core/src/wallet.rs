use std::path::{Path, PathBuf};

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::account::Account;
use crate::error::ChainError;
use crate::tx::{SignedTx, Tx};

const KEYSTORE_DIR_NAME: &str = "keystore";

pub fn keystore_dir_path(data_dir: &Path) -> PathBuf {
    data_dir.join(KEYSTORE_DIR_NAME)
}

pub fn account_from_secret(secret: &SecretKey) -> Account {
    let secp = Secp256k1::new();
    Account::from_public_key(&PublicKey::from_secret_key(&secp, secret))
}

/// Creates a new scrypt-encrypted V3 keystore file under
/// `<datadir>/keystore/`, named after the derived account so it can be
/// located again for signing.
pub fn new_keystore_account(data_dir: &Path, password: &str) -> Result<Account, ChainError> {
    let dir = keystore_dir_path(data_dir);
    std::fs::create_dir_all(&dir)?;

    let mut rng = rand::thread_rng();
    let (secret, file_name) = eth_keystore::new(&dir, &mut rng, password, None)
        .map_err(|e| ChainError::Keystore(e.to_string()))?;

    let secret_key = SecretKey::from_slice(&secret)?;
    let account = account_from_secret(&secret_key);

    std::fs::rename(dir.join(&file_name), dir.join(account.raw_hex()))?;

    Ok(account)
}

/// Signs `tx` with the decrypted key of `account`. The 65-byte signature is
/// r ‖ s ‖ v with the recovery id in the last byte.
pub fn sign_tx_with_keystore_account(
    tx: Tx,
    account: Account,
    password: &str,
    keystore_dir: &Path,
) -> Result<SignedTx, ChainError> {
    let key_path = keystore_dir.join(account.raw_hex());
    let secret = eth_keystore::decrypt_key(&key_path, password)
        .map_err(|e| ChainError::Keystore(e.to_string()))?;
    let secret_key = SecretKey::from_slice(&secret)?;

    if account_from_secret(&secret_key) != account {
        return Err(ChainError::Keystore(format!(
            "keystore file does not hold the key for account '{}'",
            account
        )));
    }

    sign_tx(tx, &secret_key)
}

pub fn sign_tx(tx: Tx, secret: &SecretKey) -> Result<SignedTx, ChainError> {
    let tx_hash = tx.hash()?;
    let message = Message::from_digest(*tx_hash.as_bytes());

    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa_recoverable(&message, secret);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut sig = Vec::with_capacity(65);
    sig.extend_from_slice(&compact);
    sig.push(recovery_id.to_i32() as u8);

    Ok(SignedTx::new(tx, sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("picochain_test_wallet_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn sign_produces_recoverable_signature() {
        let secret = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
        let from = account_from_secret(&secret);
        let signed = sign_tx(Tx::base(from, from, 1, 1, ""), &secret).unwrap();

        assert_eq!(signed.sig.len(), 65);
        assert!(signed.sig[64] <= 1);
        assert!(signed.is_authentic().unwrap());
    }

    #[test]
    fn keystore_account_round_trip() {
        let data_dir = test_data_dir("roundtrip");

        let account = new_keystore_account(&data_dir, "security123").unwrap();
        let tx = Tx::base(account, account, 1, 1, "");
        let signed = sign_tx_with_keystore_account(
            tx,
            account,
            "security123",
            &keystore_dir_path(&data_dir),
        )
        .unwrap();

        assert_eq!(signed.tx.from, account);
        assert!(signed.is_authentic().unwrap());

        let _ = std::fs::remove_dir_all(&data_dir);
    }

    #[test]
    fn wrong_password_is_refused() {
        let data_dir = test_data_dir("badpwd");

        let account = new_keystore_account(&data_dir, "security123").unwrap();
        let tx = Tx::base(account, account, 1, 1, "");
        let err = sign_tx_with_keystore_account(
            tx,
            account,
            "not-the-password",
            &keystore_dir_path(&data_dir),
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::Keystore(_)));

        let _ = std::fs::remove_dir_all(&data_dir);
    }
}
