use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::account::Account;
use crate::error::ChainError;
use crate::hash::Hash;

/// Gas a value transfer burns once the TIP1 fork is active.
pub const TX_GAS: u64 = 21;
/// Minimum (and default) gas price under TIP1.
pub const TX_GAS_PRICE_DEFAULT: u64 = 1;
/// Flat fee charged per transaction before the TIP1 fork.
pub const TX_FEE: u64 = 50;

/// An unsigned value transfer.
///
/// The JSON field order is part of the wire protocol: hashes and signatures
/// are computed over this encoding, so two nodes must render a transaction
/// byte-for-byte identically. Pre-fork transactions (gas == 0) keep the
/// original six-field shape; TIP1 transactions insert gas and gasPrice. The
/// two shapes are kept as separate encoders on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    pub nonce: u64,
    pub data: String,
    pub time: u64,
    pub gas: u64,
    pub gas_price: u64,
}

impl Tx {
    pub fn new(
        from: Account,
        to: Account,
        value: u64,
        nonce: u64,
        gas: u64,
        gas_price: u64,
        data: &str,
    ) -> Self {
        Tx {
            from,
            to,
            value,
            nonce,
            data: data.to_string(),
            time: chrono::Utc::now().timestamp() as u64,
            gas,
            gas_price,
        }
    }

    /// A transaction with the current default gas settings.
    pub fn base(from: Account, to: Account, value: u64, nonce: u64, data: &str) -> Self {
        Tx::new(from, to, value, nonce, TX_GAS, TX_GAS_PRICE_DEFAULT, data)
    }

    pub fn is_reward(&self) -> bool {
        self.data == "reward"
    }

    pub fn gas_cost(&self) -> u64 {
        self.gas * self.gas_price
    }

    /// What the sender pays in total: the value plus either the gas cost
    /// (TIP1) or the flat legacy fee.
    pub fn cost(&self, is_tip1_fork: bool) -> u64 {
        if is_tip1_fork {
            self.value + self.gas_cost()
        } else {
            self.value + TX_FEE
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn hash(&self) -> Result<Hash, ChainError> {
        Ok(Hash::sha256(&self.encode()?))
    }
}

#[derive(Serialize)]
struct LegacyTxWire<'a> {
    from: &'a Account,
    to: &'a Account,
    value: u64,
    nonce: u64,
    data: &'a str,
    time: u64,
}

#[derive(Serialize)]
struct Tip1TxWire<'a> {
    from: &'a Account,
    to: &'a Account,
    gas: u64,
    #[serde(rename = "gasPrice")]
    gas_price: u64,
    value: u64,
    nonce: u64,
    data: &'a str,
    time: u64,
}

impl Serialize for Tx {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.gas == 0 {
            LegacyTxWire {
                from: &self.from,
                to: &self.to,
                value: self.value,
                nonce: self.nonce,
                data: &self.data,
                time: self.time,
            }
            .serialize(serializer)
        } else {
            Tip1TxWire {
                from: &self.from,
                to: &self.to,
                gas: self.gas,
                gas_price: self.gas_price,
                value: self.value,
                nonce: self.nonce,
                data: &self.data,
                time: self.time,
            }
            .serialize(serializer)
        }
    }
}

#[derive(Deserialize)]
struct TxWire {
    from: Account,
    to: Account,
    #[serde(default)]
    gas: u64,
    #[serde(rename = "gasPrice", default)]
    gas_price: u64,
    value: u64,
    nonce: u64,
    data: String,
    time: u64,
}

impl<'de> Deserialize<'de> for Tx {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = TxWire::deserialize(deserializer)?;
        Ok(Tx {
            from: wire.from,
            to: wire.to,
            value: wire.value,
            nonce: wire.nonce,
            data: wire.data,
            time: wire.time,
            gas: wire.gas,
            gas_price: wire.gas_price,
        })
    }
}

/// A transaction plus its detached 65-byte recoverable signature
/// (r ‖ s ‖ v, v in {0, 1}). The signature marshals as standard base64,
/// appended as the last JSON field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub tx: Tx,
    pub sig: Vec<u8>,
}

impl SignedTx {
    pub fn new(tx: Tx, sig: Vec<u8>) -> Self {
        SignedTx { tx, sig }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Identity of the signed transaction, signature included. This is the
    /// key the mempool and its archive are indexed by.
    pub fn hash(&self) -> Result<Hash, ChainError> {
        Ok(Hash::sha256(&self.encode()?))
    }

    /// Recovers the signer from the signature over the unsigned-tx digest and
    /// accepts the transaction iff the derived account matches `from`.
    pub fn is_authentic(&self) -> Result<bool, ChainError> {
        use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
        use secp256k1::{Message, Secp256k1};

        if self.sig.len() != 65 {
            return Ok(false);
        }

        let tx_hash = self.tx.hash()?;
        let recovery_id = RecoveryId::from_i32(self.sig[64] as i32)?;
        let signature = RecoverableSignature::from_compact(&self.sig[..64], recovery_id)?;
        let message = Message::from_digest(*tx_hash.as_bytes());

        let secp = Secp256k1::new();
        let public_key = secp.recover_ecdsa(&message, &signature)?;

        Ok(Account::from_public_key(&public_key) == self.tx.from)
    }
}

#[derive(Serialize)]
struct LegacySignedTxWire<'a> {
    from: &'a Account,
    to: &'a Account,
    value: u64,
    nonce: u64,
    data: &'a str,
    time: u64,
    signature: String,
}

#[derive(Serialize)]
struct Tip1SignedTxWire<'a> {
    from: &'a Account,
    to: &'a Account,
    gas: u64,
    #[serde(rename = "gasPrice")]
    gas_price: u64,
    value: u64,
    nonce: u64,
    data: &'a str,
    time: u64,
    signature: String,
}

impl Serialize for SignedTx {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let signature = BASE64.encode(&self.sig);
        if self.tx.gas == 0 {
            LegacySignedTxWire {
                from: &self.tx.from,
                to: &self.tx.to,
                value: self.tx.value,
                nonce: self.tx.nonce,
                data: &self.tx.data,
                time: self.tx.time,
                signature,
            }
            .serialize(serializer)
        } else {
            Tip1SignedTxWire {
                from: &self.tx.from,
                to: &self.tx.to,
                gas: self.tx.gas,
                gas_price: self.tx.gas_price,
                value: self.tx.value,
                nonce: self.tx.nonce,
                data: &self.tx.data,
                time: self.tx.time,
                signature,
            }
            .serialize(serializer)
        }
    }
}

#[derive(Deserialize)]
struct SignedTxWire {
    #[serde(flatten)]
    tx: TxWire,
    signature: String,
}

impl<'de> Deserialize<'de> for SignedTx {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SignedTxWire::deserialize(deserializer)?;
        let sig = BASE64
            .decode(wire.signature.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(SignedTx {
            tx: Tx {
                from: wire.tx.from,
                to: wire.tx.to,
                value: wire.tx.value,
                nonce: wire.tx.nonce,
                data: wire.tx.data,
                time: wire.tx.time,
                gas: wire.tx.gas,
                gas_price: wire.tx.gas_price,
            },
            sig,
        })
    }
}
