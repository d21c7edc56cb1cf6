//! Transaction signing.
//!
//! The service holds at most one credential. [`TransactionSigner`] is the seam
//! between the lifecycle manager and whatever holds the key.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use coursechain_core::CourseError;

/// Fully-populated legacy (EIP-155) call ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// Signs transactions for a single account.
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Returns the 2718-encoded signed transaction.
    fn sign(&self, tx: UnsignedTx) -> Result<Bytes, CourseError>;
}

/// In-process secp256k1 key.
#[derive(Clone)]
pub struct LocalSigner {
    inner: PrivateKeySigner,
}

impl LocalSigner {
    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self, CourseError> {
        let inner = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| CourseError::Signing(format!("invalid private key: {e}")))?;
        Ok(Self { inner })
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        alloy_signer::Signer::address(&self.inner)
    }

    fn sign(&self, tx: UnsignedTx) -> Result<Bytes, CourseError> {
        let legacy = TxLegacy {
            chain_id: Some(tx.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.input,
        };
        let signature = self
            .inner
            .sign_hash_sync(&legacy.signature_hash())
            .map_err(|e| CourseError::Signing(format!("failed to sign transaction: {e}")))?;
        let envelope = TxEnvelope::from(legacy.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }
}
