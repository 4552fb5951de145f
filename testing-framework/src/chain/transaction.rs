//! Transfer transaction builder
//!
//! Builds legacy (EIP-155) value transfers the way the dev node's Ethereum
//! RPC expects them: RLP-encoded, signed over the chain id, hashed with
//! keccak256. Building is pure; submission goes through a [`ChainClient`].
//!
//! [`ChainClient`]: super::ChainClient

use super::accounts::{address_from_public, DevAccount};
use super::{Address, TxHash};
use anyhow::{bail, Result};
use libsecp256k1::{Message, RecoveryId, Signature};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Lowest gas price accepted by the dev chain (10 gwei)
pub const MIN_GAS_PRICE: u128 = 10_000_000_000;

/// Gas consumed by a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Deterministic gas and fee parameters applied by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    /// Price per unit of gas, in wei
    pub gas_price: u128,
    /// Gas limit of the transaction
    pub gas_limit: u64,
    /// EIP-155 chain id folded into the signature
    pub chain_id: u64,
}

impl FeeParams {
    /// Minimum gas price and transfer gas for `chain_id`.
    pub fn for_chain(chain_id: u64) -> Self {
        Self {
            gas_price: MIN_GAS_PRICE,
            gas_limit: TRANSFER_GAS,
            chain_id,
        }
    }

    /// Maximum fee the sender must be able to cover.
    pub fn max_fee(&self) -> u128 {
        self.gas_price.saturating_mul(u128::from(self.gas_limit))
    }
}

/// Unsigned transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTransaction {
    /// Sender nonce
    pub nonce: u64,
    /// Price per unit of gas
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient
    pub to: Address,
    /// Amount in wei
    pub value: u128,
    /// EIP-155 chain id
    pub chain_id: u64,
}

impl TransferTransaction {
    /// Keccak hash that gets signed: `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`.
    pub fn signing_hash(&self) -> [u8; 32] {
        let payload = rlp::list(&[
            rlp::uint(u128::from(self.nonce)),
            rlp::uint(self.gas_price),
            rlp::uint(u128::from(self.gas_limit)),
            rlp::bytes(self.to.as_bytes()),
            rlp::uint(self.value),
            rlp::bytes(&[]),
            rlp::uint(u128::from(self.chain_id)),
            rlp::uint(0),
            rlp::uint(0),
        ]);
        Keccak256::digest(&payload).into()
    }

    /// Sign with `account`'s key.
    pub fn sign(self, account: &DevAccount) -> SignedTransaction {
        let message = Message::parse(&self.signing_hash());
        let (signature, recovery_id) = libsecp256k1::sign(&message, account.private_key.secret());
        let sig = signature.serialize();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig[..32]);
        s.copy_from_slice(&sig[32..]);
        let v = u64::from(recovery_id.serialize()) + self.chain_id * 2 + 35;

        let raw = rlp::list(&[
            rlp::uint(u128::from(self.nonce)),
            rlp::uint(self.gas_price),
            rlp::uint(u128::from(self.gas_limit)),
            rlp::bytes(self.to.as_bytes()),
            rlp::uint(self.value),
            rlp::bytes(&[]),
            rlp::uint(u128::from(v)),
            rlp::bytes(rlp::trim(&r)),
            rlp::bytes(rlp::trim(&s)),
        ]);
        let hash = TxHash(Keccak256::digest(&raw).into());

        SignedTransaction {
            tx: self,
            v,
            r,
            s,
            hash,
            raw,
        }
    }
}

/// Signed, encoded transfer ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Unsigned fields
    pub tx: TransferTransaction,
    v: u64,
    r: [u8; 32],
    s: [u8; 32],
    hash: TxHash,
    raw: Vec<u8>,
}

impl SignedTransaction {
    /// Transaction hash (keccak256 of the raw encoding)
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// RLP-encoded bytes as sent through `eth_sendRawTransaction`
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// `0x`-prefixed hex of [`Self::raw`]
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// Recover the signer's address, validating `v` against the chain id.
    pub fn recover_sender(&self) -> Result<Address> {
        let base = self.tx.chain_id * 2 + 35;
        if self.v < base || self.v > base + 1 {
            bail!(
                "Signature v={} does not match chain id {}",
                self.v,
                self.tx.chain_id
            );
        }
        let recovery_id = RecoveryId::parse((self.v - base) as u8)
            .map_err(|e| anyhow::anyhow!("Invalid recovery id: {:?}", e))?;

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&self.r);
        sig[32..].copy_from_slice(&self.s);
        let signature = Signature::parse_standard(&sig)
            .map_err(|e| anyhow::anyhow!("Malformed signature: {:?}", e))?;

        let message = Message::parse(&self.tx.signing_hash());
        let public = libsecp256k1::recover(&message, &signature, &recovery_id)
            .map_err(|e| anyhow::anyhow!("Signature recovery failed: {:?}", e))?;
        Ok(address_from_public(&public))
    }
}

/// Build and sign a transfer of `value` wei from `from` to `to`.
///
/// Pure: the caller supplies the nonce. Gas limit and price come from `fee`.
pub fn build_transfer(
    from: &DevAccount,
    to: &Address,
    value: u128,
    nonce: u64,
    fee: &FeeParams,
) -> SignedTransaction {
    TransferTransaction {
        nonce,
        gas_price: fee.gas_price,
        gas_limit: fee.gas_limit,
        to: *to,
        value,
        chain_id: fee.chain_id,
    }
    .sign(from)
}

/// Minimal RLP encoder covering the shapes a legacy transfer needs.
mod rlp {
    pub fn trim(bytes: &[u8]) -> &[u8] {
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        &bytes[first..]
    }

    fn header(offset: u8, len: usize, out: &mut Vec<u8>) {
        if len <= 55 {
            out.push(offset + len as u8);
        } else {
            let len_bytes = (len as u64).to_be_bytes();
            let len_bytes = trim(&len_bytes);
            out.push(offset + 55 + len_bytes.len() as u8);
            out.extend_from_slice(len_bytes);
        }
    }

    pub fn bytes(data: &[u8]) -> Vec<u8> {
        if data.len() == 1 && data[0] < 0x80 {
            return vec![data[0]];
        }
        let mut out = Vec::with_capacity(data.len() + 9);
        header(0x80, data.len(), &mut out);
        out.extend_from_slice(data);
        out
    }

    pub fn uint(value: u128) -> Vec<u8> {
        bytes(trim(&value.to_be_bytes()))
    }

    pub fn list(items: &[Vec<u8>]) -> Vec<u8> {
        let len = items.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(len + 9);
        header(0xc0, len, &mut out);
        for item in items {
            out.extend_from_slice(item);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::accounts::{ALITH, BALTATHAR};

    #[test]
    fn test_rlp_primitives() {
        assert_eq!(rlp::uint(0), vec![0x80]);
        assert_eq!(rlp::uint(0x7f), vec![0x7f]);
        assert_eq!(rlp::uint(0x80), vec![0x81, 0x80]);
        assert_eq!(rlp::uint(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(rlp::bytes(&[]), vec![0x80]);
        assert_eq!(rlp::list(&[]), vec![0xc0]);

        let long = vec![0xaa; 56];
        let encoded = rlp::bytes(&long);
        assert_eq!(&encoded[..2], &[0xb8, 56]);
        assert_eq!(encoded.len(), 58);
    }

    #[test]
    fn test_signature_recovers_sender() {
        let fee = FeeParams::for_chain(1281);
        let tx = build_transfer(&ALITH, &BALTATHAR.address, 1_000, 0, &fee);
        assert_eq!(tx.recover_sender().unwrap(), ALITH.address);
        assert_eq!(tx.tx.gas_limit, TRANSFER_GAS);
        assert_eq!(tx.tx.gas_price, MIN_GAS_PRICE);
    }

    #[test]
    fn test_build_is_deterministic() {
        let fee = FeeParams::for_chain(1281);
        let a = build_transfer(&ALITH, &BALTATHAR.address, 42, 7, &fee);
        let b = build_transfer(&ALITH, &BALTATHAR.address, 42, 7, &fee);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.raw(), b.raw());

        let c = build_transfer(&ALITH, &BALTATHAR.address, 42, 8, &fee);
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_chain_id_mismatch_rejected() {
        let fee = FeeParams::for_chain(1281);
        let mut tx = build_transfer(&ALITH, &BALTATHAR.address, 1, 0, &fee);
        tx.tx.chain_id = 1;
        assert!(tx.recover_sender().is_err());
    }

    #[test]
    fn test_raw_is_rlp_list() {
        let fee = FeeParams::for_chain(1281);
        let tx = build_transfer(&ALITH, &BALTATHAR.address, 1, 0, &fee);
        // Long list prefix: payload exceeds 55 bytes because of r and s
        assert_eq!(tx.raw()[0], 0xf8);
        assert_eq!(tx.raw()[1] as usize, tx.raw().len() - 2);
        assert!(tx.raw_hex().starts_with("0xf8"));
    }

    #[test]
    fn test_max_fee() {
        let fee = FeeParams::for_chain(1);
        assert_eq!(fee.max_fee(), MIN_GAS_PRICE * 21_000);
    }
}
