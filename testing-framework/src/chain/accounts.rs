//! Development accounts
//!
//! The node's development chain spec pre-funds four well-known accounts
//! derived from the canonical Substrate dev mnemonic. Suites sign with their
//! keys through [`DevAccount`].

use super::Address;
use anyhow::{Context as _, Result};
use lazy_static::lazy_static;
use libsecp256k1::{PublicKey, SecretKey};
use rand::RngCore;
use sha3::{Digest, Keccak256};
use std::fmt;

/// Alith's address, the sudo/treasury account of the dev chain spec
pub const ALITH_ADDRESS: &str = "0xf24FF3a9CF04c71Dbc94D0b566f7A27B94566cac";
/// Alith's private key
pub const ALITH_PRIVATE_KEY: &str =
    "0x5fb92d6e98884f76de468fa3f6278f8807c48bebc13595d45af5bdc4da702133";
/// Baltathar's address
pub const BALTATHAR_ADDRESS: &str = "0x3Cd0A705a2DC65e5b1E1205896BaA2be8A07c6e0";
/// Baltathar's private key
pub const BALTATHAR_PRIVATE_KEY: &str =
    "0x8075991ce870b93a8870eca0c0f91913d12f47948ca0fd25b49c6fa7cdbeee8b";
/// Charleth's address
pub const CHARLETH_ADDRESS: &str = "0x798d4Ba9baf0064Ec19eB4F0a1a45785ae9D6DFc";
/// Charleth's private key
pub const CHARLETH_PRIVATE_KEY: &str =
    "0x0b6e18cafb6ed99687ec547bd28139cafdd2bffe70e6b688025de6b445aa5c5b";
/// Dorothy's address
pub const DOROTHY_ADDRESS: &str = "0x773539d4Ac0e786233D90A233654ccEE26a613D9";
/// Dorothy's private key
pub const DOROTHY_PRIVATE_KEY: &str =
    "0x39539ab1876910bbf3a223d84a29e28f1cb4e2e456503e7e91ed39b2e7223d68";

/// secp256k1 signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(SecretKey);

impl PrivateKey {
    /// Parse a 32-byte hex key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = super::parse_fixed_hex::<32>(s)?;
        Self::from_bytes(&bytes)
    }

    /// Build from raw bytes, rejecting zero and out-of-range scalars.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        SecretKey::parse(bytes)
            .map(Self)
            .map_err(|e| anyhow::anyhow!("Invalid secp256k1 secret key: {:?}", e))
    }

    /// Ethereum-style address: last 20 bytes of keccak256 of the uncompressed public key.
    pub fn address(&self) -> Address {
        let public = PublicKey::from_secret_key(&self.0);
        address_from_public(&public)
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.address())
    }
}

pub(crate) fn address_from_public(public: &PublicKey) -> Address {
    let serialized = public.serialize();
    let digest = Keccak256::digest(&serialized[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

/// A named account with its signing key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevAccount {
    /// Display name (`Alith`, `generated`, ...)
    pub name: String,
    /// Derived address
    pub address: Address,
    /// Signing key
    pub private_key: PrivateKey,
}

impl DevAccount {
    /// Build an account from a hex private key.
    pub fn from_private_key(name: impl Into<String>, key_hex: &str) -> Result<Self> {
        let name = name.into();
        let private_key =
            PrivateKey::from_hex(key_hex).with_context(|| format!("Bad key for account {}", name))?;
        Ok(Self {
            address: private_key.address(),
            name,
            private_key,
        })
    }
}

fn well_known(name: &str, key: &str) -> DevAccount {
    DevAccount::from_private_key(name, key).expect("well-known dev key is a valid scalar")
}

lazy_static! {
    /// Alith
    pub static ref ALITH: DevAccount = well_known("Alith", ALITH_PRIVATE_KEY);
    /// Baltathar
    pub static ref BALTATHAR: DevAccount = well_known("Baltathar", BALTATHAR_PRIVATE_KEY);
    /// Charleth
    pub static ref CHARLETH: DevAccount = well_known("Charleth", CHARLETH_PRIVATE_KEY);
    /// Dorothy
    pub static ref DOROTHY: DevAccount = well_known("Dorothy", DOROTHY_PRIVATE_KEY);

    /// All pre-funded accounts, in genesis order
    pub static ref DEV_ACCOUNTS: Vec<DevAccount> = vec![
        ALITH.clone(),
        BALTATHAR.clone(),
        CHARLETH.clone(),
        DOROTHY.clone(),
    ];
}

/// Generate a fresh random account. It holds no funds at genesis.
pub fn generate_account() -> DevAccount {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        // Out-of-range scalars are astronomically rare; draw again
        if let Ok(private_key) = PrivateKey::from_bytes(&bytes) {
            return DevAccount {
                name: "generated".to_string(),
                address: private_key.address(),
                private_key,
            };
        }
    }
}
