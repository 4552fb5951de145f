//! DevChain - in-process ephemeral chain
//!
//! Stands in for the node binary when foundations are provisioned
//! in-process. It models what the suites observe through the RPC surface of
//! a manual-seal dev node: pre-funded accounts, a transaction pool, block
//! sealing on request, receipts, and the balance/nonce/fee rules of a plain
//! value transfer.

use super::accounts::DEV_ACCOUNTS;
use super::transaction::{SignedTransaction, TRANSFER_GAS};
use super::{Address, BlockInfo, ChainClient, Receipt, TxHash};
use crate::config::ChainConfig;
use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Balance and nonce of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountState {
    /// Free balance in wei
    pub balance: u128,
    /// Number of transactions executed from this account
    pub nonce: u64,
}

struct PooledTransaction {
    sender: Address,
    tx: SignedTransaction,
}

#[derive(Default)]
struct ChainState {
    accounts: HashMap<Address, AccountState>,
    pool: Vec<PooledTransaction>,
    blocks: Vec<BlockInfo>,
    receipts: HashMap<TxHash, Receipt>,
    burned: u128,
}

impl ChainState {
    fn balance(&self, address: &Address) -> u128 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    fn next_nonce(&self, address: &Address) -> u64 {
        let executed = self.accounts.get(address).map(|a| a.nonce).unwrap_or(0);
        let pooled = self.pool.iter().filter(|p| p.sender == *address).count() as u64;
        executed + pooled
    }

    fn pending_spend(&self, address: &Address) -> u128 {
        self.pool
            .iter()
            .filter(|p| p.sender == *address)
            .map(|p| p.tx.tx.value.saturating_add(max_fee(&p.tx)))
            .fold(0u128, u128::saturating_add)
    }

    fn tip(&self) -> &BlockInfo {
        // Genesis is pushed on construction
        &self.blocks[self.blocks.len() - 1]
    }
}

fn max_fee(tx: &SignedTransaction) -> u128 {
    tx.tx.gas_price.saturating_mul(u128::from(tx.tx.gas_limit))
}

fn block_hash(parent: &TxHash, number: u64, transactions: &[TxHash]) -> TxHash {
    let mut hasher = Keccak256::new();
    hasher.update(parent.as_bytes());
    hasher.update(number.to_be_bytes());
    for tx in transactions {
        hasher.update(tx.as_bytes());
    }
    TxHash(hasher.finalize().into())
}

/// In-process chain shared by every node view of one foundation.
pub struct DevChain {
    config: ChainConfig,
    state: Mutex<ChainState>,
}

impl DevChain {
    /// Create a chain at genesis with the well-known accounts funded.
    pub fn new(config: ChainConfig) -> Self {
        let funded: Vec<_> = DEV_ACCOUNTS
            .iter()
            .map(|a| (a.address, config.genesis_balance))
            .collect();
        Self::with_genesis(config, &funded)
    }

    /// Create a chain at genesis with an explicit funding list.
    pub fn with_genesis(config: ChainConfig, funded: &[(Address, u128)]) -> Self {
        let mut state = ChainState::default();
        for (address, balance) in funded {
            state.accounts.insert(
                *address,
                AccountState {
                    balance: *balance,
                    nonce: 0,
                },
            );
        }
        let genesis_parent = TxHash(Keccak256::digest(config.chain_id.to_be_bytes()).into());
        state.blocks.push(BlockInfo {
            number: 0,
            hash: block_hash(&genesis_parent, 0, &[]),
            transactions: Vec::new(),
        });

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Chain parameters
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Height of the last sealed block
    pub fn block_number(&self) -> u64 {
        self.state.lock().tip().number
    }

    /// Account record, `None` if the account does not exist (never funded or reaped)
    pub fn account(&self, address: &Address) -> Option<AccountState> {
        self.state.lock().accounts.get(address).copied()
    }

    /// Free balance, 0 for unknown accounts
    pub fn balance(&self, address: &Address) -> u128 {
        self.state.lock().balance(address)
    }

    /// Next usable nonce including pooled transactions
    pub fn next_nonce(&self, address: &Address) -> u64 {
        self.state.lock().next_nonce(address)
    }

    /// Number of transactions waiting for the next block
    pub fn pool_len(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Sum of all balances
    pub fn total_balance(&self) -> u128 {
        self.state
            .lock()
            .accounts
            .values()
            .map(|a| a.balance)
            .fold(0u128, u128::saturating_add)
    }

    /// Fees and reaped dust removed from circulation
    pub fn burned(&self) -> u128 {
        self.state.lock().burned
    }

    /// Receipt of an included transaction
    pub fn receipt(&self, hash: &TxHash) -> Option<Receipt> {
        self.state.lock().receipts.get(hash).cloned()
    }

    /// Validate a transaction and add it to the pool.
    pub fn submit(&self, tx: SignedTransaction) -> Result<TxHash> {
        let sender = tx.recover_sender().context("Invalid transaction signature")?;
        let hash = tx.hash();
        let mut state = self.state.lock();

        if tx.tx.chain_id != self.config.chain_id {
            bail!(
                "Invalid chain id: expected {}, got {}",
                self.config.chain_id,
                tx.tx.chain_id
            );
        }
        if tx.tx.gas_price < self.config.min_gas_price {
            bail!(
                "Gas price {} below minimum {}",
                tx.tx.gas_price,
                self.config.min_gas_price
            );
        }
        if tx.tx.gas_limit < TRANSFER_GAS {
            bail!("Intrinsic gas too low: {}", tx.tx.gas_limit);
        }
        if state.receipts.contains_key(&hash) || state.pool.iter().any(|p| p.tx.hash() == hash) {
            bail!("Transaction {} already known", hash);
        }

        let expected_nonce = state.next_nonce(&sender);
        if tx.tx.nonce != expected_nonce {
            bail!(
                "Invalid nonce for {}: expected {}, got {}",
                sender,
                expected_nonce,
                tx.tx.nonce
            );
        }

        let required = state
            .pending_spend(&sender)
            .saturating_add(tx.tx.value)
            .saturating_add(max_fee(&tx));
        let available = state.balance(&sender);
        if available < required {
            bail!(
                "Insufficient balance for {}: need {}, have {}",
                sender,
                required,
                available
            );
        }

        let ed = self.config.existential_deposit;
        if ed > 0 && !state.accounts.contains_key(&tx.tx.to) && tx.tx.value < ed {
            bail!(
                "Transfer of {} to {} is below the existential deposit {}",
                tx.tx.value,
                tx.tx.to,
                ed
            );
        }

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Pooled tx {} from {} (nonce {}, value {})",
                hash,
                sender,
                tx.tx.nonce,
                tx.tx.value
            );
        }
        state.pool.push(PooledTransaction { sender, tx });
        Ok(hash)
    }

    /// Seal a block containing every pooled transaction, in submission order.
    pub fn seal_block(&self) -> BlockInfo {
        let mut state = self.state.lock();
        let pool = std::mem::take(&mut state.pool);
        let number = state.tip().number + 1;
        let parent = state.tip().hash;
        let ed = self.config.existential_deposit;

        let mut included = Vec::with_capacity(pool.len());
        for PooledTransaction { sender, tx } in pool {
            let fee = tx.tx.gas_price.saturating_mul(u128::from(TRANSFER_GAS));
            let value = tx.tx.value;
            // The recipient may have been reaped since the transfer was pooled
            let below_deposit =
                ed > 0 && value < ed && !state.accounts.contains_key(&tx.tx.to);
            if below_deposit {
                log::debug!(
                    "Transfer {} to {} would leave it below the existential deposit",
                    tx.hash(),
                    tx.tx.to
                );
            }

            let sender_state = state.accounts.entry(sender).or_default();
            let success = !below_deposit && sender_state.balance >= value.saturating_add(fee);
            let charged = if success {
                sender_state.balance -= value + fee;
                fee
            } else {
                let charged = fee.min(sender_state.balance);
                sender_state.balance -= charged;
                charged
            };
            sender_state.nonce += 1;
            let remaining = sender_state.balance;
            state.burned = state.burned.saturating_add(charged);

            if success && value > 0 {
                let recipient = state.accounts.entry(tx.tx.to).or_default();
                recipient.balance = recipient.balance.saturating_add(value);
            }

            if ed > 0 && remaining < ed {
                state.accounts.remove(&sender);
                state.burned = state.burned.saturating_add(remaining);
                log::debug!("Reaped {} with dust {}", sender, remaining);
            }

            let hash = tx.hash();
            state.receipts.insert(
                hash,
                Receipt {
                    transaction_hash: hash,
                    block_number: number,
                    success,
                    gas_used: TRANSFER_GAS,
                },
            );
            included.push(hash);
        }

        let block = BlockInfo {
            number,
            hash: block_hash(&parent, number, &included),
            transactions: included,
        };
        log::debug!(
            "Sealed block #{} {} with {} transactions",
            block.number,
            block.hash,
            block.transactions.len()
        );
        state.blocks.push(block.clone());
        block
    }
}

/// One node's view of a [`DevChain`].
///
/// Several clients can share a chain (zombie nodes joined through the
/// bootnode); each has its own liveness so a stopped node stops answering.
///
/// ```
/// # use spectre_testing_framework::prelude::*;
/// # use spectre_testing_framework::chain::{DevChain, DevChainClient};
/// # tokio_test::block_on(async {
/// let chain = Arc::new(DevChain::new(ChainConfig::default()));
/// let client = DevChainClient::new(chain.clone());
///
/// let fee = FeeParams::for_chain(client.chain_id().await.unwrap());
/// let tx = build_transfer(&ALITH, &BALTATHAR.address, 1_000, 0, &fee);
/// let hash = client.submit_transaction(&tx).await.unwrap();
/// client.create_block().await.unwrap();
///
/// assert!(client.receipt(&hash).await.unwrap().unwrap().success);
/// client.stop();
/// assert!(client.block_number().await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct DevChainClient {
    chain: Arc<DevChain>,
    running: Arc<AtomicBool>,
}

impl DevChainClient {
    /// Running client over `chain`
    pub fn new(chain: Arc<DevChain>) -> Self {
        Self {
            chain,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Underlying chain, for deep assertions in tests
    pub fn chain(&self) -> &Arc<DevChain> {
        &self.chain
    }

    /// Whether this node still answers requests
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop answering requests
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.is_running() {
            bail!("Node is not running");
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for DevChainClient {
    async fn chain_id(&self) -> Result<u64> {
        self.ensure_running()?;
        Ok(self.chain.config().chain_id)
    }

    async fn block_number(&self) -> Result<u64> {
        self.ensure_running()?;
        Ok(self.chain.block_number())
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        self.ensure_running()?;
        Ok(self.chain.balance(address))
    }

    async fn nonce(&self, address: &Address) -> Result<u64> {
        self.ensure_running()?;
        Ok(self.chain.next_nonce(address))
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxHash> {
        self.ensure_running()?;
        self.chain.submit(tx.clone())
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>> {
        self.ensure_running()?;
        Ok(self.chain.receipt(hash))
    }

    async fn create_block(&self) -> Result<BlockInfo> {
        self.ensure_running()?;
        Ok(self.chain.seal_block())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::accounts::{generate_account, ALITH, BALTATHAR, CHARLETH};
    use crate::chain::transaction::{build_transfer, FeeParams, MIN_GAS_PRICE};

    fn chain() -> DevChain {
        DevChain::new(ChainConfig::default())
    }

    fn fee() -> FeeParams {
        FeeParams::for_chain(ChainConfig::default().chain_id)
    }

    const TRANSFER_FEE: u128 = MIN_GAS_PRICE * 21_000;

    #[test]
    fn test_genesis_state() {
        let chain = chain();
        assert_eq!(chain.block_number(), 0);
        assert_eq!(chain.balance(&ALITH.address), 1 << 80);
        assert_eq!(chain.next_nonce(&ALITH.address), 0);
        assert_eq!(chain.total_balance(), 4 * (1u128 << 80));
    }

    #[test]
    fn test_transfer_and_seal() {
        let chain = chain();
        let tx = build_transfer(&ALITH, &BALTATHAR.address, 1_000, 0, &fee());
        let hash = chain.submit(tx).unwrap();

        assert_eq!(chain.pool_len(), 1);
        assert_eq!(chain.next_nonce(&ALITH.address), 1);
        assert!(chain.receipt(&hash).is_none());

        let block = chain.seal_block();
        assert_eq!(block.number, 1);
        assert_eq!(block.transactions, vec![hash]);
        assert_eq!(chain.pool_len(), 0);

        let receipt = chain.receipt(&hash).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(chain.balance(&BALTATHAR.address), (1 << 80) + 1_000);
        assert_eq!(
            chain.balance(&ALITH.address),
            (1 << 80) - 1_000 - TRANSFER_FEE
        );
        assert_eq!(chain.account(&ALITH.address).unwrap().nonce, 1);
    }

    #[test]
    fn test_balance_conservation_counts_burned_fees() {
        let chain = chain();
        let before = chain.total_balance();
        for nonce in 0..3 {
            let tx = build_transfer(&ALITH, &CHARLETH.address, 5, nonce, &fee());
            chain.submit(tx).unwrap();
        }
        chain.seal_block();
        assert_eq!(chain.total_balance() + chain.burned(), before);
        assert_eq!(chain.burned(), 3 * TRANSFER_FEE);
    }

    #[test]
    fn test_rejects_bad_nonce() {
        let chain = chain();
        let tx = build_transfer(&ALITH, &BALTATHAR.address, 1, 5, &fee());
        let err = chain.submit(tx).unwrap_err();
        assert!(err.to_string().contains("Invalid nonce"));
    }

    #[test]
    fn test_rejects_duplicate() {
        let chain = chain();
        let tx = build_transfer(&ALITH, &BALTATHAR.address, 1, 0, &fee());
        chain.submit(tx.clone()).unwrap();
        assert!(chain.submit(tx).is_err());
    }

    #[test]
    fn test_rejects_wrong_chain_and_low_gas_price() {
        let chain = chain();
        let wrong_chain = build_transfer(&ALITH, &BALTATHAR.address, 1, 0, &FeeParams::for_chain(1));
        assert!(chain.submit(wrong_chain).is_err());

        let mut cheap = fee();
        cheap.gas_price = 1;
        let tx = build_transfer(&ALITH, &BALTATHAR.address, 1, 0, &cheap);
        assert!(chain.submit(tx).unwrap_err().to_string().contains("Gas price"));
    }

    #[test]
    fn test_rejects_insufficient_balance_including_pool() {
        let chain = chain();
        let poor = generate_account();
        let funding = 2 * TRANSFER_FEE + 10;
        chain
            .submit(build_transfer(&ALITH, &poor.address, funding, 0, &fee()))
            .unwrap();
        chain.seal_block();

        chain
            .submit(build_transfer(&poor, &BALTATHAR.address, 10, 0, &fee()))
            .unwrap();
        // Second spend would exceed what is left after the pooled one
        let err = chain
            .submit(build_transfer(&poor, &BALTATHAR.address, 10, 1, &fee()))
            .unwrap_err();
        assert!(err.to_string().contains("Insufficient balance"));
    }

    #[test]
    fn test_existential_deposit_disabled_keeps_empty_accounts() {
        let chain = chain();
        let account = generate_account();
        let amount = TRANSFER_FEE + 1_000;
        chain
            .submit(build_transfer(&ALITH, &account.address, amount, 0, &fee()))
            .unwrap();
        chain.seal_block();

        chain
            .submit(build_transfer(&account, &BALTATHAR.address, 1_000, 0, &fee()))
            .unwrap();
        chain.seal_block();

        let state = chain.account(&account.address).unwrap();
        assert_eq!(state.balance, 0);
        assert_eq!(state.nonce, 1);
    }

    #[test]
    fn test_existential_deposit_enabled_reaps_and_rejects() {
        let config = ChainConfig {
            existential_deposit: 1_000_000,
            ..ChainConfig::default()
        };
        let chain = DevChain::new(config);
        let fresh = generate_account();

        let err = chain
            .submit(build_transfer(&ALITH, &fresh.address, 10, 0, &fee()))
            .unwrap_err();
        assert!(err.to_string().contains("existential deposit"));

        let amount = TRANSFER_FEE + 2_000_000;
        chain
            .submit(build_transfer(&ALITH, &fresh.address, amount, 0, &fee()))
            .unwrap();
        chain.seal_block();
        chain
            .submit(build_transfer(&fresh, &BALTATHAR.address, 1_500_000, 0, &fee()))
            .unwrap();
        chain.seal_block();

        // 500_000 left, below the deposit: account is gone and its nonce reset
        assert!(chain.account(&fresh.address).is_none());
        assert_eq!(chain.next_nonce(&fresh.address), 0);
    }

    #[test]
    fn test_transfer_to_account_reaped_in_same_block_fails() {
        let config = ChainConfig {
            existential_deposit: 1_000_000,
            ..ChainConfig::default()
        };
        let chain = DevChain::new(config);
        let doomed = generate_account();
        let amount = TRANSFER_FEE + 2_000_000;
        chain
            .submit(build_transfer(&ALITH, &doomed.address, amount, 0, &fee()))
            .unwrap();
        chain.seal_block();

        // Leaves 500_000 behind, so `doomed` is reaped when this block seals.
        // The dust transfer is pooled while `doomed` still exists.
        chain
            .submit(build_transfer(&doomed, &BALTATHAR.address, 1_500_000, 0, &fee()))
            .unwrap();
        let dust = chain
            .submit(build_transfer(&CHARLETH, &doomed.address, 10, 0, &fee()))
            .unwrap();
        chain.seal_block();

        assert!(!chain.receipt(&dust).unwrap().success);
        assert!(chain.account(&doomed.address).is_none());
        assert_eq!(chain.balance(&CHARLETH.address), (1 << 80) - TRANSFER_FEE);
        assert_eq!(chain.account(&CHARLETH.address).unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_client_lifecycle() {
        let client = DevChainClient::new(Arc::new(chain()));
        assert_eq!(client.chain_id().await.unwrap(), 1281);
        assert_eq!(client.block_number().await.unwrap(), 0);

        client.stop();
        assert!(!client.is_running());
        assert!(client.block_number().await.is_err());
    }

    #[tokio::test]
    async fn test_clients_share_chain() {
        let shared = Arc::new(chain());
        let a = DevChainClient::new(shared.clone());
        let b = DevChainClient::new(shared);

        let tx = build_transfer(&ALITH, &BALTATHAR.address, 7, 0, &fee());
        let hash = a.submit_transaction(&tx).await.unwrap();
        b.create_block().await.unwrap();

        assert_eq!(a.block_number().await.unwrap(), 1);
        assert!(b.receipt(&hash).await.unwrap().unwrap().success);

        a.stop();
        assert!(b.block_number().await.is_ok());
    }
}
