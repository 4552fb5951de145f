//! Suite context
//!
//! The handle given to hooks and test cases. It exposes the connected chain
//! clients and pure helpers (accounts, transfer building) and nothing that
//! controls the foundation's lifecycle. Once the foundation is torn down every
//! client call through a context fails.

use crate::chain::accounts::{self, DevAccount, ALITH, BALTATHAR, CHARLETH, DEV_ACCOUNTS, DOROTHY};
use crate::chain::{build_transfer, Address, BlockInfo, ChainClient, FeeParams, Receipt, SignedTransaction};
use crate::config::ChainConfig;
use crate::foundation::{Foundation, FoundationKind, NodeInfo};
use anyhow::{anyhow, Context as _, Result};
use std::sync::Arc;

struct ContextInner {
    suite_id: String,
    kind: FoundationKind,
    chain: ChainConfig,
    nodes: Vec<NodeInfo>,
    clients: Vec<Arc<dyn ChainClient>>,
}

/// Connection to one foundation for the duration of a suite.
///
/// Cheap to clone; every clone refers to the same foundation.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(suite_id: &str, foundation: &Foundation) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                suite_id: suite_id.to_string(),
                kind: foundation.kind(),
                chain: foundation.chain_config().clone(),
                nodes: foundation.topology(),
                clients: foundation.clients(),
            }),
        }
    }

    /// Id of the running suite
    pub fn suite_id(&self) -> &str {
        &self.inner.suite_id
    }

    /// Kind of the underlying foundation
    pub fn foundation_kind(&self) -> FoundationKind {
        self.inner.kind
    }

    /// Client of the first node (the only one on a dev foundation)
    pub fn client(&self) -> Arc<dyn ChainClient> {
        self.inner.clients[0].clone()
    }

    /// Client of node `index` in start order
    pub fn node(&self, index: usize) -> Option<Arc<dyn ChainClient>> {
        self.inner.clients.get(index).cloned()
    }

    /// Every node's client in start order
    pub fn nodes(&self) -> &[Arc<dyn ChainClient>] {
        &self.inner.clients
    }

    /// Names, roles, endpoints and ports of the nodes
    pub fn topology(&self) -> &[NodeInfo] {
        &self.inner.nodes
    }

    /// Chain parameters
    pub fn chain_config(&self) -> &ChainConfig {
        &self.inner.chain
    }

    /// Gas and fee parameters the transfer builder uses
    pub fn fee_params(&self) -> FeeParams {
        FeeParams {
            gas_price: self.inner.chain.min_gas_price,
            ..FeeParams::for_chain(self.inner.chain.chain_id)
        }
    }

    /// Fee charged for one transfer built by this context
    pub fn transfer_fee(&self) -> u128 {
        let fee = self.fee_params();
        fee.gas_price
            .saturating_mul(u128::from(crate::chain::transaction::TRANSFER_GAS))
    }

    /// Alith, the sudo account
    pub fn alith(&self) -> &'static DevAccount {
        &ALITH
    }

    /// Baltathar
    pub fn baltathar(&self) -> &'static DevAccount {
        &BALTATHAR
    }

    /// Charleth
    pub fn charleth(&self) -> &'static DevAccount {
        &CHARLETH
    }

    /// Dorothy
    pub fn dorothy(&self) -> &'static DevAccount {
        &DOROTHY
    }

    /// Every pre-funded account
    pub fn dev_accounts(&self) -> &'static [DevAccount] {
        &DEV_ACCOUNTS
    }

    /// Fresh unfunded account
    pub fn generate_account(&self) -> DevAccount {
        accounts::generate_account()
    }

    /// Build a signed transfer, looking the sender's next nonce up on the
    /// first node.
    pub async fn create_transfer(
        &self,
        from: &DevAccount,
        to: &Address,
        value: u128,
    ) -> Result<SignedTransaction> {
        let nonce = self
            .client()
            .nonce(&from.address)
            .await
            .with_context(|| format!("Failed to get nonce of {}", from.name))?;
        Ok(build_transfer(from, to, value, nonce, &self.fee_params()))
    }

    /// Seal a block on the first node.
    pub async fn create_block(&self) -> Result<BlockInfo> {
        self.client().create_block().await
    }

    /// Submit a transfer, seal a block and return the receipt.
    pub async fn transfer_and_seal(
        &self,
        from: &DevAccount,
        to: &Address,
        value: u128,
    ) -> Result<Receipt> {
        let client = self.client();
        let tx = self.create_transfer(from, to, value).await?;
        let hash = client
            .submit_transaction(&tx)
            .await
            .with_context(|| format!("Transfer from {} rejected", from.name))?;
        client.create_block().await?;
        client
            .receipt(&hash)
            .await?
            .ok_or_else(|| anyhow!("Transaction {} not included in the sealed block", hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::{InProcessLauncher, ProvisionOptions, Provisioner};

    async fn provisioned(kind: FoundationKind) -> (Provisioner, Foundation) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let options = ProvisionOptions {
            base_port: listener.local_addr().unwrap().port().min(60_000),
            ..ProvisionOptions::default()
        };
        let provisioner = Provisioner::new(Arc::new(InProcessLauncher::new()), options);
        let foundation = provisioner.provision("ctx", kind).await.unwrap();
        (provisioner, foundation)
    }

    #[tokio::test]
    async fn test_transfer_and_seal() {
        let (provisioner, mut foundation) = provisioned(FoundationKind::Dev).await;
        let ctx = Context::new("ctx", &foundation);
        let recipient = ctx.generate_account();

        let receipt = ctx
            .transfer_and_seal(ctx.alith(), &recipient.address, 1_000)
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(ctx.client().balance(&recipient.address).await.unwrap(), 1_000);

        // Nonce is looked up, so a second transfer needs no bookkeeping
        ctx.transfer_and_seal(ctx.alith(), &recipient.address, 1)
            .await
            .unwrap();
        assert_eq!(ctx.client().nonce(&ctx.alith().address).await.unwrap(), 2);

        provisioner.teardown(&mut foundation, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_context_unusable_after_teardown() {
        let (provisioner, mut foundation) = provisioned(FoundationKind::Dev).await;
        let ctx = Context::new("ctx", &foundation);
        provisioner.teardown(&mut foundation, false).await.unwrap();

        let leaked = ctx.clone();
        assert!(leaked.client().block_number().await.is_err());
        assert!(leaked
            .create_transfer(leaked.alith(), &leaked.baltathar().address, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_zombie_context_exposes_every_node() {
        let (provisioner, mut foundation) = provisioned(FoundationKind::Zombie).await;
        let ctx = Context::new("ctx", &foundation);

        assert_eq!(ctx.nodes().len(), 3);
        assert_eq!(ctx.topology()[2].name, "spectre-collator");
        assert!(ctx.node(3).is_none());
        assert_eq!(ctx.fee_params().chain_id, 1281);
        assert_eq!(ctx.dev_accounts().len(), 4);

        provisioner.teardown(&mut foundation, false).await.unwrap();
    }
}
