//! END TO END MVP - multi-node network
//!
//! Runs against a zombie foundation: relay validators plus the spectre
//! collator. Every node must agree on the chain and see transactions
//! submitted through any other node.

use spectre_testing_framework::prelude::*;
use std::time::Duration;

const BLOCK_WAIT: Duration = Duration::from_millis(100);
const BLOCK_WAIT_ATTEMPTS: usize = 300;

/// Get a new block authored on `node`.
///
/// Nodes that support manual sealing seal right away; otherwise wait for the
/// network to author one.
async fn produce_block(node: &dyn ChainClient) -> Result<u64> {
    let before = node.block_number().await?;
    if let Ok(block) = node.create_block().await {
        return Ok(block.number);
    }
    for _ in 0..BLOCK_WAIT_ATTEMPTS {
        tokio::time::sleep(BLOCK_WAIT).await;
        let now = node.block_number().await?;
        if now > before {
            return Ok(now);
        }
    }
    bail!("no block authored after #{}", before)
}

/// Suite declaration
pub fn suite() -> SuiteDeclaration {
    SuiteDeclaration::builder(
        "END TO END MVP",
        "TEST INTEGRATION ON SPECTRE NODE, PHALA CONTRACT AND USER SIMULATED INTERACTION",
        FoundationKind::Zombie,
    )
    .before_all(|ctx| async move {
        let names: Vec<&str> = ctx.topology().iter().map(|n| n.name.as_str()).collect();
        log::info!("zombie network up: {}", names.join(", "));
        ensure!(ctx.nodes().len() >= 2, "zombie network needs at least two nodes");
        Ok(())
    })
    .case("every node reports the same chain id", |ctx| async move {
        let expected = ctx.chain_config().chain_id;
        for (node, info) in ctx.nodes().iter().zip(ctx.topology()) {
            let chain_id = node.chain_id().await?;
            ensure!(
                chain_id == expected,
                "{} reports chain id {}, expected {}",
                info.name,
                chain_id,
                expected
            );
        }
        Ok(())
    })
    .case("every node follows the same best block", |ctx| async move {
        let collator = ctx.nodes().last().cloned().ok_or_else(|| anyhow::anyhow!("no nodes"))?;
        let height = produce_block(collator.as_ref()).await?;
        for (node, info) in ctx.nodes().iter().zip(ctx.topology()) {
            let number = node.block_number().await?;
            ensure!(number >= height, "{} is behind at #{} < #{}", info.name, number, height);
        }
        Ok(())
    })
    .case("a transfer submitted to one node is visible from every node", |ctx| async move {
        let recipient = ctx.generate_account();
        let value = 1_000_000u128;
        let entry = ctx.node(0).ok_or_else(|| anyhow::anyhow!("no bootnode"))?;

        let tx = ctx.create_transfer(ctx.alith(), &recipient.address, value).await?;
        let hash = entry.submit_transaction(&tx).await?;

        let mut included = false;
        for _ in 0..BLOCK_WAIT_ATTEMPTS {
            let collator = ctx.nodes().last().cloned().ok_or_else(|| anyhow::anyhow!("no nodes"))?;
            produce_block(collator.as_ref()).await?;
            if entry.receipt(&hash).await?.is_some() {
                included = true;
                break;
            }
        }
        ensure!(included, "transaction {} never included", hash);

        for (node, info) in ctx.nodes().iter().zip(ctx.topology()) {
            assert_included(node.as_ref(), &hash)
                .await
                .map_err(|e| e.context(format!("on node {}", info.name)))?;
            assert_balance(node.as_ref(), &recipient.address, value).await?;
        }
        Ok(())
    })
    .build()
}
