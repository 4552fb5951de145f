//! T1 - spectre integration test
//!
//! Boots a dev node and checks what every other suite relies on: chain id,
//! pre-funded accounts, manual sealing and a plain value transfer.

use spectre_testing_framework::prelude::*;

/// 1 UNIT
const ONE_UNIT: u128 = 1_000_000_000_000_000_000;

/// Suite declaration
pub fn suite() -> SuiteDeclaration {
    SuiteDeclaration::builder("T1", "spectre integration test", FoundationKind::Dev)
        .case("should report the configured chain id", |ctx| async move {
            let chain_id = ctx.client().chain_id().await?;
            ensure!(
                chain_id == ctx.chain_config().chain_id,
                "chain id {} differs from configured {}",
                chain_id,
                ctx.chain_config().chain_id
            );
            Ok(())
        })
        .case("should pre-fund the well-known accounts", |ctx| async move {
            let client = ctx.client();
            for account in ctx.dev_accounts() {
                let balance = client.balance(&account.address).await?;
                ensure!(balance > 0, "{} has no funds", account.name);
            }
            Ok(())
        })
        .case("should seal blocks on demand", |ctx| async move {
            let client = ctx.client();
            let before = client.block_number().await?;
            let block = ctx.create_block().await?;
            ensure!(block.number == before + 1, "sealed block {} after {}", block.number, before);
            assert_block_number(client.as_ref(), before + 1).await?;
            Ok(())
        })
        .case("should transfer from Alith to Baltathar", |ctx| async move {
            let client = ctx.client();
            let alith = ctx.alith();
            let baltathar = ctx.baltathar();
            let alith_before = client.balance(&alith.address).await?;
            let baltathar_before = client.balance(&baltathar.address).await?;

            let receipt = ctx
                .transfer_and_seal(alith, &baltathar.address, ONE_UNIT)
                .await?;
            ensure!(receipt.success, "transfer reverted");
            assert_included(client.as_ref(), &receipt.transaction_hash).await?;

            assert_balance(
                client.as_ref(),
                &baltathar.address,
                baltathar_before + ONE_UNIT,
            )
            .await?;
            // The fee is at most gas limit * gas price
            let max_fee = ctx.fee_params().max_fee();
            assert_balance_within(
                client.as_ref(),
                &alith.address,
                alith_before - ONE_UNIT - max_fee,
                alith_before - ONE_UNIT - 1,
            )
            .await?;
            Ok(())
        })
        .build()
}
