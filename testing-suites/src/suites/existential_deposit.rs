//! DF0101 - Existential Deposit disabled
//!
//! The dev chain runs with a zero existential deposit: accounts drained to
//! zero (or to dust) keep existing, and transfers of a single wei may create
//! new accounts.

use spectre_testing_framework::prelude::*;

/// 10 UNIT given to the throwaway account before every case
const FUNDING: u128 = 10_000_000_000_000_000_000;

/// Fund a fresh account from Alith and return it.
async fn funded_account(ctx: &Context) -> Result<DevAccount> {
    let account = ctx.generate_account();
    let receipt = ctx
        .transfer_and_seal(ctx.alith(), &account.address, FUNDING)
        .await?;
    ensure!(receipt.success, "funding transfer failed");
    assert_balance(ctx.client().as_ref(), &account.address, FUNDING).await?;
    Ok(account)
}

/// Suite declaration
pub fn suite() -> SuiteDeclaration {
    SuiteDeclaration::builder("DF0101", "Existential Deposit disabled", FoundationKind::Dev)
        .before_all(|ctx| async move {
            ensure!(
                ctx.chain_config().existential_deposit == 0,
                "dev chain spec has a non-zero existential deposit"
            );
            Ok(())
        })
        .case("should be disabled (no reaped account on 0 balance)", |ctx| async move {
            let account = funded_account(&ctx).await?;
            let client = ctx.client();

            let amount = FUNDING - ctx.transfer_fee();
            ctx.transfer_and_seal(&account, &ctx.alith().address, amount)
                .await?;

            assert_balance(client.as_ref(), &account.address, 0).await?;
            assert_nonce(client.as_ref(), &account.address, 1).await?;
            Ok(())
        })
        .case("should not reap on tiny balance", |ctx| async move {
            let account = funded_account(&ctx).await?;
            let client = ctx.client();

            let amount = FUNDING - 1 - ctx.transfer_fee();
            ctx.transfer_and_seal(&account, &ctx.baltathar().address, amount)
                .await?;

            assert_balance(client.as_ref(), &account.address, 1).await?;
            assert_nonce(client.as_ref(), &account.address, 1).await?;
            Ok(())
        })
        .case("should create new accounts with 1 wei", |ctx| async move {
            let fresh = ctx.generate_account();
            let receipt = ctx
                .transfer_and_seal(ctx.alith(), &fresh.address, 1)
                .await?;
            ensure!(receipt.success, "1 wei transfer failed");

            assert_balance(ctx.client().as_ref(), &fresh.address, 1).await?;
            Ok(())
        })
        .build()
}
