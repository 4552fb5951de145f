//! Chain state assertion helpers
//!
//! Readable assertions over any [`ChainClient`], returning an error with the
//! expected and actual values instead of panicking so suite bodies can `?`
//! them.

use super::{Address, ChainClient, TxHash};
use anyhow::{Context, Result};

/// Assert that `address` holds exactly `expected` wei.
///
/// # Example
///
/// ```rust,ignore
/// assert_balance(ctx.client().as_ref(), &account.address, 0).await?;
/// ```
pub async fn assert_balance<C: ChainClient + ?Sized>(
    client: &C,
    address: &Address,
    expected: u128,
) -> Result<()> {
    let actual = client
        .balance(address)
        .await
        .with_context(|| format!("Failed to get balance for {}", address))?;

    if actual != expected {
        anyhow::bail!(
            "Balance mismatch for {}: expected {}, got {}",
            address,
            expected,
            actual
        );
    }
    Ok(())
}

/// Assert that the balance of `address` lies in `[min, max]`.
pub async fn assert_balance_within<C: ChainClient + ?Sized>(
    client: &C,
    address: &Address,
    min: u128,
    max: u128,
) -> Result<()> {
    let actual = client
        .balance(address)
        .await
        .with_context(|| format!("Failed to get balance for {}", address))?;

    if actual < min || actual > max {
        anyhow::bail!(
            "Balance of {} out of range: expected [{}, {}], got {}",
            address,
            min,
            max,
            actual
        );
    }
    Ok(())
}

/// Assert the next usable nonce of `address`.
pub async fn assert_nonce<C: ChainClient + ?Sized>(
    client: &C,
    address: &Address,
    expected: u64,
) -> Result<()> {
    let actual = client
        .nonce(address)
        .await
        .with_context(|| format!("Failed to get nonce for {}", address))?;

    if actual != expected {
        anyhow::bail!(
            "Nonce mismatch for {}: expected {}, got {}",
            address,
            expected,
            actual
        );
    }
    Ok(())
}

/// Assert the best block height.
pub async fn assert_block_number<C: ChainClient + ?Sized>(client: &C, expected: u64) -> Result<()> {
    let actual = client
        .block_number()
        .await
        .context("Failed to get block number")?;

    if actual != expected {
        anyhow::bail!("Block number mismatch: expected {}, got {}", expected, actual);
    }
    Ok(())
}

/// Assert that `hash` was included and executed successfully.
pub async fn assert_included<C: ChainClient + ?Sized>(client: &C, hash: &TxHash) -> Result<()> {
    let receipt = client
        .receipt(hash)
        .await
        .with_context(|| format!("Failed to get receipt for {}", hash))?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} is not included", hash))?;

    if !receipt.success {
        anyhow::bail!(
            "Transaction {} failed in block {}",
            hash,
            receipt.block_number
        );
    }
    Ok(())
}
