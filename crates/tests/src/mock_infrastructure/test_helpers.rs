//! Shared helpers for the integration scenarios.

use alloy_primitives::U256;
use manifold_core::types::{BlockRef, Chain, Hash32};
use std::time::Duration;

/// The chain every scenario runs against.
#[must_use]
pub fn eth_chain() -> Chain {
    Chain::new(100, "ETH")
}

/// A block with a synthetic hash derived from its height.
#[must_use]
pub fn block_at(height: u64, weight: u64) -> BlockRef {
    #[allow(clippy::cast_possible_truncation)]
    let hash = Hash32([height as u8; 32]);
    BlockRef::new(hash, height, U256::from(weight))
}

/// A block with an explicit 0x-prefixed hash.
///
/// # Panics
///
/// Panics when the hash literal is malformed; scenarios use fixed literals.
#[must_use]
pub fn block_with_hash(hash: &str, height: u64, weight: u64) -> BlockRef {
    BlockRef::new(hash.try_into().expect("valid hash literal"), height, U256::from(weight))
}

/// Lets spawned observer tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
