//! Weight-monotonic chain tip tracking.
//!
//! A [`Head`] holds the best block a party has seen so far and publishes
//! every promotion. The promotion rule is strict: an incoming block replaces
//! the current tip only when its total-difficulty weight is strictly
//! greater. Equal or smaller weight is ignored even when the height differs,
//! so on a weight tie the first-seen block wins.
//!
//! Two read paths exist:
//!
//! - `current()` / `wait_for_current(timeout)`: the latest promoted block,
//!   with an awaitable variant for callers arriving before the first block.
//! - `flux()`: a broadcast of promoted blocks. Subscribers only see
//!   promotions from their subscription point forward; slow subscribers drop
//!   old promotions rather than blocking the promoter.

use crate::{errors::MultistreamError, types::BlockRef};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::trace;

/// Buffered promotions per flux subscriber before the oldest are dropped.
const FLUX_BUFFER: usize = 64;

/// The current best block as seen by one upstream or by the aggregate.
pub struct Head {
    current: watch::Sender<Option<BlockRef>>,
    flux: broadcast::Sender<BlockRef>,
}

impl Head {
    /// Creates an empty head with no current block.
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        let (flux, _) = broadcast::channel(FLUX_BUFFER);
        Self { current, flux }
    }

    /// Returns the current best block, if any was promoted yet.
    #[must_use]
    pub fn current(&self) -> Option<BlockRef> {
        self.current.borrow().clone()
    }

    /// Returns the height of the current best block.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::NotInitialized`] if no block was ever
    /// promoted. Consumers treat this as "height unknown".
    pub fn height(&self) -> Result<u64, MultistreamError> {
        self.current().map(|b| b.height).ok_or(MultistreamError::NotInitialized)
    }

    /// Promotes `block` to current iff its weight is strictly greater than
    /// the current block's. Returns whether the promotion happened.
    ///
    /// The compare-and-store runs under the watch sender's internal lock, so
    /// concurrent promoters cannot regress the tip.
    pub fn try_advance(&self, block: BlockRef) -> bool {
        let advanced = self.current.send_if_modified(|current| match current {
            Some(existing) if block.weight <= existing.weight => false,
            _ => {
                *current = Some(block.clone());
                true
            }
        });

        if advanced {
            trace!(height = block.height, hash = %block.hash, "head advanced");
            // No subscribers is fine; the watch side still has the block.
            let _ = self.flux.send(block);
        }

        advanced
    }

    /// Subscribes to promotions from this point forward.
    #[must_use]
    pub fn flux(&self) -> broadcast::Receiver<BlockRef> {
        self.flux.subscribe()
    }

    /// Watch handle over the current block, for callers that want coalesced
    /// updates rather than every promotion.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<BlockRef>> {
        self.current.subscribe()
    }

    /// Returns the current block, waiting up to `timeout` for the first
    /// promotion if none happened yet.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::HeadTimeout`] when the deadline expires,
    /// or [`MultistreamError::HeadFault`] if the head was dropped mid-wait.
    pub async fn wait_for_current(&self, timeout: Duration) -> Result<BlockRef, MultistreamError> {
        if let Some(block) = self.current() {
            return Ok(block);
        }

        let mut watch = self.current.subscribe();
        let wait = async {
            loop {
                // Re-check after subscribing: a promotion may have landed
                // between the fast path above and the subscription.
                if let Some(block) = watch.borrow_and_update().clone() {
                    return Ok(block);
                }
                watch
                    .changed()
                    .await
                    .map_err(|_| MultistreamError::HeadFault("head closed".to_string()))?;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| MultistreamError::HeadTimeout)?
    }
}

impl Default for Head {
    fn default() -> Self {
        Self::new()
    }
}
