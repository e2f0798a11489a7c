//! Minimal contract towards the external cache subsystem.
//!
//! The aggregation core never stores blocks itself. When the aggregate head
//! promotes a new tip it notifies the cache through this sink; cache-aware
//! upstream drivers receive the same handle when they join a multistream.

use crate::{types::BlockRef, upstream::head::Head};
use std::sync::Arc;

/// Position tag for a cached block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// The block is the current chain tip.
    Latest,
}

/// Sink towards the external cache subsystem.
pub trait HeadCache: Send + Sync {
    /// Records a block at the given position.
    fn cache(&self, tag: CacheTag, block: &BlockRef);

    /// Hands the cache a head to follow on its own. Optional; the default
    /// implementation ignores the head since `cache` already receives every
    /// promoted tip.
    fn set_head(&self, _head: Arc<Head>) {}
}
