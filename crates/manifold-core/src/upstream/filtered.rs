//! Ordered, single-pass sequence of eligible upstreams for one request.
//!
//! `FilteredApis` is the api source handed out per call. The order is fixed
//! at construction from a membership snapshot:
//!
//! 1. filter by the request's [`Matcher`](super::selector::Matcher),
//! 2. partition primaries before fallbacks,
//! 3. rotate each partition by `seed % len` so load spreads across callers,
//! 4. stable-sort each partition: available upstreams first, then lower lag
//!    first (unknown lag sorts last within its availability class).
//!
//! Callers walk the sequence until one upstream serves the call. An empty
//! sequence means no upstream was eligible at all, which is a different
//! failure than a call that failed on every candidate.

use crate::{
    config::UpstreamRole,
    types::Chain,
    upstream::{
        selector::{UpstreamFilter, UpstreamSort},
        Upstream,
    },
};
use std::sync::Arc;

/// A finite, ordered, single-pass sequence of upstream handles.
pub struct FilteredApis {
    chain: Chain,
    ordered: Vec<Arc<dyn Upstream>>,
    position: usize,
}

impl FilteredApis {
    /// Builds the sequence from a membership snapshot.
    ///
    /// `seed` comes from the multistream's rotation counter; two calls with
    /// the same filter over identical membership yield the same *set* of
    /// upstreams, rotated by their seeds.
    #[must_use]
    pub fn new(
        chain: Chain,
        upstreams: &[Arc<dyn Upstream>],
        filter: &UpstreamFilter,
        seed: u32,
    ) -> Self {
        let mut primary: Vec<Arc<dyn Upstream>> = Vec::new();
        let mut fallback: Vec<Arc<dyn Upstream>> = Vec::new();

        for upstream in upstreams {
            if !filter.matcher.matches(upstream.as_ref()) {
                continue;
            }
            match upstream.role() {
                UpstreamRole::Primary => primary.push(Arc::clone(upstream)),
                UpstreamRole::Fallback => fallback.push(Arc::clone(upstream)),
            }
        }

        rotate(&mut primary, seed);
        rotate(&mut fallback, seed);

        if filter.sort == UpstreamSort::AvailabilityThenLag {
            sort_partition(&mut primary);
            sort_partition(&mut fallback);
        }

        let mut ordered = primary;
        ordered.append(&mut fallback);

        Self { chain, ordered, position: 0 }
    }

    /// Chain the sequence was built for.
    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Returns `true` when no upstream was eligible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Number of eligible upstreams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Peeks at the full order without consuming the sequence.
    #[must_use]
    pub fn as_slice(&self) -> &[Arc<dyn Upstream>] {
        &self.ordered
    }
}

impl Iterator for FilteredApis {
    type Item = Arc<dyn Upstream>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.ordered.get(self.position)?;
        self.position += 1;
        Some(Arc::clone(item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ordered.len() - self.position;
        (remaining, Some(remaining))
    }
}

fn rotate(partition: &mut [Arc<dyn Upstream>], seed: u32) {
    if partition.is_empty() {
        return;
    }
    let shift = (seed as usize) % partition.len();
    partition.rotate_left(shift);
}

fn sort_partition(partition: &mut [Arc<dyn Upstream>]) {
    // Stable: equal keys keep the rotated order.
    partition.sort_by_key(|u| (!u.is_available(), u.lag().unwrap_or(u64::MAX)));
}
