//! Reduction of member upstreams into one aggregate view.
//!
//! [`MultistreamState`] is a pure reducer: the orchestrator task is its only
//! writer, readers get cheap copies of the derived values. Each reduction
//! produces a [`MultistreamStateEvent`] diff when anything changed.
//!
//! [`AvailabilityReducer`] backs the status stream: it tracks each member's
//! last known status in a concurrent map, reduces to the worst value, and
//! deduplicates consecutive equal aggregates. Entries are evicted when an
//! upstream is removed so the map stays bounded by live membership.

use crate::{
    config::{Labels, UpstreamRole},
    types::Chain,
    upstream::{
        events::MultistreamStateEvent, group_by_labels, AggregatedCallMethods, CallMethods,
        Capability, EgressSubscription, FinalizationType, LowerBoundType, Upstream,
        UpstreamAvailability, UpstreamId,
    },
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Count of upstreams per identical label set, used for label-scoped quorums.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuorumForLabels {
    items: Vec<(Labels, usize)>,
}

impl QuorumForLabels {
    #[must_use]
    pub fn new(groups: BTreeMap<Labels, usize>) -> Self {
        Self { items: groups.into_iter().collect() }
    }

    #[must_use]
    pub fn items(&self) -> &[(Labels, usize)] {
        &self.items
    }

    /// Number of upstreams advertising exactly this label set.
    #[must_use]
    pub fn count_for(&self, labels: &Labels) -> usize {
        self.items.iter().find(|(l, _)| l == labels).map_or(0, |(_, c)| *c)
    }
}

/// Aggregate view over the current membership.
pub struct MultistreamState {
    chain: Chain,
    status: UpstreamAvailability,
    methods: AggregatedCallMethods,
    capabilities: BTreeSet<Capability>,
    quorum_labels: QuorumForLabels,
    lower_bounds: BTreeMap<LowerBoundType, u64>,
    finalizations: BTreeMap<FinalizationType, u64>,
    egress: EgressSubscription,
}

impl MultistreamState {
    #[must_use]
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            status: UpstreamAvailability::Unavailable,
            methods: AggregatedCallMethods::Pending,
            capabilities: BTreeSet::new(),
            quorum_labels: QuorumForLabels::default(),
            lower_bounds: BTreeMap::new(),
            finalizations: BTreeMap::new(),
            egress: EgressSubscription::default(),
        }
    }

    /// Re-derives every aggregate value from the membership snapshot.
    ///
    /// Returns the diff against the previous derivation, or `None` when
    /// nothing changed.
    pub fn update(
        &mut self,
        upstreams: &[Arc<dyn Upstream>],
        egress: &EgressSubscription,
    ) -> Option<MultistreamStateEvent> {
        let status = reduce_status(upstreams);
        let methods = reduce_methods(upstreams);
        let capabilities = reduce_capabilities(upstreams);
        let quorum_labels = QuorumForLabels::new(group_by_labels(upstreams));
        let lower_bounds = reduce_lower_bounds(upstreams);
        let finalizations = reduce_finalizations(upstreams);

        let mut event = MultistreamStateEvent::default();

        if status != self.status {
            event.status = Some(status);
        }
        let methods_changed = match &self.methods {
            AggregatedCallMethods::Pending => true,
            AggregatedCallMethods::Ready(previous) => previous.names() != methods.names(),
        };
        if methods_changed {
            event.methods = Some(methods.names().clone());
        }
        if capabilities != self.capabilities {
            event.capabilities = Some(capabilities.clone());
        }
        if quorum_labels != self.quorum_labels {
            event.quorum_labels = Some(quorum_labels.items().to_vec());
        }
        if lower_bounds != self.lower_bounds {
            event.lower_bounds = Some(lower_bounds.clone());
        }
        if finalizations != self.finalizations {
            event.finalizations = Some(finalizations.clone());
        }

        self.status = status;
        self.methods = AggregatedCallMethods::Ready(Arc::new(methods));
        self.capabilities = capabilities;
        self.quorum_labels = quorum_labels;
        self.lower_bounds = lower_bounds;
        self.finalizations = finalizations;
        self.egress = egress.clone();

        if event.is_empty() {
            None
        } else {
            Some(event)
        }
    }

    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    #[must_use]
    pub fn status(&self) -> UpstreamAvailability {
        self.status
    }

    /// Aggregated call methods; pending until the first reduction.
    #[must_use]
    pub fn call_methods(&self) -> AggregatedCallMethods {
        self.methods.clone()
    }

    #[must_use]
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        self.capabilities.clone()
    }

    #[must_use]
    pub fn quorum_labels(&self) -> QuorumForLabels {
        self.quorum_labels.clone()
    }

    #[must_use]
    pub fn lower_bounds(&self) -> BTreeMap<LowerBoundType, u64> {
        self.lower_bounds.clone()
    }

    #[must_use]
    pub fn finalizations(&self) -> BTreeMap<FinalizationType, u64> {
        self.finalizations.clone()
    }

    #[must_use]
    pub fn egress(&self) -> &EgressSubscription {
        &self.egress
    }
}

fn reduce_status(upstreams: &[Arc<dyn Upstream>]) -> UpstreamAvailability {
    upstreams
        .iter()
        .map(|u| u.status())
        .reduce(UpstreamAvailability::worst)
        .unwrap_or(UpstreamAvailability::Unavailable)
}

/// A method is allowed when any primary allows it; fallback methods count
/// only when every primary is down (or there are no primaries).
fn reduce_methods(upstreams: &[Arc<dyn Upstream>]) -> CallMethods {
    let mut methods = CallMethods::default();

    let mut any_primary_up = false;
    let mut has_primary = false;
    for upstream in upstreams {
        if upstream.role() == UpstreamRole::Primary {
            has_primary = true;
            methods.merge(&upstream.call_methods());
            if upstream.is_available() {
                any_primary_up = true;
            }
        }
    }

    if !has_primary || !any_primary_up {
        for upstream in upstreams {
            if upstream.role() == UpstreamRole::Fallback {
                methods.merge(&upstream.call_methods());
            }
        }
    }

    methods
}

fn reduce_capabilities(upstreams: &[Arc<dyn Upstream>]) -> BTreeSet<Capability> {
    upstreams.iter().flat_map(|u| u.capabilities()).collect()
}

fn reduce_lower_bounds(upstreams: &[Arc<dyn Upstream>]) -> BTreeMap<LowerBoundType, u64> {
    let mut bounds: BTreeMap<LowerBoundType, u64> = BTreeMap::new();
    for upstream in upstreams {
        for bound in upstream.lower_bounds() {
            bounds
                .entry(bound.kind)
                .and_modify(|lower| *lower = (*lower).min(bound.lower))
                .or_insert(bound.lower);
        }
    }
    bounds
}

fn reduce_finalizations(upstreams: &[Arc<dyn Upstream>]) -> BTreeMap<FinalizationType, u64> {
    let mut finalizations: BTreeMap<FinalizationType, u64> = BTreeMap::new();
    for upstream in upstreams {
        for data in upstream.finalizations() {
            finalizations
                .entry(data.kind)
                .and_modify(|height| *height = (*height).min(data.height))
                .or_insert(data.height);
        }
    }
    finalizations
}

/// Tracks per-upstream statuses and reduces them to one deduplicated
/// aggregate for the status stream.
pub(crate) struct AvailabilityReducer {
    statuses: DashMap<UpstreamId, UpstreamAvailability>,
    last_emitted: Mutex<Option<UpstreamAvailability>>,
}

impl AvailabilityReducer {
    pub(crate) fn new() -> Self {
        Self { statuses: DashMap::new(), last_emitted: Mutex::new(None) }
    }

    /// Records one upstream's status. Returns the new aggregate when it
    /// differs from the last emitted value.
    pub(crate) fn observe(
        &self,
        id: &UpstreamId,
        status: UpstreamAvailability,
    ) -> Option<UpstreamAvailability> {
        self.statuses.insert(id.clone(), status);
        self.reduce_and_dedup()
    }

    /// Drops a removed upstream's entry. Returns the new aggregate when the
    /// eviction changed it.
    pub(crate) fn evict(&self, id: &UpstreamId) -> Option<UpstreamAvailability> {
        if self.statuses.remove(id).is_none() {
            return None;
        }
        self.reduce_and_dedup()
    }

    /// Current aggregate over the known statuses.
    pub(crate) fn aggregate(&self) -> UpstreamAvailability {
        self.statuses
            .iter()
            .map(|entry| *entry.value())
            .reduce(UpstreamAvailability::worst)
            .unwrap_or(UpstreamAvailability::Unavailable)
    }

    /// Members currently at each known status.
    pub(crate) fn counts(&self) -> Vec<(UpstreamAvailability, usize)> {
        let mut counts: BTreeMap<UpstreamAvailability, usize> = BTreeMap::new();
        for entry in self.statuses.iter() {
            *counts.entry(*entry.value()).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }

    fn reduce_and_dedup(&self) -> Option<UpstreamAvailability> {
        let aggregate = self.aggregate();
        let mut last = self.last_emitted.lock();
        if *last == Some(aggregate) {
            return None;
        }
        *last = Some(aggregate);
        Some(aggregate)
    }
}
