//! Change events flowing between upstream drivers and multistreams.

use crate::{
    config::Labels,
    types::Chain,
    upstream::{Capability, FinalizationType, LowerBoundType, Upstream, UpstreamAvailability},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// Kind of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The upstream joined (or should join) the multistream.
    Added,
    /// The upstream left; the multistream stops it.
    Removed,
    /// The driver re-validated the upstream; no state change required.
    Revalidated,
    /// The upstream's advertised state changed; re-derive the aggregate.
    Updated,
    /// The upstream was discovered but has not joined yet.
    Observed,
    /// The driver removed the upstream after a fatal settings error and
    /// already stopped it; the multistream must not stop it again.
    FatalSettingsErrorRemoved,
}

impl ChangeKind {
    /// Static label for logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Revalidated => "revalidated",
            Self::Updated => "updated",
            Self::Observed => "observed",
            Self::FatalSettingsErrorRemoved => "fatal_settings_error_removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A membership change event about one upstream of one chain.
///
/// A multistream only acts on events whose `chain` matches its own; events
/// for other chains are silently ignored.
#[derive(Clone)]
pub struct UpstreamChangeEvent {
    pub chain: Chain,
    pub upstream: Arc<dyn Upstream>,
    pub kind: ChangeKind,
}

impl UpstreamChangeEvent {
    #[must_use]
    pub fn new(chain: Chain, upstream: Arc<dyn Upstream>, kind: ChangeKind) -> Self {
        Self { chain, upstream, kind }
    }
}

impl fmt::Debug for UpstreamChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamChangeEvent")
            .field("chain", &self.chain.code())
            .field("upstream", &self.upstream.id().as_str())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Diff of the aggregated multistream state.
///
/// Every field is `Some` only when that derived value changed in the
/// reduction that produced the event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultistreamStateEvent {
    pub status: Option<UpstreamAvailability>,
    pub methods: Option<BTreeSet<String>>,
    pub capabilities: Option<BTreeSet<Capability>>,
    pub quorum_labels: Option<Vec<(Labels, usize)>>,
    pub lower_bounds: Option<BTreeMap<LowerBoundType, u64>>,
    pub finalizations: Option<BTreeMap<FinalizationType, u64>>,
}

impl MultistreamStateEvent {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.methods.is_none()
            && self.capabilities.is_none()
            && self.quorum_labels.is_none()
            && self.lower_bounds.is_none()
            && self.finalizations.is_none()
    }
}
