//! Upstream abstraction: the capability contract every backend fulfils.
//!
//! An upstream is one configured backend RPC endpoint. The aggregation core
//! never talks HTTP or gRPC itself; connection drivers implement the
//! [`Upstream`] trait and the core works against `Arc<dyn Upstream>`
//! handles. The multistream itself implements the same trait, which is what
//! allows multistreams to nest.
//!
//! # Contract Areas
//!
//! - **Identity**: stable [`UpstreamId`], one-byte node id, client version
//! - **Availability**: [`UpstreamAvailability`] ladder with a watch-based
//!   observation stream that replays the current status then emits changes
//! - **Head**: a [`Head`](head::Head) following the backend's chain tip
//! - **Calls**: an [`IngressReader`] for JSON-RPC dispatch and the permitted
//!   [`CallMethods`] set
//! - **Lag**: externally-assigned block lag (see
//!   [`HeadLagObserver`](lag::HeadLagObserver))
//! - **Bounds**: oldest retrievable block per data kind, finalized heights

pub mod events;
pub mod filtered;
pub mod head;
pub mod lag;
pub mod selector;

use crate::{
    cache::HeadCache,
    config::{Labels, UpstreamOptions, UpstreamRole},
    errors::MultistreamError,
    types::{Chain, JsonRpcRequest, JsonRpcResponse},
};
use async_trait::async_trait;
use events::UpstreamChangeEvent;
use head::Head;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use tokio::sync::{broadcast, watch};

/// Stable identifier of an upstream within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpstreamId(Arc<str>);

impl UpstreamId {
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UpstreamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health ladder for a single upstream, from fully usable to unusable.
///
/// The variants are totally ordered by severity: `Ok` is best and
/// `Unavailable` is worst. The aggregate status of a multistream is the
/// worst status among its members, or `Unavailable` when it has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpstreamAvailability {
    /// Healthy and at the chain tip.
    Ok,
    /// Reachable but a few blocks behind the best peer.
    Lagging,
    /// Still syncing towards the tip; not usable for tip-sensitive calls.
    Syncing,
    /// Synced but without enough history to serve requests.
    Immature,
    /// Unreachable or failing.
    Unavailable,
}

impl UpstreamAvailability {
    /// Returns `true` if the upstream can serve calls in this state.
    #[must_use]
    pub fn is_available(self) -> bool {
        matches!(self, Self::Ok | Self::Lagging)
    }

    /// Returns the worse of two statuses.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }

    /// Numeric encoding for the availability gauges.
    #[must_use]
    pub fn as_gauge_value(self) -> f64 {
        f64::from(self as u8)
    }

    /// Static label for metrics and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Lagging => "lagging",
            Self::Syncing => "syncing",
            Self::Immature => "immature",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for UpstreamAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature flag advertised by an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Plain JSON-RPC calls.
    Rpc,
    /// Balance queries against current state.
    Balance,
    /// Head subscription over a push transport.
    WsHead,
}

impl Capability {
    /// Static label for metrics and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Balance => "balance",
            Self::WsHead => "ws_head",
        }
    }
}

/// Set of JSON-RPC methods an upstream permits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMethods {
    allowed: BTreeSet<String>,
}

impl CallMethods {
    #[must_use]
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { allowed: methods.into_iter().map(Into::into).collect() }
    }

    /// Checks whether a method may be dispatched.
    #[must_use]
    pub fn is_allowed(&self, method: &str) -> bool {
        self.allowed.contains(method)
    }

    /// Returns the permitted method names in sorted order.
    #[must_use]
    pub fn names(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Extends this set with another set's methods.
    pub fn merge(&mut self, other: &CallMethods) {
        self.allowed.extend(other.allowed.iter().cloned());
    }
}

/// Aggregated call methods, explicit about whether the first state reduction
/// has happened yet.
///
/// Before the first upstream joins there is nothing to aggregate; querying
/// the methods then is a caller error, not an empty set.
#[derive(Debug, Clone)]
pub enum AggregatedCallMethods {
    /// No state reduction has run yet.
    Pending,
    /// Reduced method set from the current membership.
    Ready(Arc<CallMethods>),
}

impl AggregatedCallMethods {
    /// Returns the reduced methods.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::NotInitialized`] while pending.
    pub fn get(&self) -> Result<Arc<CallMethods>, MultistreamError> {
        match self {
            Self::Pending => Err(MultistreamError::NotInitialized),
            Self::Ready(methods) => Ok(Arc::clone(methods)),
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Data kinds a lower bound can be reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LowerBoundType {
    State,
    Block,
    Tx,
    Logs,
    Trace,
    Proof,
}

/// The oldest block for which a given data kind is retrievable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowerBoundData {
    pub kind: LowerBoundType,
    pub lower: u64,
}

/// Finality checkpoints reported by the consensus layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FinalizationType {
    Safe,
    Finalized,
}

/// A finality checkpoint height of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizationData {
    pub kind: FinalizationType,
    pub height: u64,
}

/// Subscription topics a multistream can serve downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EgressSubscription {
    topics: BTreeSet<String>,
}

impl EgressSubscription {
    #[must_use]
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { topics: topics.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    #[must_use]
    pub fn supports(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }
}

/// Direct JSON-RPC dispatch towards one backend.
#[async_trait]
pub trait IngressReader: Send + Sync {
    /// Sends one call and returns the backend's response.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::Rpc`] when the backend answers with a
    /// JSON-RPC error, or a transport-mapped error otherwise.
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, MultistreamError>;
}

/// Capability contract of a single backend RPC endpoint.
///
/// Drivers (native JSON-RPC pollers, gRPC peers) implement this; the
/// multistream consumes it and also implements it itself, so an upstream
/// handle may transparently be another aggregate.
pub trait Upstream: Send + Sync {
    /// Stable identifier, unique within the process.
    fn id(&self) -> &UpstreamId;

    /// Chain this upstream serves.
    fn chain(&self) -> &Chain;

    /// Role in the selection order.
    fn role(&self) -> UpstreamRole;

    /// Current availability.
    fn status(&self) -> UpstreamAvailability;

    /// Whether the upstream can currently serve calls.
    fn is_available(&self) -> bool {
        self.status().is_available()
    }

    /// Availability observation: the receiver holds the current status and
    /// wakes on every change.
    fn observe_availability(&self) -> watch::Receiver<UpstreamAvailability>;

    /// The upstream's view of the chain tip.
    fn head(&self) -> Arc<Head>;

    /// Height of the current tip, if one was ever observed.
    fn current_height(&self) -> Option<u64> {
        self.head().current().map(|b| b.height)
    }

    /// Blocks behind the best peer, if known. Assigned externally by the
    /// lag observer; forced to 0 when the upstream is the only member.
    fn lag(&self) -> Option<u64>;

    /// Assigns the lag. Drivers must accept external assignment.
    fn set_lag(&self, lag: u64);

    /// Labels advertised for matcher-based selection.
    fn labels(&self) -> Labels;

    /// Advertised capabilities.
    fn capabilities(&self) -> BTreeSet<Capability>;

    /// Permitted call methods.
    fn call_methods(&self) -> Arc<CallMethods>;

    /// Oldest retrievable block per data kind. Empty when unknown.
    fn lower_bounds(&self) -> Vec<LowerBoundData> {
        Vec::new()
    }

    /// Finality checkpoints. Empty when unknown.
    fn finalizations(&self) -> Vec<FinalizationData> {
        Vec::new()
    }

    /// Direct JSON-RPC dispatch handle.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::Unsupported`] on aggregates.
    fn ingress(&self) -> Result<Arc<dyn IngressReader>, MultistreamError>;

    /// Per-upstream options.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::Unsupported`] on aggregates.
    fn options(&self) -> Result<UpstreamOptions, MultistreamError>;

    /// One-byte node identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::Unsupported`] on aggregates.
    fn node_id(&self) -> Result<u8, MultistreamError>;

    /// Client version string, if known.
    fn client_version(&self) -> Option<String> {
        None
    }

    /// Change events this upstream publishes about itself.
    fn observe_events(&self) -> broadcast::Receiver<UpstreamChangeEvent>;

    /// Whether the driver wants the cache handle when joining a multistream.
    fn is_cache_aware(&self) -> bool {
        false
    }

    /// Hands the driver the cache sink. No-op unless cache-aware.
    fn set_cache(&self, _cache: Arc<dyn HeadCache>) {}

    /// Starts the driver. Idempotent.
    fn start(&self);

    /// Stops the driver. Terminal.
    fn stop(&self);

    /// Whether the driver is running.
    fn is_running(&self) -> bool;
}

/// Groups upstream handles by identical label sets.
///
/// Used to report how many members can satisfy a label-scoped quorum.
#[must_use]
pub fn group_by_labels(upstreams: &[Arc<dyn Upstream>]) -> BTreeMap<Labels, usize> {
    let mut groups: BTreeMap<Labels, usize> = BTreeMap::new();
    for upstream in upstreams {
        *groups.entry(upstream.labels()).or_insert(0) += 1;
    }
    groups
}
