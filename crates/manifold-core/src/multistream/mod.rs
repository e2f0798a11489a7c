//! Per-chain aggregation of upstreams behind one `Upstream` surface.
//!
//! A [`Multistream`] owns the set of upstreams for a single chain. It
//! consumes [`UpstreamChangeEvent`]s on a serialized sink, mutates the
//! membership, re-derives the aggregate state, and fans fine-grained
//! sub-events out to subscribers. Requests enter through
//! [`Multistream::get_api_source`] and receive an ordered sequence of
//! upstream handles.
//!
//! # Concurrency
//!
//! All membership mutation and state re-derivation happen on one spawned
//! orchestrator task consuming the event channel, or under the membership
//! guard when the mutating operations are called directly. Readers
//! (status, state, heads, api sources) are lock-free against writers: the
//! membership is an `ArcSwap` snapshot and the aggregate head is a watch
//! channel.
//!
//! # Nesting
//!
//! `Multistream` implements [`Upstream`] itself, so an aggregate can join
//! another aggregate. The recursive surface is restricted: it has no ingress
//! reader, options, or node id, and its self-event stream never emits.

pub mod state;

use crate::{
    cache::{CacheTag, HeadCache},
    config::{Labels, UpstreamOptions, UpstreamRole},
    errors::MultistreamError,
    metrics::MetricsCollector,
    types::{Chain, JsonRpcRequest},
    upstream::{
        events::{ChangeKind, MultistreamStateEvent, UpstreamChangeEvent},
        filtered::FilteredApis,
        head::Head,
        lag::HeadLagObserver,
        selector::{Matcher, UpstreamFilter},
        CallMethods, Capability, EgressSubscription, FinalizationData, FinalizationType,
        IngressReader, LowerBoundData, LowerBoundType, Upstream, UpstreamAvailability, UpstreamId,
    },
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use state::{AvailabilityReducer, MultistreamState, QuorumForLabels};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

/// Unconditional status log period.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum gap between status logs triggered by status changes.
const STATUS_CHANGE_SAMPLE: Duration = Duration::from_secs(15);

/// Rotation seeds wrap here to stay clear of signed-integer territory.
const ROTATION_WRAP: u32 = i32::MAX as u32 / 2;

/// Capacity of the fan-out broadcast channels; slow subscribers drop.
const FANOUT_BUFFER: usize = 32;

/// Aggregator of all upstreams of one chain.
pub struct Multistream {
    me: Weak<Multistream>,
    chain: Chain,
    id: UpstreamId,
    upstreams: Arc<ArcSwap<Vec<Arc<dyn Upstream>>>>,
    /// Serializes membership writes against direct add/remove callers.
    membership: Mutex<()>,
    state: Mutex<MultistreamState>,
    head: Arc<Head>,
    cache: Option<Arc<dyn HeadCache>>,
    metrics: MetricsCollector,
    egress: EgressSubscription,
    events_tx: mpsc::UnboundedSender<UpstreamChangeEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<UpstreamChangeEvent>>>,
    added_tx: broadcast::Sender<Arc<dyn Upstream>>,
    removed_tx: broadcast::Sender<Arc<dyn Upstream>>,
    updated_tx: broadcast::Sender<Arc<dyn Upstream>>,
    observed_tx: broadcast::Sender<Arc<dyn Upstream>>,
    state_tx: broadcast::Sender<MultistreamStateEvent>,
    status_tx: broadcast::Sender<UpstreamAvailability>,
    status_watch: watch::Sender<UpstreamAvailability>,
    /// Never emits; backs the recursive `observe_events` surface.
    self_events_tx: broadcast::Sender<UpstreamChangeEvent>,
    availability: AvailabilityReducer,
    rotation: AtomicU32,
    running: AtomicBool,
    stopped: AtomicBool,
    lag_observer: Mutex<Option<HeadLagObserver>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    member_tasks: Mutex<HashMap<UpstreamId, Vec<JoinHandle<()>>>>,
}

impl Multistream {
    /// Creates the aggregator for one chain and spawns its serialized event
    /// sink. Must be called within a Tokio runtime.
    ///
    /// `cache` is handed to cache-aware upstreams when they join, and
    /// receives every promoted aggregate head.
    #[must_use]
    pub fn new(chain: Chain, cache: Option<Arc<dyn HeadCache>>) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (added_tx, _) = broadcast::channel(FANOUT_BUFFER);
        let (removed_tx, _) = broadcast::channel(FANOUT_BUFFER);
        let (updated_tx, _) = broadcast::channel(FANOUT_BUFFER);
        let (observed_tx, _) = broadcast::channel(FANOUT_BUFFER);
        let (state_tx, _) = broadcast::channel(FANOUT_BUFFER);
        let (status_tx, _) = broadcast::channel(FANOUT_BUFFER);
        let (self_events_tx, _) = broadcast::channel(1);
        let (status_watch, _) = watch::channel(UpstreamAvailability::Unavailable);

        let metrics = MetricsCollector::new(chain.code());
        let id = UpstreamId::new(format!("!all:{}", chain.code()));

        let multistream = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            id,
            state: Mutex::new(MultistreamState::new(chain.clone())),
            chain,
            upstreams: Arc::new(ArcSwap::from_pointee(Vec::new())),
            membership: Mutex::new(()),
            head: Arc::new(Head::new()),
            cache,
            metrics,
            egress: EgressSubscription::new(["newHeads"]),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            added_tx,
            removed_tx,
            updated_tx,
            observed_tx,
            state_tx,
            status_tx,
            status_watch,
            self_events_tx,
            availability: AvailabilityReducer::new(),
            rotation: AtomicU32::new(0),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            lag_observer: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            member_tasks: Mutex::new(HashMap::new()),
        });

        multistream.spawn_event_loop();
        multistream
    }

    /// Enqueues a change event onto the serialized sink.
    ///
    /// Events for a different chain are accepted here and ignored by the
    /// sink; events after `stop()` are dropped.
    pub fn process_event(&self, event: UpstreamChangeEvent) {
        if self.stopped.load(Ordering::Acquire) {
            debug!(chain = %self.chain, "event ignored after stop");
            return;
        }
        if self.events_tx.send(event).is_err() {
            warn!(chain = %self.chain, "event sink closed, event dropped");
        }
    }

    /// Starts the aggregator: the periodic status logger and, with two or
    /// more members, the lag observer. Idempotent; also triggered by the
    /// first `Added` event.
    pub fn start(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            warn!(chain = %self.chain, "cannot start a stopped multistream");
            return;
        }
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            return;
        }

        info!(chain = %self.chain, "multistream started");
        self.spawn_status_printer();
        self.on_upstreams_updated();
    }

    /// Stops the aggregator: disposes every subscription and observer and
    /// terminates the status stream with `Unavailable`. Terminal.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            warn!(chain = %self.chain, "multistream already stopped");
            return;
        }
        self.running.store(false, Ordering::Release);

        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        for (_, handles) in self.member_tasks.lock().drain() {
            for handle in handles {
                handle.abort();
            }
        }
        *self.lag_observer.lock() = None;

        self.status_watch.send_replace(UpstreamAvailability::Unavailable);
        let _ = self.status_tx.send(UpstreamAvailability::Unavailable);

        info!(chain = %self.chain, "multistream stopped");
    }

    /// Adds an upstream to the membership.
    ///
    /// Returns `true` iff the id was new; a duplicate add is a no-op that
    /// emits nothing.
    pub fn add_upstream(self: &Arc<Self>, upstream: Arc<dyn Upstream>) -> bool {
        {
            let _guard = self.membership.lock();
            let current = self.upstreams.load_full();
            if current.iter().any(|u| u.id() == upstream.id()) {
                debug!(chain = %self.chain, upstream = %upstream.id(), "duplicate add ignored");
                return false;
            }

            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&upstream));
            self.upstreams.store(Arc::new(next));
        }

        info!(chain = %self.chain, upstream = %upstream.id(), "upstream added");
        self.watch_member(&upstream);
        self.metrics.record_added(upstream.id(), upstream.status());
        self.on_upstreams_updated();
        let _ = self.added_tx.send(upstream);
        true
    }

    /// Removes an upstream by id, optionally stopping it.
    ///
    /// Returns `false` when the id is unknown; nothing is emitted then.
    pub fn remove_upstream(&self, id: &UpstreamId, stop_upstream: bool) -> bool {
        let removed = {
            let _guard = self.membership.lock();
            let current = self.upstreams.load_full();
            let Some(position) = current.iter().position(|u| u.id() == id) else {
                return false;
            };

            let mut next = (*current).clone();
            let removed = next.remove(position);
            self.upstreams.store(Arc::new(next));
            removed
        };

        if let Some(handles) = self.member_tasks.lock().remove(id) {
            for handle in handles {
                handle.abort();
            }
        }

        self.metrics.record_removed(id);
        if let Some(aggregate) = self.availability.evict(id) {
            self.emit_status(aggregate);
        }
        self.metrics.record_status_counts(&self.availability.counts());

        if stop_upstream {
            removed.stop();
        }

        info!(chain = %self.chain, upstream = %id, stopped = stop_upstream, "upstream removed");
        self.on_upstreams_updated();
        let _ = self.removed_tx.send(removed);
        true
    }

    /// Returns an ordered api source for one request.
    ///
    /// The rotation seed advances on every call so equal candidates spread
    /// across callers; it wraps at half `i32::MAX` to avoid sign issues.
    #[must_use]
    pub fn get_api_source(&self, filter: &UpstreamFilter) -> FilteredApis {
        let seed = self
            .rotation
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current >= ROTATION_WRAP { 0 } else { current + 1 })
            })
            .unwrap_or(0);

        FilteredApis::new(self.chain.clone(), &self.upstreams.load(), filter, seed)
    }

    /// Aggregate status stream: deduplicated worst-of-members values,
    /// terminated by `Unavailable` on stop.
    #[must_use]
    pub fn observe_status(&self) -> broadcast::Receiver<UpstreamAvailability> {
        self.status_tx.subscribe()
    }

    /// Upstreams that joined the membership.
    #[must_use]
    pub fn observe_added(&self) -> broadcast::Receiver<Arc<dyn Upstream>> {
        self.added_tx.subscribe()
    }

    /// Upstreams that left the membership.
    #[must_use]
    pub fn observe_removed(&self) -> broadcast::Receiver<Arc<dyn Upstream>> {
        self.removed_tx.subscribe()
    }

    /// Upstreams whose advertised state changed.
    #[must_use]
    pub fn observe_updated(&self) -> broadcast::Receiver<Arc<dyn Upstream>> {
        self.updated_tx.subscribe()
    }

    /// Upstreams discovered but not yet members.
    #[must_use]
    pub fn observe_observed(&self) -> broadcast::Receiver<Arc<dyn Upstream>> {
        self.observed_tx.subscribe()
    }

    /// Diffs of the aggregated state.
    #[must_use]
    pub fn observe_state_events(&self) -> broadcast::Receiver<MultistreamStateEvent> {
        self.state_tx.subscribe()
    }

    /// The aggregate head following the heaviest tip among all members.
    #[must_use]
    pub fn get_head(&self) -> Arc<Head> {
        Arc::clone(&self.head)
    }

    /// An aggregate head over the members matching `matcher`.
    ///
    /// For [`Matcher::Any`] this is the shared aggregate head; otherwise a
    /// dedicated head is wired to the current matching members.
    #[must_use]
    pub fn get_head_matching(&self, matcher: &Matcher) -> Arc<Head> {
        if matches!(matcher, Matcher::Any) {
            return Arc::clone(&self.head);
        }

        let head = Arc::new(Head::new());
        for upstream in self.upstreams.load().iter() {
            if matcher.matches(upstream.as_ref()) {
                let handle = spawn_head_follower(upstream, Arc::clone(&head), None);
                self.tasks.lock().push(handle);
            }
        }
        head
    }

    /// Aggregated permitted methods.
    ///
    /// # Errors
    ///
    /// Returns [`MultistreamError::NotInitialized`] before the first state
    /// reduction.
    pub fn get_methods(&self) -> Result<Arc<CallMethods>, MultistreamError> {
        self.state.lock().call_methods().get()
    }

    /// Union of member capabilities; empty before the first reduction.
    #[must_use]
    pub fn get_capabilities(&self) -> BTreeSet<Capability> {
        self.state.lock().capabilities()
    }

    /// Per-type minimum lower bounds across members.
    #[must_use]
    pub fn get_lower_bounds(&self) -> BTreeMap<LowerBoundType, u64> {
        self.state.lock().lower_bounds()
    }

    /// Per-type minimum finalization heights across members.
    #[must_use]
    pub fn get_finalizations(&self) -> BTreeMap<FinalizationType, u64> {
        self.state.lock().finalizations()
    }

    /// Member counts grouped by identical label sets.
    #[must_use]
    pub fn get_quorum_labels(&self) -> QuorumForLabels {
        self.state.lock().quorum_labels()
    }

    /// Pass-through for native subscriptions. The aggregate serves head
    /// subscriptions itself, so there is nothing to proxy by default.
    #[must_use]
    pub fn try_proxy_subscribe(
        &self,
        _matcher: &Matcher,
        _request: &JsonRpcRequest,
    ) -> Option<broadcast::Receiver<serde_json::Value>> {
        None
    }

    /// Re-runs the state reduction over the current membership.
    pub fn refresh_state(&self) {
        self.on_upstreams_updated();
    }

    /// Current membership snapshot.
    #[must_use]
    pub fn get_upstreams(&self) -> Arc<Vec<Arc<dyn Upstream>>> {
        self.upstreams.load_full()
    }

    /// Number of member upstreams.
    #[must_use]
    pub fn upstream_count(&self) -> usize {
        self.upstreams.load().len()
    }

    /// Logs the aggregate status, height, and member statuses.
    pub fn print_status(&self) {
        let snapshot = self.upstreams.load();
        let status = self.availability.aggregate();
        let height =
            self.head.height().map_or_else(|_| "?".to_string(), |height| height.to_string());
        let members: Vec<String> =
            snapshot.iter().map(|u| format!("{}:{}", u.id(), u.status())).collect();

        info!(
            chain = %self.chain,
            status = %status,
            height = %height,
            upstreams = snapshot.len(),
            members = ?members,
            "multistream status"
        );
    }

    fn spawn_event_loop(self: &Arc<Self>) {
        let Some(mut events_rx) = self.events_rx.lock().take() else {
            return;
        };

        let multistream = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if multistream.stopped.load(Ordering::Acquire) {
                    break;
                }
                multistream.dispatch(event);
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Handles one event on the serialized sink.
    fn dispatch(self: &Arc<Self>, event: UpstreamChangeEvent) {
        if event.chain != self.chain {
            trace!(
                chain = %self.chain,
                event_chain = %event.chain,
                "event for another chain ignored"
            );
            return;
        }

        trace!(chain = %self.chain, upstream = %event.upstream.id(), kind = %event.kind, "event");
        match event.kind {
            ChangeKind::Added => {
                if !self.is_running() {
                    self.start();
                }
                if event.upstream.is_cache_aware() {
                    if let Some(cache) = &self.cache {
                        event.upstream.set_cache(Arc::clone(cache));
                    }
                }
                self.add_upstream(event.upstream);
            }
            ChangeKind::Updated => {
                self.on_upstreams_updated();
                let _ = self.updated_tx.send(event.upstream);
            }
            ChangeKind::Removed => {
                self.remove_upstream(event.upstream.id(), true);
            }
            ChangeKind::FatalSettingsErrorRemoved => {
                // The driver already stopped the upstream.
                self.remove_upstream(event.upstream.id(), false);
            }
            ChangeKind::Observed => {
                self.handle_observed(event.upstream);
            }
            ChangeKind::Revalidated => {
                debug!(chain = %self.chain, upstream = %event.upstream.id(), "revalidated");
            }
        }
    }

    /// Re-derives the aggregate state and enforces the lag-observer policy.
    fn on_upstreams_updated(&self) {
        let snapshot = self.upstreams.load_full();

        let state_event = self.state.lock().update(&snapshot, &self.egress);
        if let Some(event) = state_event {
            let _ = self.state_tx.send(event);
        }

        match snapshot.len() {
            0 => {
                *self.lag_observer.lock() = None;
            }
            1 => {
                *self.lag_observer.lock() = None;
                let only = &snapshot[0];
                only.set_lag(0);
                self.metrics.record_lag(only.id(), 0);
            }
            _ => {
                if self.is_running() {
                    let mut observer = self.lag_observer.lock();
                    if observer.is_none() {
                        *observer = Some(HeadLagObserver::spawn(
                            &self.head,
                            Arc::clone(&self.upstreams),
                            self.metrics.clone(),
                        ));
                    }
                }
            }
        }
    }

    /// Wires a new member: head following, status observation, and
    /// forwarding of the member's own change events onto the sink.
    fn watch_member(self: &Arc<Self>, upstream: &Arc<dyn Upstream>) {
        let mut handles = Vec::with_capacity(3);

        handles.push(spawn_head_follower(
            upstream,
            Arc::clone(&self.head),
            self.cache.clone(),
        ));

        {
            let mut status_rx = upstream.observe_availability();
            let id = upstream.id().clone();
            let multistream = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                loop {
                    let status = *status_rx.borrow_and_update();
                    multistream.on_member_status(&id, status);
                    if status_rx.changed().await.is_err() {
                        break;
                    }
                }
            }));
        }

        {
            let mut member_events = upstream.observe_events();
            let events_tx = self.events_tx.clone();
            let id = upstream.id().clone();
            handles.push(tokio::spawn(async move {
                loop {
                    match member_events.recv().await {
                        Ok(event) => {
                            if events_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(upstream = %id, skipped, "member events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        self.member_tasks.lock().entry(upstream.id().clone()).or_default().extend(handles);
    }

    /// An observed upstream is announced but joins only once it emits its
    /// own `Added` event.
    fn handle_observed(self: &Arc<Self>, upstream: Arc<dyn Upstream>) {
        if self.upstreams.load().iter().any(|u| u.id() == upstream.id()) {
            debug!(chain = %self.chain, upstream = %upstream.id(), "observed upstream already a member");
            return;
        }

        let _ = self.observed_tx.send(Arc::clone(&upstream));

        let mut member_events = upstream.observe_events();
        let events_tx = self.events_tx.clone();
        let id = upstream.id().clone();
        let handle = tokio::spawn(async move {
            loop {
                match member_events.recv().await {
                    Ok(event) if event.kind == ChangeKind::Added => {
                        let _ = events_tx.send(event);
                        break;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.member_tasks.lock().entry(id).or_default().push(handle);
    }

    fn on_member_status(&self, id: &UpstreamId, status: UpstreamAvailability) {
        self.metrics.record_status(id, status);
        if let Some(aggregate) = self.availability.observe(id, status) {
            self.emit_status(aggregate);
        }
        self.metrics.record_status_counts(&self.availability.counts());
    }

    fn emit_status(&self, aggregate: UpstreamAvailability) {
        self.status_watch.send_replace(aggregate);
        // No subscribers is not an error for a fan-out stream.
        let _ = self.status_tx.send(aggregate);
    }

    fn spawn_status_printer(self: &Arc<Self>) {
        let multistream = Arc::clone(self);
        let mut status_rx = self.status_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_change_log = Instant::now();

            loop {
                tokio::select! {
                    _ = ticker.tick() => multistream.print_status(),
                    changed = status_rx.recv() => match changed {
                        Ok(_) => {
                            if last_change_log.elapsed() >= STATUS_CHANGE_SAMPLE {
                                last_change_log = Instant::now();
                                multistream.print_status();
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }
}

impl Drop for Multistream {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        for (_, handles) in self.member_tasks.lock().drain() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

/// Feeds one upstream's head promotions into an aggregate head, notifying
/// the cache on every aggregate promotion.
fn spawn_head_follower(
    upstream: &Arc<dyn Upstream>,
    aggregate: Arc<Head>,
    cache: Option<Arc<dyn HeadCache>>,
) -> JoinHandle<()> {
    let source = upstream.head();
    let id = upstream.id().clone();

    tokio::spawn(async move {
        let mut flux = source.flux();

        // The member may already be past its first block.
        if let Some(block) = source.current() {
            if aggregate.try_advance(block.clone()) {
                if let Some(cache) = &cache {
                    cache.cache(CacheTag::Latest, &block);
                }
            }
        }

        loop {
            match flux.recv().await {
                Ok(block) => {
                    if aggregate.try_advance(block.clone()) {
                        if let Some(cache) = &cache {
                            cache.cache(CacheTag::Latest, &block);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(upstream = %id, skipped, "head follower dropped promotions");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

impl Upstream for Multistream {
    fn id(&self) -> &UpstreamId {
        &self.id
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn role(&self) -> UpstreamRole {
        UpstreamRole::Primary
    }

    fn status(&self) -> UpstreamAvailability {
        self.availability.aggregate()
    }

    fn observe_availability(&self) -> watch::Receiver<UpstreamAvailability> {
        self.status_watch.subscribe()
    }

    fn head(&self) -> Arc<Head> {
        Arc::clone(&self.head)
    }

    fn lag(&self) -> Option<u64> {
        None
    }

    fn set_lag(&self, _lag: u64) {
        debug!(chain = %self.chain, "lag assignment ignored on an aggregate");
    }

    fn labels(&self) -> Labels {
        Labels::new()
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        self.state.lock().capabilities()
    }

    fn call_methods(&self) -> Arc<CallMethods> {
        self.state
            .lock()
            .call_methods()
            .get()
            .unwrap_or_else(|_| Arc::new(CallMethods::default()))
    }

    fn lower_bounds(&self) -> Vec<LowerBoundData> {
        self.state
            .lock()
            .lower_bounds()
            .into_iter()
            .map(|(kind, lower)| LowerBoundData { kind, lower })
            .collect()
    }

    fn finalizations(&self) -> Vec<FinalizationData> {
        self.state
            .lock()
            .finalizations()
            .into_iter()
            .map(|(kind, height)| FinalizationData { kind, height })
            .collect()
    }

    fn ingress(&self) -> Result<Arc<dyn IngressReader>, MultistreamError> {
        Err(MultistreamError::Unsupported("ingress reader"))
    }

    fn options(&self) -> Result<UpstreamOptions, MultistreamError> {
        Err(MultistreamError::Unsupported("options"))
    }

    fn node_id(&self) -> Result<u8, MultistreamError> {
        Err(MultistreamError::Unsupported("node id"))
    }

    fn observe_events(&self) -> broadcast::Receiver<UpstreamChangeEvent> {
        // Nested aggregates must not loop events back into themselves.
        self.self_events_tx.subscribe()
    }

    fn start(&self) {
        if let Some(me) = self.me.upgrade() {
            Multistream::start(&me);
        }
    }

    fn stop(&self) {
        Multistream::stop(self);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
