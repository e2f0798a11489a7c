//! Scripted upstream and cache mocks.

use async_trait::async_trait;
use manifold_core::{
    cache::{CacheTag, HeadCache},
    config::{Labels, UpstreamOptions, UpstreamRole},
    errors::MultistreamError,
    types::{BlockRef, Chain, Hash32, JsonRpcRequest, JsonRpcResponse},
    upstream::{
        events::{ChangeKind, UpstreamChangeEvent},
        head::Head,
        CallMethods, Capability, IngressReader, Upstream, UpstreamAvailability, UpstreamId,
    },
};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::{broadcast, watch};

/// Ingress reader with a scripted outcome per call.
pub struct ScriptedReader {
    result: Mutex<Result<serde_json::Value, (i32, String)>>,
    calls: AtomicUsize,
}

impl ScriptedReader {
    #[must_use]
    pub fn succeeding(result: serde_json::Value) -> Arc<Self> {
        Arc::new(Self { result: Mutex::new(Ok(result)), calls: AtomicUsize::new(0) })
    }

    #[must_use]
    pub fn failing(code: i32, message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err((code, message.to_string()))),
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of calls dispatched through this reader.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl IngressReader for ScriptedReader {
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, MultistreamError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        match &*self.result.lock() {
            Ok(value) => Ok(JsonRpcResponse::success(value.clone(), request.id)),
            Err((code, message)) => {
                Err(MultistreamError::Rpc { code: *code, message: message.clone() })
            }
        }
    }
}

/// Cache sink that records every block it is handed.
#[derive(Default)]
pub struct RecordingCache {
    records: Mutex<Vec<(CacheTag, BlockRef)>>,
}

impl RecordingCache {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn records(&self) -> Vec<(CacheTag, BlockRef)> {
        self.records.lock().clone()
    }
}

impl HeadCache for RecordingCache {
    fn cache(&self, tag: CacheTag, block: &BlockRef) {
        self.records.lock().push((tag, block.clone()));
    }
}

/// Builder for [`MockUpstream`].
pub struct MockUpstreamBuilder {
    id: String,
    chain: Chain,
    role: UpstreamRole,
    status: UpstreamAvailability,
    labels: Labels,
    capabilities: BTreeSet<Capability>,
    methods: CallMethods,
    reader: Option<Arc<ScriptedReader>>,
    cache_aware: bool,
}

impl MockUpstreamBuilder {
    #[must_use]
    pub fn role(mut self, role: UpstreamRole) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn status(mut self, status: UpstreamAvailability) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    #[must_use]
    pub fn methods<'a>(mut self, methods: impl IntoIterator<Item = &'a str>) -> Self {
        self.methods = CallMethods::new(methods);
        self
    }

    #[must_use]
    pub fn reader(mut self, reader: Arc<ScriptedReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    #[must_use]
    pub fn cache_aware(mut self) -> Self {
        self.cache_aware = true;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MockUpstream> {
        let (status_tx, _) = watch::channel(self.status);
        let (events_tx, _) = broadcast::channel(16);
        Arc::new(MockUpstream {
            id: UpstreamId::new(self.id),
            chain: self.chain,
            role: self.role,
            labels: self.labels,
            capabilities: self.capabilities,
            methods: Arc::new(self.methods),
            reader: self.reader,
            cache_aware: self.cache_aware,
            head: Arc::new(Head::new()),
            lag: Mutex::new(None),
            status_tx,
            events_tx,
            cache: Mutex::new(None),
            running: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
        })
    }
}

/// A fully scripted upstream.
pub struct MockUpstream {
    id: UpstreamId,
    chain: Chain,
    role: UpstreamRole,
    labels: Labels,
    capabilities: BTreeSet<Capability>,
    methods: Arc<CallMethods>,
    reader: Option<Arc<ScriptedReader>>,
    cache_aware: bool,
    head: Arc<Head>,
    lag: Mutex<Option<u64>>,
    status_tx: watch::Sender<UpstreamAvailability>,
    events_tx: broadcast::Sender<UpstreamChangeEvent>,
    cache: Mutex<Option<Arc<dyn HeadCache>>>,
    running: AtomicBool,
    stop_calls: AtomicUsize,
}

impl MockUpstream {
    /// Starts a builder with sensible defaults: primary role, `Ok` status,
    /// RPC capability, and a minimal method set.
    #[must_use]
    pub fn builder(id: &str, chain: &Chain) -> MockUpstreamBuilder {
        MockUpstreamBuilder {
            id: id.to_string(),
            chain: chain.clone(),
            role: UpstreamRole::Primary,
            status: UpstreamAvailability::Ok,
            labels: Labels::new(),
            capabilities: [Capability::Rpc].into_iter().collect(),
            methods: CallMethods::new(["eth_blockNumber", "eth_getBlockByNumber"]),
            reader: None,
            cache_aware: false,
        }
    }

    /// Upcasts to the trait handle the core consumes.
    #[must_use]
    pub fn as_dyn(self: &Arc<Self>) -> Arc<dyn Upstream> {
        Arc::clone(self) as Arc<dyn Upstream>
    }

    /// Drives the scripted status.
    pub fn set_status(&self, status: UpstreamAvailability) {
        self.status_tx.send_replace(status);
    }

    /// Emits a block with a synthetic hash derived from the height.
    pub fn emit_head(&self, height: u64, weight: u64) {
        #[allow(clippy::cast_possible_truncation)]
        let hash = Hash32([height as u8; 32]);
        self.emit_block(BlockRef::new(hash, height, alloy_primitives::U256::from(weight)));
    }

    /// Emits a fully specified block.
    pub fn emit_block(&self, block: BlockRef) {
        self.head.try_advance(block);
    }

    /// Publishes a change event about this upstream on its own event stream.
    pub fn announce(self: &Arc<Self>, kind: ChangeKind) {
        let event = UpstreamChangeEvent::new(self.chain.clone(), self.as_dyn(), kind);
        let _ = self.events_tx.send(event);
    }

    /// Number of times `stop()` was called.
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::Acquire)
    }

    /// Whether a multistream handed this upstream the cache sink.
    #[must_use]
    pub fn was_given_cache(&self) -> bool {
        self.cache.lock().is_some()
    }
}

impl Upstream for MockUpstream {
    fn id(&self) -> &UpstreamId {
        &self.id
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn role(&self) -> UpstreamRole {
        self.role
    }

    fn status(&self) -> UpstreamAvailability {
        *self.status_tx.borrow()
    }

    fn observe_availability(&self) -> watch::Receiver<UpstreamAvailability> {
        self.status_tx.subscribe()
    }

    fn head(&self) -> Arc<Head> {
        Arc::clone(&self.head)
    }

    fn lag(&self) -> Option<u64> {
        *self.lag.lock()
    }

    fn set_lag(&self, lag: u64) {
        *self.lag.lock() = Some(lag);
    }

    fn labels(&self) -> Labels {
        self.labels.clone()
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        self.capabilities.clone()
    }

    fn call_methods(&self) -> Arc<CallMethods> {
        Arc::clone(&self.methods)
    }

    fn ingress(&self) -> Result<Arc<dyn IngressReader>, MultistreamError> {
        match &self.reader {
            Some(reader) => Ok(Arc::clone(reader) as Arc<dyn IngressReader>),
            None => Err(MultistreamError::UpstreamUnavailable),
        }
    }

    fn options(&self) -> Result<UpstreamOptions, MultistreamError> {
        Ok(UpstreamOptions { role: self.role, labels: self.labels.clone(), ..Default::default() })
    }

    fn node_id(&self) -> Result<u8, MultistreamError> {
        Ok(1)
    }

    fn observe_events(&self) -> broadcast::Receiver<UpstreamChangeEvent> {
        self.events_tx.subscribe()
    }

    fn is_cache_aware(&self) -> bool {
        self.cache_aware
    }

    fn set_cache(&self, cache: Arc<dyn HeadCache>) {
        *self.cache.lock() = Some(cache);
    }

    fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::AcqRel);
        self.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
