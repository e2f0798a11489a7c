//! Availability and lag gauges for a multistream's members.
//!
//! Gauges are recorded through the `metrics` facade; the embedding service
//! decides on the exporter. Label values are interned to `'static` strings
//! so that the hot path (lag updates on every head advance) records without
//! allocating.
//!
//! Published gauges:
//!
//! | Gauge | Labels | Value |
//! |---|---|---|
//! | `upstreams_lag` | `chain`, `upstream` | blocks behind the best peer |
//! | `upstreams_availability_status` | `chain`, `upstream` | numeric [`UpstreamAvailability`] |
//! | `upstreams_availability` | `chain`, `status` | members currently at that status |
//! | `upstreams_connected` | `chain` | member count |

use crate::upstream::{UpstreamAvailability, UpstreamId};
use dashmap::DashMap;
use metrics::gauge;
use std::sync::{Arc, OnceLock};

// Label values handed to the metrics facade must outlive the recording call.
// Upstream ids and chain codes form a small bounded set per process, so a
// one-time leak per unique name keeps the hot path allocation-free.
static LABEL_POOL: OnceLock<DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn label_to_static(value: &str) -> &'static str {
    let pool = LABEL_POOL.get_or_init(DashMap::new);

    if let Some(interned) = pool.get(value) {
        return *interned;
    }

    let owned = value.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    leaked
}

const ALL_STATUSES: [UpstreamAvailability; 5] = [
    UpstreamAvailability::Ok,
    UpstreamAvailability::Lagging,
    UpstreamAvailability::Syncing,
    UpstreamAvailability::Immature,
    UpstreamAvailability::Unavailable,
];

/// Records per-upstream gauges for one chain.
///
/// Cloning shares the underlying registry; the collector is handed to the
/// lag observer and the status watchers of the same multistream.
#[derive(Clone)]
pub struct MetricsCollector {
    chain: &'static str,
    registered: Arc<DashMap<UpstreamId, ()>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(chain_code: &str) -> Self {
        Self { chain: label_to_static(chain_code), registered: Arc::new(DashMap::new()) }
    }

    /// Registers an upstream's gauges when it joins.
    pub fn record_added(&self, id: &UpstreamId, status: UpstreamAvailability) {
        self.registered.insert(id.clone(), ());
        self.record_status(id, status);
        self.record_lag(id, 0);
        self.record_connected();
    }

    /// Clears an upstream's gauges when it leaves, so no stale series keeps
    /// pointing at a dead upstream.
    pub fn record_removed(&self, id: &UpstreamId) {
        if self.registered.remove(id).is_none() {
            return;
        }
        let upstream = label_to_static(id.as_str());
        gauge!("upstreams_lag", "chain" => self.chain, "upstream" => upstream).set(0.0);
        gauge!("upstreams_availability_status", "chain" => self.chain, "upstream" => upstream)
            .set(UpstreamAvailability::Unavailable.as_gauge_value());
        self.record_connected();
    }

    /// Records one upstream's availability status.
    pub fn record_status(&self, id: &UpstreamId, status: UpstreamAvailability) {
        let upstream = label_to_static(id.as_str());
        gauge!("upstreams_availability_status", "chain" => self.chain, "upstream" => upstream)
            .set(status.as_gauge_value());
    }

    /// Records one upstream's lag in blocks.
    pub fn record_lag(&self, id: &UpstreamId, lag: u64) {
        let upstream = label_to_static(id.as_str());
        #[allow(clippy::cast_precision_loss)]
        gauge!("upstreams_lag", "chain" => self.chain, "upstream" => upstream).set(lag as f64);
    }

    /// Records how many members sit at each availability status.
    pub fn record_status_counts(&self, counts: &[(UpstreamAvailability, usize)]) {
        for status in ALL_STATUSES {
            let count = counts
                .iter()
                .find(|(s, _)| *s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0);
            #[allow(clippy::cast_precision_loss)]
            gauge!("upstreams_availability", "chain" => self.chain, "status" => status.as_str())
                .set(count as f64);
        }
    }

    fn record_connected(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("upstreams_connected", "chain" => self.chain).set(self.registered.len() as f64);
    }

    /// Number of upstreams with registered gauges.
    #[must_use]
    pub fn connected(&self) -> usize {
        self.registered.len()
    }
}
