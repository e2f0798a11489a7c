//! Per-upstream lag derivation.
//!
//! The observer follows the aggregate head and, on every promotion,
//! recomputes each member's distance to the highest known height. Lag is
//! pushed into the upstreams via [`Upstream::set_lag`]; members whose height
//! cannot be read keep their last known lag rather than being reset.
//!
//! A multistream runs exactly one observer, and only while it is started
//! with two or more members. With a single member the lag is forced to 0 and
//! no observer exists.

use crate::{
    metrics::MetricsCollector,
    upstream::{head::Head, Upstream},
};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, trace};

/// Follows the aggregate head and assigns lag to every member.
pub struct HeadLagObserver {
    handle: JoinHandle<()>,
}

impl HeadLagObserver {
    /// Spawns the observer task.
    ///
    /// `upstreams` is the multistream's live membership snapshot; the
    /// observer reads it lock-free on every probe, so membership changes do
    /// not require restarting the observer.
    #[must_use]
    pub fn spawn(
        master: &Head,
        upstreams: Arc<ArcSwap<Vec<Arc<dyn Upstream>>>>,
        metrics: MetricsCollector,
    ) -> Self {
        let mut flux = master.flux();

        let handle = tokio::spawn(async move {
            loop {
                match flux.recv().await {
                    Ok(top) => probe(&upstreams, top.height, &metrics),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Only the latest promotion matters for lag.
                        trace!(skipped, "lag observer dropped intermediate heads");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("lag observer source closed");
                        break;
                    }
                }
            }
        });

        Self { handle }
    }

    /// Disposes the observer and its subscription.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for HeadLagObserver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn probe(
    upstreams: &ArcSwap<Vec<Arc<dyn Upstream>>>,
    top_height: u64,
    metrics: &MetricsCollector,
) {
    let members = upstreams.load();

    let best = members
        .iter()
        .filter_map(|u| u.current_height())
        .fold(top_height, u64::max);

    for upstream in members.iter() {
        // Unknown height: keep the last known lag, no spurious reset.
        let Some(height) = upstream.current_height() else {
            continue;
        };

        let lag = best.saturating_sub(height);
        upstream.set_lag(lag);
        metrics.record_lag(upstream.id(), lag);
        trace!(upstream = %upstream.id(), lag, best, "lag updated");
    }
}
