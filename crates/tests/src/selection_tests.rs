//! Api-source ordering and dispatch behavior under mixed membership.

use crate::mock_infrastructure::{eth_chain, MockUpstream, ScriptedReader};
use manifold_core::{
    multistream::Multistream,
    types::JsonRpcRequest,
    upstream::{
        selector::{Matcher, UpstreamFilter},
        Capability, Upstream, UpstreamAvailability,
    },
};
use manifold_core::config::UpstreamRole;
use std::sync::Arc;

fn request() -> JsonRpcRequest {
    JsonRpcRequest::new("eth_blockNumber", None, serde_json::json!(1))
}

#[tokio::test]
async fn test_primaries_before_fallbacks_with_lag_ordering() {
    let multistream = Multistream::new(eth_chain(), None);

    let fallback = MockUpstream::builder("fallback", &eth_chain())
        .role(UpstreamRole::Fallback)
        .build();
    let behind = MockUpstream::builder("behind", &eth_chain()).build();
    let tip = MockUpstream::builder("tip", &eth_chain()).build();

    behind.as_dyn().set_lag(9);
    tip.as_dyn().set_lag(0);

    multistream.add_upstream(fallback.as_dyn());
    multistream.add_upstream(behind.as_dyn());
    multistream.add_upstream(tip.as_dyn());

    let order: Vec<String> = multistream
        .get_api_source(&UpstreamFilter::default())
        .map(|u| u.id().to_string())
        .collect();

    assert_eq!(order, ["tip", "behind", "fallback"]);
}

#[tokio::test]
async fn test_unavailable_upstreams_sort_last() {
    let multistream = Multistream::new(eth_chain(), None);

    let down = MockUpstream::builder("down", &eth_chain())
        .status(UpstreamAvailability::Unavailable)
        .build();
    let up = MockUpstream::builder("up", &eth_chain()).build();

    multistream.add_upstream(down.as_dyn());
    multistream.add_upstream(up.as_dyn());

    let order: Vec<String> = multistream
        .get_api_source(&UpstreamFilter::default())
        .map(|u| u.id().to_string())
        .collect();

    assert_eq!(order, ["up", "down"]);
}

#[tokio::test]
async fn test_matcher_narrows_candidates() {
    let multistream = Multistream::new(eth_chain(), None);

    let archive = MockUpstream::builder("archive", &eth_chain())
        .label("kind", "archive")
        .capability(Capability::Balance)
        .build();
    let full = MockUpstream::builder("full", &eth_chain()).label("kind", "full").build();

    multistream.add_upstream(archive.as_dyn());
    multistream.add_upstream(full.as_dyn());

    let filter = UpstreamFilter::new(Matcher::And(vec![
        Matcher::label("kind", "archive"),
        Matcher::Capability(Capability::Balance),
    ]));

    let candidates: Vec<String> =
        multistream.get_api_source(&filter).map(|u| u.id().to_string()).collect();
    assert_eq!(candidates, ["archive"]);
}

#[tokio::test]
async fn test_empty_source_is_distinct_from_failing_calls() {
    let multistream = Multistream::new(eth_chain(), None);

    // No upstream advertises WS heads: the source is empty before any call.
    let plain = MockUpstream::builder("plain", &eth_chain()).build();
    multistream.add_upstream(plain.as_dyn());

    let empty =
        multistream.get_api_source(&UpstreamFilter::new(Matcher::Capability(Capability::WsHead)));
    assert!(empty.is_empty());

    // A failing candidate is a per-call failure: the walk continues.
    let failing_reader = ScriptedReader::failing(-32603, "Internal error");
    let succeeding_reader = ScriptedReader::succeeding(serde_json::json!("0x9ec86"));

    let failing = MockUpstream::builder("failing", &eth_chain())
        .reader(Arc::clone(&failing_reader))
        .build();
    let succeeding = MockUpstream::builder("succeeding", &eth_chain())
        .reader(Arc::clone(&succeeding_reader))
        .build();

    let walk_target = Multistream::new(eth_chain(), None);
    walk_target.add_upstream(failing.as_dyn());
    walk_target.add_upstream(succeeding.as_dyn());

    let mut response = None;
    for upstream in walk_target.get_api_source(&UpstreamFilter::default()) {
        let Ok(reader) = upstream.ingress() else {
            continue;
        };
        if let Ok(ok) = reader.call(request()).await {
            response = Some(ok);
            break;
        }
    }

    let response = response.expect("second candidate serves the call");
    assert_eq!(response.result, Some(serde_json::json!("0x9ec86")));
    assert_eq!(failing_reader.calls(), 1);
    assert_eq!(succeeding_reader.calls(), 1);
}

#[tokio::test]
async fn test_same_filter_same_membership_same_set() {
    let multistream = Multistream::new(eth_chain(), None);

    for id in ["u1", "u2", "u3"] {
        let upstream = MockUpstream::builder(id, &eth_chain()).build();
        multistream.add_upstream(upstream.as_dyn());
        upstream.as_dyn().set_lag(0);
    }

    let filter = UpstreamFilter::default();
    let mut first: Vec<String> =
        multistream.get_api_source(&filter).map(|u| u.id().to_string()).collect();
    let mut second: Vec<String> =
        multistream.get_api_source(&filter).map(|u| u.id().to_string()).collect();

    assert_ne!(first, second, "rotation moves the start position");
    first.sort();
    second.sort();
    assert_eq!(first, second, "the candidate set is identical");
}
