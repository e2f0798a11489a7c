//! Per-upstream options consumed by the aggregation core.
//!
//! Configuration *loading* happens outside the core: the embedding service
//! reads its TOML/env layers and hands fully-formed [`UpstreamOptions`] to
//! the upstream drivers. The types here only define the shape the core
//! consumes, with serde defaults matching what a bare `[[upstreams]]` table
//! would produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Labels attached to an upstream, used for label-scoped routing and quorums.
///
/// A `BTreeMap` keeps label sets ordered so that grouping upstreams by
/// identical label sets is deterministic.
pub type Labels = BTreeMap<String, String>;

/// Role of an upstream in the selection order.
///
/// Primaries are preferred for every call; fallbacks are used when the
/// primaries cannot serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamRole {
    #[default]
    Primary,
    Fallback,
}

/// Options for a single upstream, as consumed by the core.
///
/// # Example
///
/// ```toml
/// [[upstreams]]
/// id = "infura"
/// role = "primary"
/// priority = 100
/// timeout_seconds = 30
/// retries = 3
///
/// [upstreams.labels]
/// provider = "infura"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamOptions {
    /// Role in the selection order. Defaults to `primary`.
    #[serde(default)]
    pub role: UpstreamRole,

    /// Relative priority among upstreams of the same role. Higher is
    /// preferred. Defaults to `100`.
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retry attempts for failed calls before the next upstream is tried.
    /// Defaults to `3`.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Labels advertised for matcher-based selection.
    #[serde(default)]
    pub labels: Labels,
}

fn default_priority() -> u32 {
    100
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            role: UpstreamRole::default(),
            priority: default_priority(),
            timeout_seconds: default_timeout_seconds(),
            retries: default_retries(),
            labels: Labels::new(),
        }
    }
}
