//! Matchers and filters for picking upstreams per request.

use crate::upstream::{Capability, Upstream};

/// Predicate over an upstream's advertised labels and capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Matches every upstream.
    Any,
    /// Matches upstreams advertising the label `name=value`.
    Label { name: String, value: String },
    /// Matches upstreams advertising the capability.
    Capability(Capability),
    /// Matches when every inner matcher matches.
    And(Vec<Matcher>),
    /// Matches when at least one inner matcher matches.
    Or(Vec<Matcher>),
}

impl Matcher {
    /// Convenience constructor for a label matcher.
    #[must_use]
    pub fn label(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Label { name: name.into(), value: value.into() }
    }

    /// Evaluates the predicate against one upstream.
    #[must_use]
    pub fn matches(&self, upstream: &dyn Upstream) -> bool {
        match self {
            Self::Any => true,
            Self::Label { name, value } => {
                upstream.labels().get(name).is_some_and(|v| v == value)
            }
            Self::Capability(capability) => upstream.capabilities().contains(capability),
            Self::And(inner) => inner.iter().all(|m| m.matches(upstream)),
            Self::Or(inner) => inner.iter().any(|m| m.matches(upstream)),
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::Any
    }
}

/// Ordering applied within a role partition after rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamSort {
    /// Available upstreams first, then lower lag first.
    #[default]
    AvailabilityThenLag,
    /// Keep the rotated order untouched.
    Unsorted,
}

/// Selection criteria for one request: who is eligible, and in what order.
#[derive(Debug, Clone, Default)]
pub struct UpstreamFilter {
    pub matcher: Matcher,
    pub sort: UpstreamSort,
}

impl UpstreamFilter {
    #[must_use]
    pub fn new(matcher: Matcher) -> Self {
        Self { matcher, sort: UpstreamSort::default() }
    }
}
