use thiserror::Error;

/// Errors surfaced by the aggregation core.
///
/// The taxonomy distinguishes conditions a caller can recover from (retry a
/// different upstream, treat a height as unknown) from terminal misuse of
/// the aggregate surface. No error tears down a multistream; only an
/// explicit `stop()` does.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MultistreamError {
    /// Aggregated state was queried before the first upstream was added.
    #[error("Aggregated state is not initialized")]
    NotInitialized,

    /// Every candidate upstream was filtered out or is failing.
    #[error("No upstream available for the request")]
    UpstreamUnavailable,

    /// The current-block accessor exceeded its caller-supplied duration.
    #[error("Timed out waiting for the current head")]
    HeadTimeout,

    /// Non-timeout head processing failure; the head stream stays up.
    #[error("Head processing failed: {0}")]
    HeadFault(String),

    /// JSON-RPC error returned by an upstream during ingress dispatch.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// Operation that has no meaning on an aggregated upstream
    /// (ingress reader, options, node id).
    #[error("Not supported on an aggregated upstream: {0}")]
    Unsupported(&'static str),
}

impl MultistreamError {
    /// Returns `true` if the caller may retry, possibly against another
    /// upstream or after the head advances.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::UpstreamUnavailable | Self::HeadTimeout | Self::HeadFault(_)
        )
    }

    /// Returns `true` if the condition means a height should be treated as
    /// unknown rather than reported as a failure.
    #[must_use]
    pub fn is_height_unknown(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::HeadTimeout)
    }
}
