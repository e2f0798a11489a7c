//! # Manifold Core
//!
//! Core library for the Manifold multi-upstream RPC aggregator.
//!
//! A [`Multistream`](multistream::Multistream) fronts every configured
//! backend ("upstream") of one chain: it tracks each member's liveness,
//! chain head, and lag, reduces them into a single authoritative view, and
//! routes calls through a filtering and rotation pipeline.
//!
//! This crate provides the foundational components for:
//!
//! - **[`multistream`]**: the per-chain orchestrator - membership driven by
//!   change events on a serialized sink, aggregate state reduction, and
//!   fan-out of fine-grained sub-events to subscribers.
//!
//! - **[`upstream`]**: the capability contract every backend fulfils, the
//!   availability ladder, weight-monotonic head tracking, lag observation,
//!   and the selector pipeline that orders eligible upstreams per request.
//!
//! - **[`metrics`]**: availability and lag gauges through the `metrics`
//!   facade.
//!
//! - **[`cache`]**: the minimal sink contract towards the external cache.
//!
//! - **[`config`]**: per-upstream option types consumed by the core.
//!
//! ## Architecture
//!
//! ```text
//! UpstreamChangeEvents
//!        │
//!        ▼ (serialized sink, one consumer task)
//! ┌─────────────────────────────────────────────────┐
//! │                  Multistream                    │
//! │  membership ── MultistreamState ── state events │
//! │      │               │                          │
//! │      ▼               ▼                          │
//! │  Head (aggregate) AvailabilityReducer ── status │
//! │      │                                          │
//! │      ▼                                          │
//! │  HeadLagObserver ── set_lag on members          │
//! └─────────────────────────────────────────────────┘
//!        │
//!        ▼
//! get_api_source(filter) ── FilteredApis ── callers walk until one serves
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! NativeCall request
//!       │
//!       ▼
//! Multistream::get_api_source(filter)
//!       │  filter by matcher, primaries first,
//!       │  rotate by seed, available + low-lag first
//!       ▼
//! FilteredApis ──► upstream.ingress().call(...) until one succeeds
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod multistream;
pub mod types;
pub mod upstream;

pub use errors::MultistreamError;
pub use multistream::Multistream;
