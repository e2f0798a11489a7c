//! Core type definitions for chains, block references, and the JSON-RPC
//! ingress contract.
//!
//! # Type Categories
//!
//! ## Chain Types
//! - [`Chain`]: process-constant chain identity (numeric id + stable code)
//! - [`Hash32`], [`BlockRef`]: block identity with total-difficulty weight
//! - [`ChainHead`]: wire representation of a chain tip for head subscribers
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: protocol
//!   conformance for the ingress-reader contract
//!
//! # Performance Notes
//!
//! `jsonrpc` version strings use `Cow<'static, str>` and request ids use
//! `Arc<serde_json::Value>` so that echoing an id into a response is a cheap
//! reference-count bump rather than a deep copy.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, sync::Arc};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Identity of the blockchain a multistream serves.
///
/// A chain has a numeric id (e.g. `1` for Ethereum mainnet) and a stable,
/// human-readable code (e.g. `"ETH"`). Both are constant for the lifetime of
/// the process; cloning is a cheap `Arc` bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chain {
    id: u64,
    code: Arc<str>,
}

impl Chain {
    /// Creates a chain identity from its numeric id and stable code.
    #[must_use]
    pub fn new(id: u64, code: impl Into<Arc<str>>) -> Self {
        Self { id, code: code.into() }
    }

    /// Returns the numeric chain id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the stable chain code.
    #[inline]
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Error type for hash parsing
#[derive(Debug, Clone, thiserror::Error)]
pub enum HashParseError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// 32-byte block hash.
///
/// Provides `TryFrom<&str>` for idiomatic parsing of 0x-prefixed hex strings.
///
/// # Example
/// ```
/// use manifold_core::types::Hash32;
///
/// let hash: Hash32 = "0xabcd1234abcd1234abcd1234abcd1234abcd1234abcd1234abcd1234abcd1234"
///     .try_into()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// Returns the inner byte array.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the hash as lowercase hex without the `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&str> for Hash32 {
    type Error = HashParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let hex_str = value.strip_prefix("0x").ok_or(HashParseError::MissingPrefix)?;

        let bytes = hex::decode(hex_str).map_err(|e| HashParseError::InvalidHex(e.to_string()))?;

        if bytes.len() != 32 {
            return Err(HashParseError::InvalidLength(bytes.len()));
        }

        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash32(arr))
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(arr: [u8; 32]) -> Self {
        Hash32(arr)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for Hash32 {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// Reference to a single block: hash, height, and chain weight.
///
/// `weight` is the total difficulty of the chain up to this block. The head
/// aggregation logic orders blocks by weight, never by height: a block only
/// replaces the current tip when its weight is strictly greater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub hash: Hash32,
    pub height: u64,
    pub weight: U256,
}

impl BlockRef {
    /// Creates a block reference.
    #[must_use]
    pub fn new(hash: Hash32, height: u64, weight: U256) -> Self {
        Self { hash, height, weight }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.height, self.hash)
    }
}

/// Wire representation of a chain tip, as sent to head subscribers.
///
/// Field encoding follows the head-subscription contract: `block_id` is hex
/// without the `0x` prefix and `weight` is the big-endian bytes of the total
/// difficulty with leading zeros stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub chain: u64,
    pub block_id: String,
    pub height: u64,
    pub weight: Vec<u8>,
}

impl ChainHead {
    /// Builds the wire head from a chain identity and a block reference.
    #[must_use]
    pub fn from_block(chain: &Chain, block: &BlockRef) -> Self {
        Self {
            chain: chain.id(),
            block_id: block.hash.to_hex(),
            height: block.height,
            weight: block.weight.to_be_bytes_trimmed_vec(),
        }
    }
}

/// JSON-RPC 2.0 request structure.
///
/// Represents a call dispatched through an upstream's ingress reader. The
/// `id` uses `Arc<serde_json::Value>` so it can be echoed into the response
/// without a deep copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with zero allocation for the version string.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: serde_json::Value,
    ) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: Arc::new(id) }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// A response contains either a `result` (success) or an `error` (failure),
/// but never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Creates a successful JSON-RPC response.
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    /// Creates an error JSON-RPC response.
    #[must_use]
    pub fn error(code: i32, message: String, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard error codes follow the JSON-RPC 2.0 convention:
///
/// - `-32700`: Parse error (invalid JSON)
/// - `-32600`: Invalid request (malformed JSON-RPC)
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
/// - `-32000` to `-32099`: Server-defined errors (implementation-specific)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}
