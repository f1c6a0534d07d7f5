//! Protocol-level error kinds, per the policy table in the embedding spec.

use thiserror::Error;

/// Errors raised while framing, dispatching or responding to DoIP traffic.
///
/// Every variant here is recoverable at the session or datagram level; none
/// of them should ever propagate out of a handler task and abort the
/// process. See the call sites for the logging/close policy attached to
/// each kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DoipError {
    #[error("malformed DoIP header: version 0x{version:02X}, inverse 0x{inverse:02X}")]
    MalformedHeader { version: u8, inverse: u8 },

    #[error("short read: expected {expected} bytes, stream closed after {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("oversized payload: declared {declared} bytes exceeds limit of {limit} bytes")]
    OversizedPayload { declared: u32, limit: u32 },

    #[error("unsupported DoIP payload type 0x{0:04X}")]
    UnknownPayloadType(u16),

    #[error("invalid routing activation request: payload length {0} < 4")]
    InvalidRoutingRequest(usize),

    #[error("write failed: {0}")]
    WriteFailure(String),

    #[error("failed to bind {addr}: {source}")]
    BindFailure { addr: String, source: String },
}

/// Errors raised while loading configuration or the response catalog.
///
/// These never abort the server: a `CatalogLoad` failure leaves the catalog
/// empty, and `EmulatorConfig` construction failures are the caller's to
/// decide on before `start()` is ever called.
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    #[error("failed to read response catalog {path}: {source}")]
    CatalogRead { path: String, source: String },

    #[error("malformed response catalog entry: {0}")]
    CatalogEntry(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
