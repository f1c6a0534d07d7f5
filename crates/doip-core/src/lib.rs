//! doip-core — DoIP (ISO 13400) wire codec, response catalog and UDS
//! response synthesis.
//!
//! This crate is the pure, non-I/O heart of the DoIP server emulator: it
//! frames/unframes the 8-byte DoIP header, indexes a request/response
//! catalog, and synthesizes default UDS responses when the catalog has no
//! entry for a request. It never opens a socket — that is
//! `doip-emulator`'s job.
//!
//! # Modules
//!
//! - [`codec`] — header encode/decode, exact-length stream reads
//! - [`catalog`] — the request -> response lookup table
//! - [`uds`] — UDS response resolution (catalog + default synthesizer)
//! - [`protocol`] — payload-type dispatch shaping (vehicle ID, routing
//!   activation, diagnostic messages)
//! - [`identity`] — server/vehicle identity types
//! - [`events`] — structured event records and the broadcast sink
//! - [`error`] — error kinds shared across the above

pub mod catalog;
pub mod codec;
pub mod error;
pub mod events;
pub mod identity;
pub mod protocol;
pub mod uds;

pub use catalog::ResponseCatalog;
pub use codec::{DecodedHeader, PayloadType};
pub use error::{ConfigError, DoipError};
pub use events::{Category, EventRecord, EventSink, Severity};
pub use identity::{ServerIdentity, VehicleIdentity};
pub use uds::AddressType;
