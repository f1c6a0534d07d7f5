//! doip-emulator — the transport and lifecycle layer around `doip-core`.
//!
//! Owns the sockets, the per-connection session state, and configuration
//! loading; `doip-core` owns everything about the wire format and the UDS
//! response rules. Also ships the `doip-emulator` CLI binary (`src/main.rs`).
//!
//! # Modules
//!
//! - [`config`] — `EmulatorConfig`, loaded from TOML or built programmatically
//! - [`session`] — per-connection lifecycle state
//! - [`transport`] — the TCP/UDP runtime and [`transport::DoipServer`]

pub mod config;
pub mod session;
pub mod transport;

pub use config::EmulatorConfig;
pub use session::{ClientSession, SessionState};
pub use transport::DoipServer;
