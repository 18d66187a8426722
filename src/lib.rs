//! Realmd - game authentication server
//!
//! The front door of a legacy multiplayer game: clients connect over TCP,
//! prove knowledge of their password through the SRP6 handshake without ever
//! sending it, and receive the list of available game realms.

/// Server configuration (YAML)
pub mod config;
/// Realm registry shared between sessions and the refresh task
pub mod realms;
/// Server implementations
pub mod servers;
/// SRP6 challenge/proof engine
pub mod srp;
/// Account credential storage
pub mod store;
