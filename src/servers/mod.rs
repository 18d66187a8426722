//! Server implementations.

/// Authentication server (SRP6 handshake + realm list)
pub mod auth;
