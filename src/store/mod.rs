//! Account credential storage.
//!
//! Sessions only ever see the [`AccountStore`] trait; the MySQL
//! implementation backs production and the in-memory one backs tests and
//! local development. The store never sees passwords, only the SRP salt and
//! verifier provisioned for each account.

use async_trait::async_trait;
use thiserror::Error;

use crate::srp::KEY_LENGTH;

pub mod memory;
pub mod mysql;

pub use memory::MemoryAccountStore;
pub use mysql::MySqlAccountStore;

/// SRP credentials for one account.
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    pub salt: [u8; KEY_LENGTH],
    pub verifier: [u8; KEY_LENGTH],
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or the query failed. Sessions
    /// answer this with the try-again-later status.
    #[error("account store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    /// The row exists but its credential columns cannot be decoded.
    #[error("account row for '{username}' is malformed: {reason}")]
    BadRow {
        username: String,
        reason: &'static str,
    },
}

/// Lookup boundary between sessions and credential storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetches the credentials for `username`, which the caller has already
    /// uppercased. `Ok(None)` means the account does not exist.
    async fn lookup(&self, username: &str) -> Result<Option<Account>, StoreError>;
}
