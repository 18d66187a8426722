//! In-memory account store for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{Account, AccountStore, StoreError};
use crate::srp::{self, KEY_LENGTH};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: HashMap<String, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisions an account from a plain password, deriving the verifier
    /// the same way an operator tool would before inserting a database row.
    pub fn insert(&mut self, username: &str, password: &str, salt: [u8; KEY_LENGTH]) {
        let username = username.to_ascii_uppercase();
        let password = password.to_ascii_uppercase();
        let verifier = srp::calculate_password_verifier(&username, &password, &salt);
        self.accounts.insert(
            username.clone(),
            Account {
                username,
                salt,
                verifier,
            },
        );
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn lookup(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(username).cloned())
    }
}
