//! Realm registry: the advertised game-world list.
//!
//! The list is read on every realm-list request but written only by the
//! periodic refresh, so it is kept as an `Arc` snapshot behind an `RwLock`.
//! Readers clone the pointer and serialize a consistent point-in-time list;
//! a concurrent refresh swaps the whole pointer and never exposes a
//! partially updated list.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use sqlx::MySqlPool;
use tokio::task::JoinHandle;

use crate::store::mysql;

/// One row of the realm table, as advertised to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct Realm {
    pub id: u8,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub icon: u32,
    pub flags: u8,
    pub timezone: u8,
    pub allowed_security_level: u8,
    pub population: f32,
    pub build_min: u32,
    pub build_max: u32,
    pub flag: u8,
    pub supported_builds: String,
}

pub struct RealmRegistry {
    snapshot: RwLock<Arc<Vec<Realm>>>,
}

impl RealmRegistry {
    pub fn new(realms: Vec<Realm>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(realms)),
        }
    }

    /// Current realm list. The returned snapshot stays valid even if a
    /// refresh replaces the registry contents while it is being serialized.
    pub fn snapshot(&self) -> Arc<Vec<Realm>> {
        Arc::clone(&self.snapshot.read().expect("realm snapshot lock poisoned"))
    }

    pub fn replace(&self, realms: Vec<Realm>) {
        *self.snapshot.write().expect("realm snapshot lock poisoned") = Arc::new(realms);
    }

    /// Spawns the periodic re-fetch of the realm table. A failed fetch keeps
    /// the previous snapshot; clients keep getting the last known list.
    pub fn spawn_refresh(
        registry: Arc<Self>,
        pool: MySqlPool,
        every: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            // The first tick fires immediately; boot already loaded the list.
            tick.tick().await;
            loop {
                tick.tick().await;
                match mysql::fetch_realms(&pool).await {
                    Ok(realms) => {
                        tracing::debug!("[realms] [refreshed] count={}", realms.len());
                        registry.replace(realms);
                    }
                    Err(e) => {
                        tracing::warn!("[realms] [refresh_failed] err={}", e);
                    }
                }
            }
        })
    }
}
