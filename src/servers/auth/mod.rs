//! Authentication server: listener, connection lifecycle and error taxonomy.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::realms::{Realm, RealmRegistry};
use crate::store::{AccountStore, MemoryAccountStore, StoreError};

pub mod client;
pub mod packet;

/// Everything that can end a single connection. None of these variants ever
/// reach the accept loop; they are logged at close and dropped.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] packet::PacketError),
    #[error("unexpected opcode {opcode:#04x} while {phase}")]
    UnexpectedOpcode { opcode: u8, phase: &'static str },
    #[error("declared challenge size {0} exceeds the limit")]
    OversizedPacket(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("connection idle too long")]
    IdleTimeout,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state handed to every session task.
pub struct AuthState {
    pub config: ServerConfig,
    pub accounts: Arc<dyn AccountStore>,
    pub realms: Arc<RealmRegistry>,
}

impl AuthState {
    pub fn new(
        config: ServerConfig,
        accounts: Arc<dyn AccountStore>,
        realms: Arc<RealmRegistry>,
    ) -> Self {
        Self {
            config,
            accounts,
            realms,
        }
    }

    /// State backed by the in-memory store, for tests.
    pub fn test_only(accounts: MemoryAccountStore, realms: Vec<Realm>) -> Self {
        Self {
            config: ServerConfig::test_defaults(),
            accounts: Arc::new(accounts),
            realms: Arc::new(RealmRegistry::new(realms)),
        }
    }

    /// Binds the listener and serves until the shutdown signal flips.
    ///
    /// Bind failure is the one fatal error class here; everything after the
    /// bind is confined to the connection it happened on.
    pub async fn run(
        state: Arc<Self>,
        bind: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("Cannot listen on {bind}"))?;
        tracing::info!("[auth] [ready] addr={}", bind);

        let limit = Arc::new(Semaphore::new(state.config.max_connections));
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                                // Dropping the socket closes it.
                                tracing::warn!("[auth] [refused] peer={} reason=max_connections", peer);
                                continue;
                            };
                            tracing::debug!("[auth] [accepted] peer={}", peer);
                            let state = Arc::clone(&state);
                            sessions.spawn(async move {
                                client::handle_client(state, stream, peer).await;
                                drop(permit);
                            });
                        }
                        Err(e) => tracing::error!("[auth] [accept_error] err={}", e),
                    }
                }
                // Reap finished sessions so the set does not grow unbounded.
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("[auth] [draining] sessions={}", sessions.len());
        let grace = state.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "[auth] [drain_timeout] aborting sessions={}",
                sessions.len()
            );
            sessions.shutdown().await;
        }
        tracing::info!("[auth] [stopped]");
        Ok(())
    }

    /// Serves one already-accepted socket. Used by integration tests that
    /// run their own accept loop.
    pub async fn handle_new_connection(state: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        client::handle_client(state, stream, peer).await;
    }
}
