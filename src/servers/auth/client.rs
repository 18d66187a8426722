//! Per-connection session handling.
//!
//! One task per accepted socket. The session is a strict request/response
//! state machine: one packet is read, one response is written, and only then
//! is the next packet read. The SRP exchange state lives inside the
//! [`Session`] variant for the proof phase, so at most one exchange can
//! exist per connection and it cannot outlive it.
//!
//! Every failure here closes this connection only; nothing propagates to the
//! listener or to other sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::packet;
use super::{AuthError, AuthState};
use crate::srp::SrpExchange;

/// Upper bound on the challenge body a client may declare. The fixed fields
/// plus a maximum-length account name fit well under this.
const MAX_CHALLENGE_BODY: usize = 320;

enum Session {
    AwaitingChallenge,
    AwaitingProof { exchange: SrpExchange },
    Authenticated { username: String },
    RealmListServed { username: String },
    Rejected,
}

impl Session {
    fn label(&self) -> &'static str {
        match self {
            Session::AwaitingChallenge => "awaiting challenge",
            Session::AwaitingProof { .. } => "awaiting proof",
            Session::Authenticated { .. } => "authenticated",
            Session::RealmListServed { .. } => "realm list served",
            Session::Rejected => "rejected",
        }
    }
}

pub async fn handle_client(state: Arc<AuthState>, mut stream: TcpStream, peer: SocketAddr) {
    match run_session(&state, &mut stream).await {
        Ok(()) => tracing::debug!("[auth] [closed] peer={}", peer),
        Err(e) => tracing::debug!("[auth] [closed] peer={} reason={}", peer, e),
    }
}

async fn run_session<S>(state: &AuthState, stream: &mut S) -> Result<(), AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let idle = state.config.idle_timeout();
    let mut session = Session::AwaitingChallenge;

    loop {
        let mut opcode = [0u8; 1];
        match tokio::time::timeout(idle, stream.read_exact(&mut opcode)).await {
            Err(_) => return Err(AuthError::IdleTimeout),
            // The peer closing between packets is a normal end of session.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(AuthError::Io(e)),
            Ok(Ok(_)) => {}
        }

        session = match (opcode[0], session) {
            (packet::CMD_AUTH_LOGON_CHALLENGE, Session::AwaitingChallenge) => {
                handle_challenge(state, stream, idle).await?
            }
            (packet::CMD_AUTH_LOGON_PROOF, Session::AwaitingProof { exchange }) => {
                handle_proof(stream, idle, exchange).await?
            }
            (
                packet::CMD_REALM_LIST,
                Session::Authenticated { username } | Session::RealmListServed { username },
            ) => handle_realm_list(state, stream, idle, username).await?,
            (op, session) => {
                return Err(AuthError::UnexpectedOpcode {
                    opcode: op,
                    phase: session.label(),
                });
            }
        };

        // A failure status has already been written; close the connection.
        if matches!(session, Session::Rejected) {
            return Ok(());
        }
    }
}

async fn handle_challenge<S>(
    state: &AuthState,
    stream: &mut S,
    idle: Duration,
) -> Result<Session, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // Remainder of the 4-byte header: protocol version and declared size.
    let mut header = [0u8; 3];
    read_exact_timed(stream, &mut header, idle).await?;
    let body_len = u16::from_le_bytes([header[1], header[2]]) as usize;
    if body_len > MAX_CHALLENGE_BODY {
        return Err(AuthError::OversizedPacket(body_len));
    }

    let mut packet_bytes = vec![0u8; 4 + body_len];
    packet_bytes[0] = packet::CMD_AUTH_LOGON_CHALLENGE;
    packet_bytes[1..4].copy_from_slice(&header);
    read_exact_timed(stream, &mut packet_bytes[4..], idle).await?;

    let challenge = packet::decode_logon_challenge(&packet_bytes)?;
    let username = challenge.account_name.to_ascii_uppercase();
    tracing::debug!(
        "[auth] [challenge] account={} build={}",
        username,
        challenge.build
    );

    let account = match state.accounts.lookup(&username).await {
        Ok(account) => account,
        Err(e) => {
            stream
                .write_all(&packet::build_challenge_failure(packet::LOGIN_DB_BUSY))
                .await?;
            return Err(AuthError::Store(e));
        }
    };

    let Some(account) = account else {
        tracing::info!("[auth] [unknown_account] account={}", username);
        stream
            .write_all(&packet::build_challenge_failure(
                packet::LOGIN_UNKNOWN_ACCOUNT,
            ))
            .await?;
        return Ok(Session::Rejected);
    };

    let exchange = SrpExchange::begin(&username, account.salt, account.verifier, &mut rand::rng());
    let mut crc_seed = [0u8; 16];
    rand::rng().fill_bytes(&mut crc_seed);

    stream
        .write_all(&packet::build_challenge_success(
            exchange.server_public_key(),
            exchange.salt(),
            &crc_seed,
        ))
        .await?;

    Ok(Session::AwaitingProof { exchange })
}

async fn handle_proof<S>(
    stream: &mut S,
    idle: Duration,
    exchange: SrpExchange,
) -> Result<Session, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut packet_bytes = [0u8; packet::PROOF_PACKET_LEN];
    packet_bytes[0] = packet::CMD_AUTH_LOGON_PROOF;
    read_exact_timed(stream, &mut packet_bytes[1..], idle).await?;

    let proof = packet::decode_logon_proof(&packet_bytes)?;
    let username = exchange.username().to_string();

    match exchange.prove(&proof.client_public_key, &proof.client_proof) {
        Ok(proven) => {
            stream
                .write_all(&packet::build_proof_success(&proven.server_proof, 0))
                .await?;
            tracing::info!("[auth] [authenticated] account={}", username);
            Ok(Session::Authenticated { username })
        }
        Err(reason) => {
            tracing::info!("[auth] [rejected] account={} reason={}", username, reason);
            stream
                .write_all(&packet::build_proof_failure(
                    packet::LOGIN_INCORRECT_PASSWORD,
                ))
                .await?;
            Ok(Session::Rejected)
        }
    }
}

async fn handle_realm_list<S>(
    state: &AuthState,
    stream: &mut S,
    idle: Duration,
    username: String,
) -> Result<Session, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // The request carries four unused bytes after the opcode.
    let mut tail = [0u8; packet::REALM_LIST_REQUEST_TAIL];
    read_exact_timed(stream, &mut tail, idle).await?;

    let realms = state.realms.snapshot();
    stream.write_all(&packet::build_realm_list(&realms)).await?;
    tracing::debug!(
        "[auth] [realm_list] account={} count={}",
        username,
        realms.len()
    );

    Ok(Session::RealmListServed { username })
}

async fn read_exact_timed<S>(
    stream: &mut S,
    buf: &mut [u8],
    idle: Duration,
) -> Result<(), AuthError>
where
    S: AsyncRead + Unpin + Send,
{
    match tokio::time::timeout(idle, stream.read_exact(buf)).await {
        Err(_) => Err(AuthError::IdleTimeout),
        Ok(Err(e)) => Err(AuthError::Io(e)),
        Ok(Ok(_)) => Ok(()),
    }
}
