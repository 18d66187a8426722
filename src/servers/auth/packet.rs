//! Wire codec for the authentication protocol.
//!
//! Pure byte-level decode/encode, no socket or session state. All integers
//! are little-endian; keys, salts and proofs are fixed-width little-endian
//! arrays. Decoders validate every length before indexing; a short buffer or
//! an account-name length that overruns the packet is an error, never an
//! out-of-bounds read.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use crate::realms::Realm;
use crate::srp::{primes, KEY_LENGTH, PROOF_LENGTH};

pub const CMD_AUTH_LOGON_CHALLENGE: u8 = 0x00;
pub const CMD_AUTH_LOGON_PROOF: u8 = 0x01;
pub const CMD_REALM_LIST: u8 = 0x10;

pub const LOGIN_OK: u8 = 0x00;
pub const LOGIN_UNKNOWN_ACCOUNT: u8 = 0x04;
pub const LOGIN_INCORRECT_PASSWORD: u8 = 0x05;
pub const LOGIN_DB_BUSY: u8 = 0x08;

/// Fixed bytes of the logon challenge before the variable-length name.
pub const CHALLENGE_HEADER_LEN: usize = 34;
/// Exact size of the logon proof packet.
pub const PROOF_PACKET_LEN: usize = 75;
/// Bytes of the realm-list request following its opcode.
pub const REALM_LIST_REQUEST_TAIL: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet too short: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("account name length {len} overruns the {got} byte packet")]
    NameOverrun { len: usize, got: usize },
    #[error("unexpected opcode {0:#04x}")]
    WrongOpcode(u8),
    #[error("account name is not valid utf-8")]
    NameNotUtf8,
}

/// Client hello: game/build identification plus the account name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonChallenge {
    pub protocol_version: u8,
    pub size: u16,
    pub game_name: [u8; 4],
    pub version: [u8; 3],
    pub build: u16,
    pub platform: [u8; 4],
    pub os: [u8; 4],
    pub locale: [u8; 4],
    pub world_region_bias: u32,
    pub client_ip: [u8; 4],
    pub account_name: String,
}

/// Client proof: its public key A and the proof M1. The CRC hash and key
/// count are carried by the client but not acted on here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonProof {
    pub client_public_key: [u8; KEY_LENGTH],
    pub client_proof: [u8; PROOF_LENGTH],
    pub crc_hash: [u8; PROOF_LENGTH],
    pub number_of_keys: u8,
    pub security_flags: u8,
}

pub fn decode_logon_challenge(buf: &[u8]) -> Result<LogonChallenge, PacketError> {
    if buf.len() < CHALLENGE_HEADER_LEN {
        return Err(PacketError::TooShort {
            need: CHALLENGE_HEADER_LEN,
            got: buf.len(),
        });
    }
    if buf[0] != CMD_AUTH_LOGON_CHALLENGE {
        return Err(PacketError::WrongOpcode(buf[0]));
    }

    let name_len = buf[33] as usize;
    let name_end = CHALLENGE_HEADER_LEN + name_len;
    if buf.len() < name_end {
        return Err(PacketError::NameOverrun {
            len: name_len,
            got: buf.len(),
        });
    }

    let account_name = std::str::from_utf8(&buf[CHALLENGE_HEADER_LEN..name_end])
        .map_err(|_| PacketError::NameNotUtf8)?
        .to_string();

    Ok(LogonChallenge {
        protocol_version: buf[1],
        size: u16::from_le_bytes([buf[2], buf[3]]),
        game_name: fixed(buf, 4),
        version: fixed(buf, 8),
        build: u16::from_le_bytes([buf[11], buf[12]]),
        platform: fixed(buf, 13),
        os: fixed(buf, 17),
        locale: fixed(buf, 21),
        world_region_bias: u32::from_le_bytes([buf[25], buf[26], buf[27], buf[28]]),
        client_ip: fixed(buf, 29),
        account_name,
    })
}

pub fn decode_logon_proof(buf: &[u8]) -> Result<LogonProof, PacketError> {
    if buf.len() < PROOF_PACKET_LEN {
        return Err(PacketError::TooShort {
            need: PROOF_PACKET_LEN,
            got: buf.len(),
        });
    }
    if buf[0] != CMD_AUTH_LOGON_PROOF {
        return Err(PacketError::WrongOpcode(buf[0]));
    }

    Ok(LogonProof {
        client_public_key: fixed(buf, 1),
        client_proof: fixed(buf, 33),
        crc_hash: fixed(buf, 53),
        number_of_keys: buf[73],
        security_flags: buf[74],
    })
}

/// Challenge response carrying B, the group parameters, the account salt and
/// the CRC seed. Security flags are always 0: no PIN, matrix card or token.
pub fn build_challenge_success(
    server_public_key: &[u8; KEY_LENGTH],
    salt: &[u8; KEY_LENGTH],
    crc_seed: &[u8; 16],
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(119);
    buf.put_u8(CMD_AUTH_LOGON_CHALLENGE);
    buf.put_u8(0x00); // protocol
    buf.put_u8(LOGIN_OK);
    buf.put_slice(server_public_key);
    buf.put_u8(1); // generator length
    buf.put_u8(primes::GENERATOR);
    buf.put_u8(primes::LARGE_SAFE_PRIME_LE.len() as u8);
    buf.put_slice(&primes::LARGE_SAFE_PRIME_LE);
    buf.put_slice(salt);
    buf.put_slice(crc_seed);
    buf.put_u8(0); // security flags
    buf.to_vec()
}

pub fn build_challenge_failure(status: u8) -> Vec<u8> {
    vec![CMD_AUTH_LOGON_CHALLENGE, 0x00, status]
}

pub fn build_proof_success(server_proof: &[u8; PROOF_LENGTH], account_flags: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(26);
    buf.put_u8(CMD_AUTH_LOGON_PROOF);
    buf.put_u8(LOGIN_OK);
    buf.put_slice(server_proof);
    buf.put_u32_le(account_flags);
    buf.to_vec()
}

pub fn build_proof_failure(status: u8) -> Vec<u8> {
    vec![CMD_AUTH_LOGON_PROOF, status]
}

/// Serializes a realm list snapshot. Pure: the same snapshot always yields
/// the same bytes.
pub fn build_realm_list(realms: &[Realm]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32_le(0); // unused header field
    body.put_u16_le(realms.len() as u16);
    for realm in realms {
        body.put_u32_le(realm.icon);
        body.put_u8(realm.flags);
        body.put_slice(realm.name.as_bytes());
        body.put_u8(0);
        body.put_slice(format!("{}:{}", realm.address, realm.port).as_bytes());
        body.put_u8(0);
        body.put_f32_le(realm.population);
        body.put_u8(0); // character count is world-server data
        body.put_u8(realm.timezone);
        body.put_u8(realm.id);
    }

    let mut buf = BytesMut::with_capacity(3 + body.len());
    buf.put_u8(CMD_REALM_LIST);
    buf.put_u16_le(body.len() as u16);
    buf.put_slice(&body);
    buf.to_vec()
}

/// Copies a fixed-width field out of a buffer whose length has already been
/// checked against `at + W`.
fn fixed<const W: usize>(buf: &[u8], at: usize) -> [u8; W] {
    let mut out = [0u8; W];
    out.copy_from_slice(&buf[at..at + W]);
    out
}
