//! MySQL-backed account store and realm-table access.

use async_trait::async_trait;
use sqlx::MySqlPool;

use super::{Account, AccountStore, StoreError};
use crate::realms::Realm;
use crate::srp::KEY_LENGTH;

pub struct MySqlAccountStore {
    pool: MySqlPool,
}

impl MySqlAccountStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for MySqlAccountStore {
    async fn lookup(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT v, s FROM account WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        let Some((verifier_hex, salt_hex)) = row else {
            return Ok(None);
        };

        let salt = decode_credential_column(&salt_hex).ok_or_else(|| StoreError::BadRow {
            username: username.to_string(),
            reason: "salt column is not 32 bytes of hex",
        })?;
        let verifier = decode_credential_column(&verifier_hex).ok_or_else(|| StoreError::BadRow {
            username: username.to_string(),
            reason: "verifier column is not 32 bytes of hex",
        })?;

        Ok(Some(Account {
            username: username.to_string(),
            salt,
            verifier,
        }))
    }
}

/// Reads the full realm table, ordered by realm id.
pub async fn fetch_realms(pool: &MySqlPool) -> Result<Vec<Realm>, StoreError> {
    type RealmRow = (
        u8,
        String,
        String,
        u16,
        u32,
        u8,
        u8,
        u8,
        f32,
        u32,
        u32,
        u8,
        String,
    );

    let rows: Vec<RealmRow> = sqlx::query_as(
        "SELECT id, name, address, port, icon, realmflags, timezone, \
         allowedSecurityLevel, population, gamebuild_min, gamebuild_max, \
         flag, realmbuilds FROM realmlist ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(
                id,
                name,
                address,
                port,
                icon,
                flags,
                timezone,
                allowed_security_level,
                population,
                build_min,
                build_max,
                flag,
                supported_builds,
            )| Realm {
                id,
                name,
                address,
                port,
                icon,
                flags,
                timezone,
                allowed_security_level,
                population,
                build_min,
                build_max,
                flag,
                supported_builds,
            },
        )
        .collect())
}

/// Decodes a big-endian hex credential column into the little-endian
/// fixed-width array used by the engine and the wire, left-padding short
/// values with zeroes.
fn decode_credential_column(column: &str) -> Option<[u8; KEY_LENGTH]> {
    let mut bytes = hex::decode(column).ok()?;
    if bytes.len() > KEY_LENGTH {
        return None;
    }
    bytes.reverse();

    let mut out = [0u8; KEY_LENGTH];
    out[..bytes.len()].copy_from_slice(&bytes);
    Some(out)
}

// Queries against a live database are exercised by the ops environment, not
// by CI; the tests below cover the column decoding only.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_hex_into_little_endian_bytes() {
        let salt = decode_credential_column(
            "894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7",
        )
        .unwrap();
        assert_eq!(salt[0], 0xb7);
        assert_eq!(salt[31], 0x89);
    }

    #[test]
    fn short_columns_are_zero_padded() {
        let value = decode_credential_column("0102").unwrap();
        assert_eq!(value[0], 0x02);
        assert_eq!(value[1], 0x01);
        assert!(value[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn oversized_and_invalid_columns_are_refused() {
        assert!(decode_credential_column(&"ab".repeat(33)).is_none());
        assert!(decode_credential_column("not hex").is_none());
    }
}
