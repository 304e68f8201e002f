use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use crate::{error::StoreError, model::ResourceId, store::Store};

const USERNAME_PW: &str = "username_pw";

/// Hash a password using argon2id.
pub fn hash_password(pass: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(pass.as_bytes(), &salt)
        .map_err(|e| StoreError::Hash(e.to_string()))?
        .to_string();
    Ok(hash)
}

/// Verify a password against an encoded hash.
pub fn verify_password(pass: &str, hash: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default()
            .verify_password(pass.as_bytes(), &parsed)
            .is_ok()
    } else {
        false
    }
}

/// Give `rsc_id` the login `username`/`password`, replacing any earlier one.
///
/// Returns false when the stored credential already matches.
pub fn set_username_pw(
    store: &Store,
    rsc_id: ResourceId,
    username: &str,
    password: &str,
) -> Result<bool, StoreError> {
    let mut conn = store.conn()?;
    let tx = conn.transaction()?;
    let existing: Option<(String, String)> = tx
        .query_row(
            "SELECT key, secret FROM identity WHERE rsc_id = ?1 AND kind = ?2",
            params![rsc_id, USERNAME_PW],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((key, secret)) = existing {
        if key == username && verify_password(password, &secret) {
            return Ok(false);
        }
    }
    let hash = hash_password(password)?;
    tx.execute(
        "DELETE FROM identity WHERE rsc_id = ?1 AND kind = ?2",
        params![rsc_id, USERNAME_PW],
    )?;
    tx.execute(
        "INSERT INTO identity (rsc_id, kind, key, secret, modified) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rsc_id,
            USERNAME_PW,
            username,
            hash,
            store.now().unix_timestamp()
        ],
    )?;
    tx.commit()?;
    info!(rsc_id, username, "login credential set");
    Ok(true)
}

/// Resource id for a matching username/password pair.
pub fn check_username_pw(
    store: &Store,
    username: &str,
    password: &str,
) -> Result<Option<ResourceId>, StoreError> {
    let row: Option<(ResourceId, String)> = store
        .conn()?
        .query_row(
            "SELECT rsc_id, secret FROM identity WHERE kind = ?1 AND key = ?2",
            params![USERNAME_PW, username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.and_then(|(id, secret)| verify_password(password, &secret).then_some(id)))
}
