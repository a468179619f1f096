//! # API Keys
//!
//! A freshly issued key is `cilo_<32 random alnum chars>`; the first 8 chars
//! after the prefix separator are stored in cleartext as `prefix` (an
//! indexed, non-secret lookup shard) and the full string is hashed with
//! Argon2 before it ever reaches the database. The cleartext only exists in
//! the return value of [`Store::create_api_key`] — there is no path back to
//! it afterwards, satisfying the §8 invariant that the cleartext is not
//! recoverable from the database.

use super::models::ApiKeyRow;
use super::Store;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use cilo_protocol::control::Scope;
use rand::Rng;
use uuid::Uuid;

const KEY_BODY_LEN: usize = 32;
const PREFIX_LEN: usize = 8;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A newly minted key: the cleartext (shown once) plus the row persisted
/// for it.
pub struct IssuedKey {
    pub cleartext: String,
    pub row: ApiKeyRow,
}

fn random_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn scope_str(scope: Scope) -> &'static str {
    match scope {
        Scope::Read => "read",
        Scope::Write => "write",
        Scope::Admin => "admin",
    }
}

pub fn parse_scope(s: &str) -> Option<Scope> {
    match s {
        "read" => Some(Scope::Read),
        "write" => Some(Scope::Write),
        "admin" => Some(Scope::Admin),
        _ => None,
    }
}

impl Store {
    /// Generates a new cleartext key, hashes it, and persists the row.
    /// `(team_id, name)` advisory-uniqueness is left to the caller (spec §3
    /// marks it advisory, not enforced).
    pub async fn create_api_key(
        &self,
        team_id: Uuid,
        name: &str,
        scope: Scope,
    ) -> anyhow::Result<IssuedKey> {
        let body = random_alnum(KEY_BODY_LEN);
        let cleartext = format!("cilo_{body}");
        let prefix = body[..PREFIX_LEN].to_string();

        let salt = SaltString::generate(&mut OsRng);
        let key_hash = Argon2::default()
            .hash_password(cleartext.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("failed to hash api key: {e}"))?
            .to_string();

        let row = sqlx::query_as::<_, ApiKeyRow>(
            "INSERT INTO api_keys (id, team_id, key_hash, prefix, scope, name, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(&key_hash)
        .bind(&prefix)
        .bind(scope_str(scope))
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(IssuedKey { cleartext, row })
    }

    /// O(1) indexed lookup by prefix — the first half of bearer-token auth
    /// (spec §4.1). Returns `None` for an unrecognized prefix without
    /// touching `key_hash` comparisons at all.
    pub async fn find_api_key_by_prefix(&self, prefix: &str) -> sqlx::Result<Option<ApiKeyRow>> {
        sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE prefix = $1")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn touch_last_used(&self, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE api_keys SET last_used = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_api_key(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Verifies `cleartext` against `key_hash` in constant time. Argon2's
/// `verify_password` performs the digest comparison itself via the
/// `password-hash` crate's constant-time equality check, so there is no
/// separate timing-sensitive branch here — satisfying spec §9's "hash
/// comparison must be constant-time" guidance without hand-rolling one.
pub fn verify_api_key(cleartext: &str, key_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(key_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(cleartext.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_alnum_has_requested_length_and_alphabet() {
        let s = random_alnum(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_api_key("cilo_whatever", "not-a-valid-phc-hash"));
    }

    #[test]
    fn hash_round_trips() {
        use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"cilo_abc123", &salt)
            .unwrap()
            .to_string();
        assert!(verify_api_key("cilo_abc123", &hash));
        assert!(!verify_api_key("cilo_wrong", &hash));
    }
}
