use anyhow::Result;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::Path,
    sync::Arc,
    time::{Duration as StdDuration, Instant},
};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Hash a password using argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e))?
        .to_string();
    Ok(hash)
}

/// Verify a password against an encoded hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    } else {
        false
    }
}

/// Claims carried by issued bearer tokens. `sub` is the user id; nothing
/// else is stored and there is no revocation list.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

/// Issue a signed token for a user, valid for the provided duration.
pub fn issue_token(secret: &[u8], user_id: Uuid, valid_for: Duration) -> Result<String> {
    let exp = (OffsetDateTime::now_utc() + valid_for).unix_timestamp() as usize;
    let claims = Claims { sub: user_id, exp };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?;
    Ok(token)
}

/// Verify a token and return its claims if valid and unexpired.
pub fn verify_token(secret: &[u8], token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    if data.claims.exp < OffsetDateTime::now_utc().unix_timestamp() as usize {
        anyhow::bail!("expired");
    }
    Ok(data.claims)
}

/// Load the token signing secret from the data dir, generating and
/// persisting a fresh one on first startup.
pub async fn load_or_create_secret(path: &Path) -> Result<Vec<u8>> {
    if let Ok(encoded) = tokio::fs::read_to_string(path).await {
        let secret = STANDARD.decode(encoded.trim())?;
        if !secret.is_empty() {
            return Ok(secret);
        }
    }
    use rand::RngCore;
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    tokio::fs::write(path, STANDARD.encode(&secret)).await?;
    Ok(secret)
}

/// Simple in-memory login rate limiter.
#[derive(Clone)]
pub struct LoginRateLimiter {
    inner: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max: usize,
    window: StdDuration,
}

impl LoginRateLimiter {
    pub fn new(max: usize, window: StdDuration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max,
            window,
        }
    }

    /// Returns true if the attempt is allowed, false if rate limited.
    pub async fn check(&self, key: &str) -> bool {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let entry = guard.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);
        if entry.len() >= self.max {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("secret").unwrap();
        assert!(verify_password("secret", &hash));
        assert!(!verify_password("bad", &hash));
    }

    #[test]
    fn token_issue_and_verify() {
        let secret = b"secret";
        let user_id = Uuid::new_v4();
        let token = issue_token(secret, user_id, Duration::seconds(60)).unwrap();
        let claims = verify_token(secret, &token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = b"secret";
        let token = issue_token(secret, Uuid::new_v4(), Duration::seconds(-10)).unwrap();
        assert!(verify_token(secret, &token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(b"one", Uuid::new_v4(), Duration::seconds(60)).unwrap();
        assert!(verify_token(b"two", &token).is_err());
    }

    #[tokio::test]
    async fn secret_is_created_once_and_reloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("token_secret");
        let first = load_or_create_secret(&path).await.unwrap();
        let second = load_or_create_secret(&path).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[tokio::test]
    async fn rate_limiter_blocks() {
        let limiter = LoginRateLimiter::new(2, StdDuration::from_secs(60));
        assert!(limiter.check("u").await);
        assert!(limiter.check("u").await);
        assert!(!limiter.check("u").await);
        assert!(limiter.check("other").await);
    }
}
