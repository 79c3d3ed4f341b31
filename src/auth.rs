use axum::http::HeaderMap;

use crate::db::{models::User, DbPool};
use crate::error::{Error, Result};

/// Extract token from Authorization: Bearer <token> header
pub fn extract_token_from_header(auth_header: &str) -> Option<String> {
  auth_header
    .strip_prefix("Bearer ")
    .map(|t| t.trim().to_string())
}

/// Look up user by token
pub async fn get_user_by_token(pool: &DbPool, token: &str) -> Result<Option<User>> {
  let now = chrono::Utc::now().timestamp();

  // Find token and verify it's not revoked
  let token_row = sqlx::query_as::<_, (i64,)>(
    "SELECT user_id FROM api_tokens WHERE token = ? AND revoked = 0",
  )
  .bind(token)
  .fetch_optional(pool)
  .await?;

  let user_id = match token_row {
    Some((user_id,)) => user_id,
    None => return Ok(None),
  };

  // Update last_used_at
  sqlx::query("UPDATE api_tokens SET last_used_at = ? WHERE token = ?")
    .bind(now)
    .bind(token)
    .execute(pool)
    .await?;

  let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

  Ok(user)
}

/// Generate a random API token
pub fn generate_token() -> String {
  use std::time::{SystemTime, UNIX_EPOCH};

  let timestamp = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap()
    .as_nanos();

  let random_bytes: Vec<u8> = (0..32)
    .map(|_| rand::random::<u8>())
    .collect();

  format!("{:x}{}", timestamp, hex::encode(&random_bytes))
}

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
  bcrypt::hash(password, bcrypt::DEFAULT_COST)
    .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
  bcrypt::verify(password, hash)
    .map_err(|e| Error::Internal(format!("password verification failed: {}", e)))
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
  pub id: i64,
  pub username: String,
  pub is_admin: bool,
}

impl AuthUser {
  pub async fn from_headers(pool: &DbPool, headers: &HeaderMap) -> Result<AuthUser> {
    let token = headers
      .get("Authorization")
      .and_then(|v| v.to_str().ok())
      .and_then(extract_token_from_header)
      .ok_or(Error::Unauthorized)?;

    let user = get_user_by_token(pool, &token)
      .await?
      .ok_or(Error::Unauthorized)?;

    Ok(AuthUser {
      id: user.id,
      username: user.username,
      is_admin: user.is_admin,
    })
  }

  pub fn require_admin(&self) -> Result<()> {
    if self.is_admin {
      Ok(())
    } else {
      Err(Error::Forbidden)
    }
  }
}
