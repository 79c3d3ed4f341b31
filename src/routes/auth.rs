use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::auth::{generate_token, hash_password, verify_password};
use crate::error::{Error, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub is_admin: bool,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<LoginResponse>> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(Error::Validation("username is required".to_string()));
    }
    if req.password.len() < 8 {
        return Err(Error::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }

    let existing = sqlx::query_as::<_, (i64,)>("SELECT id FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("username is taken".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let now = chrono::Utc::now().timestamp();

    let user_id = sqlx::query(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(now)
    .execute(&state.pool)
    .await?
    .last_insert_rowid();

    let token = generate_token();
    sqlx::query(
        "INSERT INTO api_tokens (user_id, token, label, created_at) VALUES (?, ?, 'session', ?)",
    )
    .bind(user_id)
    .bind(&token)
    .bind(now)
    .execute(&state.pool)
    .await?;

    tracing::info!("New account: {} (id {})", username, user_id);

    Ok(Json(LoginResponse {
        token,
        username,
        is_admin: false,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = sqlx::query_as::<_, crate::db::models::User>(
        "SELECT * FROM users WHERE username = ?",
    )
    .bind(&req.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(Error::Unauthorized)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(Error::Unauthorized);
    }

    let token = generate_token();
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO api_tokens (user_id, token, label, created_at) VALUES (?, ?, 'session', ?)",
    )
    .bind(user.id)
    .bind(&token)
    .bind(now)
    .execute(&state.pool)
    .await?;

    Ok(Json(LoginResponse {
        token,
        username: user.username,
        is_admin: user.is_admin,
    }))
}
