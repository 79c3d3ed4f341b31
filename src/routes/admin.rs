use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::models::{RemoteAccount, User};
use crate::error::{Error, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AbusiveRequest {
    pub abusive: bool,
}

#[derive(Debug, Serialize)]
pub struct AbusiveResponse {
    pub id: i64,
    pub name: String,
    pub abusive: bool,
}

/// Flag or unflag a local account. Flagged accounts' votes stay stored but
/// never surface in request listings.
pub async fn set_user_abusive(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<AbusiveRequest>,
) -> Result<Json<AbusiveResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    if auth.id == user_id {
        return Err(Error::Validation(
            "cannot flag your own account".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET abusive = ? WHERE id = ?")
        .bind(req.abusive)
        .bind(user_id)
        .execute(&state.pool)
        .await?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(Error::NotFound("user"))?;

    Ok(Json(AbusiveResponse {
        id: user.id,
        name: user.username,
        abusive: user.abusive,
    }))
}

pub async fn set_remote_abusive(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Json(req): Json<AbusiveRequest>,
) -> Result<Json<AbusiveResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    sqlx::query("UPDATE remote_accounts SET abusive = ? WHERE id = ?")
        .bind(req.abusive)
        .bind(account_id)
        .execute(&state.pool)
        .await?;
    let account = sqlx::query_as::<_, RemoteAccount>("SELECT * FROM remote_accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(Error::NotFound("remote account"))?;

    Ok(Json(AbusiveResponse {
        id: account.id,
        name: account.handle,
        abusive: account.abusive,
    }))
}
