use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::models::Play;
use crate::error::Result;
use crate::plays;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub id: i64,
    pub show_id: i64,
    pub track_id: i64,
    pub created_at: i64,
    pub external_post_id: Option<String>,
}

impl From<Play> for PlayResponse {
    fn from(play: Play) -> Self {
        PlayResponse {
            id: play.id,
            show_id: play.show_id,
            track_id: play.track_id,
            created_at: play.created_at,
            external_post_id: play.external_post_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePlayRequest {
    pub track_id: i64,
}

/// Broadcast control marking a track as on air right now.
pub async fn create_play(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreatePlayRequest>,
) -> Result<Json<PlayResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    let play = plays::record(
        &state.pool,
        &state.scheduler,
        state.notifier.as_ref(),
        req.track_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(play.into()))
}

/// Undo a mistaken play marking; the announcement is taken down too.
pub async fn delete_play(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    plays::remove(&state.pool, state.notifier.as_ref(), id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn show_plays(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<Vec<PlayResponse>>> {
    let plays = plays::for_show(&state.pool, show_id).await?;
    Ok(Json(plays.into_iter().map(Into::into).collect()))
}
