use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::shortlist;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CuratedTrackResponse {
    pub track_id: i64,
    pub title: String,
    pub artist: String,
    pub idx: Option<i64>,
}

impl From<shortlist::CuratedTrack> for CuratedTrackResponse {
    fn from(row: shortlist::CuratedTrack) -> Self {
        CuratedTrackResponse {
            track_id: row.track_id,
            title: row.title,
            artist: row.artist,
            idx: row.idx,
        }
    }
}

pub async fn show_shortlist(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<Vec<CuratedTrackResponse>>> {
    let rows = shortlist::shortlist_for(&state.pool, show_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn show_discards(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<Vec<CuratedTrackResponse>>> {
    let rows = shortlist::discards_for(&state.pool, show_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CurateTrackRequest {
    pub track_id: i64,
}

pub async fn shortlist_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<CurateTrackRequest>,
) -> Result<Json<Vec<CuratedTrackResponse>>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    shortlist::shortlist(&state.pool, show_id, req.track_id).await?;
    show_shortlist(State(state), Path(show_id)).await
}

pub async fn discard_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<CurateTrackRequest>,
) -> Result<Json<Vec<CuratedTrackResponse>>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    shortlist::discard(&state.pool, show_id, req.track_id).await?;
    show_discards(State(state), Path(show_id)).await
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub track_ids: Vec<i64>,
}

pub async fn reorder_shortlist(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<CuratedTrackResponse>>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    shortlist::reorder(&state.pool, show_id, &req.track_ids).await?;
    show_shortlist(State(state), Path(show_id)).await
}

pub async fn reset_curation(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<CurateTrackRequest>,
) -> Result<Json<Vec<CuratedTrackResponse>>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    shortlist::reset(&state.pool, show_id, req.track_id).await?;
    show_shortlist(State(state), Path(show_id)).await
}
