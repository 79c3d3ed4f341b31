use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::models::Track;
use crate::eligibility;
use crate::error::{Error, Result};
use crate::tracks::{self, MetadataUpdate, NewTrack};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<i64>,
    pub added: i64,
    pub revealed: Option<i64>,
    pub hidden: bool,
    pub archived: bool,
}

impl From<Track> for TrackResponse {
    fn from(track: Track) -> Self {
        TrackResponse {
            id: track.id,
            title: track.title,
            artist: track.artist,
            album: track.album,
            duration: track.duration,
            added: track.added,
            revealed: track.revealed,
            hidden: track.hidden,
            archived: track.archived,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTrackRequest {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<i64>,
    #[serde(default)]
    pub secondary_only: bool,
}

pub async fn create_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreateTrackRequest>,
) -> Result<Json<TrackResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    if req.title.trim().is_empty() || req.artist.trim().is_empty() {
        return Err(Error::Validation(
            "title and artist are required".to_string(),
        ));
    }

    let track = tracks::import(
        &state.pool,
        NewTrack {
            title: req.title,
            artist: req.artist,
            album: req.album,
            duration: req.duration,
            secondary_only: req.secondary_only,
        },
        Utc::now(),
    )
    .await?;
    Ok(Json(track.into()))
}

pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrackResponse>> {
    let track = tracks::by_id(&state.pool, id)
        .await?
        .ok_or(Error::NotFound("track"))?;
    Ok(Json(track.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrackRequest {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<i64>,
    pub metadata_locked: Option<bool>,
}

pub async fn update_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTrackRequest>,
) -> Result<Json<TrackResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    let mut track = tracks::update_metadata(
        &state.pool,
        id,
        MetadataUpdate {
            title: req.title,
            artist: req.artist,
            // An empty album string clears the field.
            album: req.album.map(|a| if a.is_empty() { None } else { Some(a) }),
            duration: req.duration.map(Some),
        },
    )
    .await?;
    if let Some(locked) = req.metadata_locked {
        track = tracks::set_metadata_locked(&state.pool, id, locked).await?;
    }
    Ok(Json(track.into()))
}

pub async fn reveal_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrackResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;
    let track = tracks::reveal(&state.pool, id, Utc::now()).await?;
    Ok(Json(track.into()))
}

pub async fn hide_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrackResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;
    let track = tracks::hide(&state.pool, id).await?;
    Ok(Json(track.into()))
}

pub async fn archive_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrackResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;
    let track = tracks::archive(&state.pool, id).await?;
    Ok(Json(track.into()))
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
    pub reason: Option<String>,
}

pub async fn track_eligibility(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EligibilityResponse>> {
    let track = tracks::by_id(&state.pool, id)
        .await?
        .ok_or(Error::NotFound("track"))?;
    let show = state.scheduler.current().await?;
    let prev = state.scheduler.prev(&show).await?;

    let mut conn = state.pool.acquire().await?;
    let reason = eligibility::ineligibility_reason(&mut conn, &track, &show, prev.as_ref()).await?;
    Ok(Json(EligibilityResponse {
        eligible: reason.is_none(),
        reason: reason.map(|r| r.to_string()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BlockTrackRequest {
    pub reason: String,
}

/// Block the track for the current show with a reason shown to requesters.
pub async fn block_track(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<BlockTrackRequest>,
) -> Result<Json<EligibilityResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    if req.reason.trim().is_empty() {
        return Err(Error::Validation("a block needs a reason".to_string()));
    }

    let track = tracks::by_id(&state.pool, id)
        .await?
        .ok_or(Error::NotFound("track"))?;
    let show = state.scheduler.current().await?;
    eligibility::block(&state.pool, show.id, track.id, &req.reason).await?;
    Ok(Json(EligibilityResponse {
        eligible: false,
        reason: Some(req.reason),
    }))
}
