use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::models::{Vote, VoteOrigin};
use crate::error::{Error, Result};
use crate::shows;
use crate::votes::{ensure_remote_account, NewVote};
use crate::AppState;

use super::tracks::TrackResponse;

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub id: i64,
    pub show_id: i64,
    pub created_at: i64,
    pub kind: String,
    pub comment: Option<String>,
    pub tracks: Vec<TrackResponse>,
}

async fn vote_response(state: &AppState, vote: Vote) -> Result<VoteResponse> {
    let tracks = state.ledger.tracks_for_vote(vote.id).await?;
    Ok(VoteResponse {
        id: vote.id,
        show_id: vote.show_id,
        created_at: vote.created_at,
        kind: vote.kind,
        comment: vote.comment,
        tracks: tracks.into_iter().map(Into::into).collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub track_ids: Vec<i64>,
    pub comment: Option<String>,
}

/// A listener's own request, bound to whichever show covers "now".
pub async fn create_request(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<VoteResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;

    let vote = state
        .ledger
        .record(
            &state.scheduler,
            NewVote {
                origin: VoteOrigin::Local { user_id: auth.id },
                track_ids: req.track_ids,
                comment: req.comment,
                at: Utc::now(),
            },
        )
        .await?
        .ok_or_else(|| Error::Consistency("local vote reported as duplicate".to_string()))?;
    tracing::info!("Request from {}: vote {}", auth.username, vote.id);
    Ok(Json(vote_response(&state, vote).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExternalVoteRequest {
    pub handle: String,
    pub display_name: Option<String>,
    pub post_id: String,
    pub track_ids: Vec<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExternalVoteResponse {
    /// False when the post id was already recorded (edit or re-delivery).
    pub recorded: bool,
    pub vote: Option<VoteResponse>,
}

/// Ingest of a qualifying mention from the external platform.
pub async fn external_vote(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ExternalVoteRequest>,
) -> Result<Json<ExternalVoteResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    let account =
        ensure_remote_account(&state.pool, &req.handle, req.display_name.as_deref()).await?;
    let vote = state
        .ledger
        .record(
            &state.scheduler,
            NewVote {
                origin: VoteOrigin::External {
                    remote_account_id: account.id,
                    post_id: req.post_id,
                },
                track_ids: req.track_ids,
                comment: req.comment,
                at: Utc::now(),
            },
        )
        .await?;
    let vote = match vote {
        Some(vote) => Some(vote_response(&state, vote).await?),
        None => None,
    };
    Ok(Json(ExternalVoteResponse {
        recorded: vote.is_some(),
        vote,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ManualVoteRequest {
    pub name: String,
    pub kind: String,
    pub track_ids: Vec<i64>,
    pub comment: Option<String>,
}

/// Staff entry for requests that arrived off-platform (text, email, ...).
pub async fn manual_vote(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ManualVoteRequest>,
) -> Result<Json<VoteResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    if req.name.trim().is_empty() || req.kind.trim().is_empty() {
        return Err(Error::Validation(
            "manual votes need a name and a kind".to_string(),
        ));
    }

    let vote = state
        .ledger
        .record(
            &state.scheduler,
            NewVote {
                origin: VoteOrigin::Manual {
                    name: req.name,
                    kind: req.kind,
                },
                track_ids: req.track_ids,
                comment: req.comment,
                at: Utc::now(),
            },
        )
        .await?
        .ok_or_else(|| Error::Consistency("manual vote reported as duplicate".to_string()))?;
    Ok(Json(vote_response(&state, vote).await?))
}

/// Requested tracks for a show, most recently requested first.
pub async fn show_requests(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<Vec<TrackResponse>>> {
    let show = shows::by_id(&state.pool, show_id)
        .await?
        .ok_or(Error::NotFound("show"))?;
    let tracks = state.ledger.tracks_by_recency(&show, Utc::now()).await?;
    Ok(Json(tracks.into_iter().map(Into::into).collect()))
}
