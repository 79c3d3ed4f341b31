use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::votes::{self, VoterRef};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub window: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BattingAverageResponse {
    /// Absent when there is too little scored weight to mean anything.
    pub average: Option<f64>,
}

pub async fn batting_average(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<BattingAverageResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    let voter = VoterRef::User(auth.id);
    let now = Utc::now();

    let average = match query.window.as_deref() {
        None | Some("recent") => state.ledger.recent_batting_average(voter, now).await?,
        Some("alltime") => state.ledger.all_time_batting_average(voter, now).await?,
        Some(other) => {
            return Err(Error::Validation(format!(
                "unknown window '{}', expected 'recent' or 'alltime'",
                other
            )));
        }
    };
    Ok(Json(BattingAverageResponse { average }))
}

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub streak: u32,
}

pub async fn streak(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<StreakResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    let streak = state
        .ledger
        .streak(&state.scheduler, VoterRef::User(auth.id), Utc::now())
        .await?;
    Ok(Json(StreakResponse { streak }))
}

#[derive(Debug, Serialize)]
pub struct VoterStatsResponse {
    pub handle: String,
    pub streak: u32,
    pub recent_average: Option<f64>,
    pub all_time_average: Option<f64>,
}

/// Public stats for a remote (external-platform) requester.
pub async fn remote_stats(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<VoterStatsResponse>> {
    let account = votes::remote_account_by_handle(&state.pool, &handle)
        .await?
        .ok_or(Error::NotFound("remote account"))?;
    let voter = VoterRef::Remote(account.id);
    let now = Utc::now();

    Ok(Json(VoterStatsResponse {
        handle: account.handle,
        streak: state.ledger.streak(&state.scheduler, voter, now).await?,
        recent_average: state.ledger.recent_batting_average(voter, now).await?,
        all_time_average: state.ledger.all_time_batting_average(voter, now).await?,
    }))
}
