use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::models::Show;
use crate::error::{Error, Result};
use crate::shows;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ShowResponse {
    pub id: i64,
    pub showtime: i64,
    pub end: i64,
    pub on_air: bool,
    pub voting_allowed: bool,
    pub message: Option<String>,
}

impl From<Show> for ShowResponse {
    fn from(show: Show) -> Self {
        ShowResponse {
            id: show.id,
            showtime: show.showtime,
            end: show.end_time,
            on_air: show.on_air(chrono::Utc::now()),
            voting_allowed: show.voting_allowed,
            message: show.message,
        }
    }
}

pub async fn current_show(State(state): State<AppState>) -> Result<Json<ShowResponse>> {
    let show = state.scheduler.current().await?;
    Ok(Json(show.into()))
}

#[derive(Debug, Deserialize)]
pub struct AtQuery {
    pub t: i64,
}

pub async fn show_at(
    State(state): State<AppState>,
    Query(query): Query<AtQuery>,
) -> Result<Json<ShowResponse>> {
    let t = DateTime::from_timestamp(query.t, 0)
        .ok_or_else(|| Error::Validation("invalid timestamp".to_string()))?;
    let show = state.scheduler.at(t).await?;
    Ok(Json(show.into()))
}

#[derive(Debug, Deserialize)]
pub struct ShowUpdate {
    pub voting_allowed: Option<bool>,
    pub message: Option<String>,
    pub showtime: Option<i64>,
    pub end: Option<i64>,
}

pub async fn update_show(
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ShowUpdate>,
) -> Result<Json<ShowResponse>> {
    let auth = AuthUser::from_headers(&state.pool, &headers).await?;
    auth.require_admin()?;

    match (req.showtime, req.end) {
        (Some(showtime), Some(end)) => {
            let showtime = DateTime::from_timestamp(showtime, 0)
                .ok_or_else(|| Error::Validation("invalid showtime".to_string()))?;
            let end = DateTime::from_timestamp(end, 0)
                .ok_or_else(|| Error::Validation("invalid end".to_string()))?;
            shows::reschedule(&state.pool, id, showtime, end).await?;
        }
        (None, None) => {}
        _ => {
            return Err(Error::Validation(
                "rescheduling needs both showtime and end".to_string(),
            ));
        }
    }

    // An empty message clears the banner.
    let message = req
        .message
        .map(|m| if m.is_empty() { None } else { Some(m) });
    let show = shows::set_details(&state.pool, id, req.voting_allowed, message).await?;
    Ok(Json(show.into()))
}
