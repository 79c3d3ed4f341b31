use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::{Error, Result};

fn utc(secs: i64) -> DateTime<Utc> {
  DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
  pub id: i64,
  pub username: String,
  pub password_hash: String,
  pub is_admin: bool,
  pub abusive: bool,
  pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApiToken {
  pub id: i64,
  pub user_id: i64,
  pub token: String,
  pub label: Option<String>,
  pub created_at: i64,
  pub last_used_at: Option<i64>,
  pub revoked: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct RemoteAccount {
  pub id: i64,
  pub handle: String,
  pub display_name: Option<String>,
  pub abusive: bool,
}

/// One broadcast window. The request week it owns runs from the previous
/// show's end up to this show's end; only the [showtime, end_time) interval
/// is stored.
#[derive(Debug, Clone, FromRow)]
pub struct Show {
  pub id: i64,
  pub showtime: i64,
  pub end_time: i64,
  pub voting_allowed: bool,
  pub message: Option<String>,
}

impl Show {
  pub fn showtime_utc(&self) -> DateTime<Utc> {
    utc(self.showtime)
  }

  pub fn end_utc(&self) -> DateTime<Utc> {
    utc(self.end_time)
  }

  /// True while `t` is inside the broadcast itself.
  pub fn on_air(&self, t: DateTime<Utc>) -> bool {
    self.showtime_utc() <= t && t < self.end_utc()
  }

  pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
    now >= self.end_utc()
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct Track {
  pub id: i64,
  pub title: String,
  pub artist: String,
  pub album: Option<String>,
  pub duration: Option<i64>,
  pub added: i64,
  pub revealed: Option<i64>,
  pub hidden: bool,
  pub archived: bool,
  pub secondary_only: bool,
  pub metadata_locked: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Vote {
  pub id: i64,
  pub show_id: i64,
  pub created_at: i64,
  pub kind: String,
  pub user_id: Option<i64>,
  pub remote_account_id: Option<i64>,
  pub external_post_id: Option<String>,
  pub manual_name: Option<String>,
  pub manual_kind: Option<String>,
  pub comment: Option<String>,
  pub success: Option<f64>,
  pub weight: Option<i64>,
}

/// The channel a vote arrived through. Exactly one variant's fields are
/// populated on the row; anything else is a malformed row.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOrigin {
  Local { user_id: i64 },
  External { remote_account_id: i64, post_id: String },
  Manual { name: String, kind: String },
}

impl VoteOrigin {
  pub fn kind(&self) -> &'static str {
    match self {
      VoteOrigin::Local { .. } => "local",
      VoteOrigin::External { .. } => "external",
      VoteOrigin::Manual { .. } => "manual",
    }
  }
}

impl Vote {
  pub fn origin(&self) -> Result<VoteOrigin> {
    match self.kind.as_str() {
      "local" => match self.user_id {
        Some(user_id) => Ok(VoteOrigin::Local { user_id }),
        None => Err(malformed(self.id)),
      },
      "external" => match (self.remote_account_id, &self.external_post_id) {
        (Some(remote_account_id), Some(post_id)) => Ok(VoteOrigin::External {
          remote_account_id,
          post_id: post_id.clone(),
        }),
        _ => Err(malformed(self.id)),
      },
      "manual" => match (&self.manual_name, &self.manual_kind) {
        (Some(name), Some(kind)) => Ok(VoteOrigin::Manual {
          name: name.clone(),
          kind: kind.clone(),
        }),
        _ => Err(malformed(self.id)),
      },
      _ => Err(malformed(self.id)),
    }
  }
}

fn malformed(vote_id: i64) -> Error {
  Error::Consistency(format!("vote {} has a malformed origin variant", vote_id))
}

#[derive(Debug, Clone, FromRow)]
pub struct Play {
  pub id: i64,
  pub show_id: i64,
  pub track_id: i64,
  pub created_at: i64,
  pub external_post_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Block {
  pub id: i64,
  pub show_id: i64,
  pub track_id: i64,
  pub reason: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ShortlistEntry {
  pub id: i64,
  pub show_id: i64,
  pub track_id: i64,
  pub idx: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Discard {
  pub id: i64,
  pub show_id: i64,
  pub track_id: i64,
}
