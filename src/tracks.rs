//! Track library: import and visibility lifecycle.

use chrono::{DateTime, Utc};

use crate::db::models::Track;
use crate::db::DbPool;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<i64>,
    pub secondary_only: bool,
}

/// Library import. Tracks arrive hidden and get revealed explicitly.
pub async fn import(pool: &DbPool, new: NewTrack, now: DateTime<Utc>) -> Result<Track> {
    let id = sqlx::query(
        "INSERT INTO tracks (title, artist, album, duration, added, hidden, secondary_only)
         VALUES (?, ?, ?, ?, ?, 1, ?)",
    )
    .bind(&new.title)
    .bind(&new.artist)
    .bind(&new.album)
    .bind(new.duration)
    .bind(now.timestamp())
    .bind(new.secondary_only)
    .execute(pool)
    .await?
    .last_insert_rowid();

    tracing::info!("Imported track {}: {} - {}", id, new.artist, new.title);
    by_id(pool, id).await?.ok_or(Error::NotFound("track"))
}

pub async fn by_id(pool: &DbPool, id: i64) -> Result<Option<Track>> {
    let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(track)
}

/// Make a track publicly requestable. The first reveal stamps `revealed`;
/// un-hiding later leaves the original instant in place.
pub async fn reveal(pool: &DbPool, id: i64, now: DateTime<Utc>) -> Result<Track> {
    let track = by_id(pool, id).await?.ok_or(Error::NotFound("track"))?;
    sqlx::query("UPDATE tracks SET hidden = 0, revealed = COALESCE(revealed, ?) WHERE id = ?")
        .bind(now.timestamp())
        .bind(track.id)
        .execute(pool)
        .await?;
    by_id(pool, id).await?.ok_or(Error::NotFound("track"))
}

pub async fn hide(pool: &DbPool, id: i64) -> Result<Track> {
    let track = by_id(pool, id).await?.ok_or(Error::NotFound("track"))?;
    if track.archived {
        return Err(Error::Validation(
            "archived tracks cannot be hidden".to_string(),
        ));
    }
    sqlx::query("UPDATE tracks SET hidden = 1 WHERE id = ?")
        .bind(track.id)
        .execute(pool)
        .await?;
    by_id(pool, id).await?.ok_or(Error::NotFound("track"))
}

/// Retire a track from rotation while keeping its history. Clears `hidden`
/// in the same write; a track is never both hidden and archived.
pub async fn archive(pool: &DbPool, id: i64) -> Result<Track> {
    let track = by_id(pool, id).await?.ok_or(Error::NotFound("track"))?;
    sqlx::query("UPDATE tracks SET archived = 1, hidden = 0 WHERE id = ?")
        .bind(track.id)
        .execute(pool)
        .await?;
    by_id(pool, id).await?.ok_or(Error::NotFound("track"))
}

#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<Option<String>>,
    pub duration: Option<Option<i64>>,
}

pub async fn update_metadata(pool: &DbPool, id: i64, update: MetadataUpdate) -> Result<Track> {
    let track = by_id(pool, id).await?.ok_or(Error::NotFound("track"))?;
    if track.metadata_locked {
        return Err(Error::Validation(
            "track metadata is locked".to_string(),
        ));
    }

    sqlx::query(
        "UPDATE tracks SET title = ?, artist = ?, album = ?, duration = ? WHERE id = ?",
    )
    .bind(update.title.unwrap_or(track.title))
    .bind(update.artist.unwrap_or(track.artist))
    .bind(update.album.unwrap_or(track.album))
    .bind(update.duration.unwrap_or(track.duration))
    .bind(id)
    .execute(pool)
    .await?;
    by_id(pool, id).await?.ok_or(Error::NotFound("track"))
}

pub async fn set_metadata_locked(pool: &DbPool, id: i64, locked: bool) -> Result<Track> {
    sqlx::query("UPDATE tracks SET metadata_locked = ? WHERE id = ?")
        .bind(locked)
        .bind(id)
        .execute(pool)
        .await?;
    by_id(pool, id).await?.ok_or(Error::NotFound("track"))
}
