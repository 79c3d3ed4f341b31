//! Per-show curation: the ordered shortlist and the discard pile.
//!
//! Shortlist indices within a show are dense: every mutation leaves the
//! surviving entries numbered exactly 0..n-1. Index moves happen through a
//! disjoint negative range first so the (show, idx) uniqueness constraint
//! never trips mid-transaction.

use sqlx::SqliteConnection;

use crate::db::models::{Discard, ShortlistEntry};
use crate::db::{is_unique_violation, DbPool};
use crate::error::{Error, Result};

/// Shortlist a track for a show, appending after a repack of the existing
/// entries. Rejected if the track is already shortlisted or discarded.
pub async fn shortlist(pool: &DbPool, show_id: i64, track_id: i64) -> Result<ShortlistEntry> {
    let mut tx = pool.begin().await?;

    ensure_uncurated(&mut tx, show_id, track_id).await?;
    let count = repack(&mut tx, show_id).await?;

    let id = sqlx::query("INSERT INTO shortlist (show_id, track_id, idx) VALUES (?, ?, ?)")
        .bind(show_id)
        .bind(track_id)
        .bind(count)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    tx.commit().await?;

    let entry = sqlx::query_as::<_, ShortlistEntry>("SELECT * FROM shortlist WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    tracing::info!(
        "Shortlisted track {} for show {} at index {}",
        entry.track_id,
        entry.show_id,
        entry.idx
    );
    Ok(entry)
}

/// Discard a track for a show. Same duplicate rule as `shortlist`.
pub async fn discard(pool: &DbPool, show_id: i64, track_id: i64) -> Result<Discard> {
    let mut tx = pool.begin().await?;

    ensure_uncurated(&mut tx, show_id, track_id).await?;
    let id = sqlx::query("INSERT INTO discards (show_id, track_id) VALUES (?, ?)")
        .bind(show_id)
        .bind(track_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    tx.commit().await?;

    let row = sqlx::query_as::<_, Discard>("SELECT * FROM discards WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    tracing::info!("Discarded track {} for show {}", row.track_id, row.show_id);
    Ok(row)
}

/// Reassign shortlist indices to match `ordered_track_ids`. Entries not
/// mentioned keep their index; if a kept index would collide with a
/// reassigned one the reorder is rejected rather than half-applied.
pub async fn reorder(pool: &DbPool, show_id: i64, ordered_track_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;

    let mut entry_ids = Vec::with_capacity(ordered_track_ids.len());
    for track_id in ordered_track_ids {
        let entry = sqlx::query_as::<_, (i64,)>(
            "SELECT id FROM shortlist WHERE show_id = ? AND track_id = ?",
        )
        .bind(show_id)
        .bind(track_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            Error::Validation(format!("track {} is not shortlisted for this show", track_id))
        })?;
        entry_ids.push(entry.0);
    }

    for (pos, entry_id) in entry_ids.iter().enumerate() {
        sqlx::query("UPDATE shortlist SET idx = ? WHERE id = ?")
            .bind(-(pos as i64) - 1)
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
    }
    for (pos, entry_id) in entry_ids.iter().enumerate() {
        let updated = sqlx::query("UPDATE shortlist SET idx = ? WHERE id = ?")
            .bind(pos as i64)
            .bind(entry_id)
            .execute(&mut *tx)
            .await;
        if let Err(e) = updated {
            if is_unique_violation(&e) {
                return Err(Error::Validation(
                    "reorder collides with entries not included in the new order".to_string(),
                ));
            }
            return Err(e.into());
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Remove any shortlist or discard entry for the pair. Idempotent; the
/// remaining shortlist is repacked so indices stay dense.
pub async fn reset(pool: &DbPool, show_id: i64, track_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM shortlist WHERE show_id = ? AND track_id = ?")
        .bind(show_id)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM discards WHERE show_id = ? AND track_id = ?")
        .bind(show_id)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;
    repack(&mut tx, show_id).await?;

    tx.commit().await?;
    Ok(())
}

/// A curated row joined with its track, for staff display.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CuratedTrack {
    pub track_id: i64,
    pub title: String,
    pub artist: String,
    pub idx: Option<i64>,
}

/// The displayed shortlist: ordered entries whose track has not yet been
/// played this show. Played entries keep their row but drop out of view.
pub async fn shortlist_for(pool: &DbPool, show_id: i64) -> Result<Vec<CuratedTrack>> {
    let rows = sqlx::query_as::<_, CuratedTrack>(
        "SELECT t.id AS track_id, t.title, t.artist, sl.idx
         FROM shortlist sl
         JOIN tracks t ON t.id = sl.track_id
         WHERE sl.show_id = ?
           AND NOT EXISTS (SELECT 1 FROM plays p
                           WHERE p.show_id = sl.show_id AND p.track_id = sl.track_id)
         ORDER BY sl.idx ASC",
    )
    .bind(show_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn discards_for(pool: &DbPool, show_id: i64) -> Result<Vec<CuratedTrack>> {
    let rows = sqlx::query_as::<_, CuratedTrack>(
        "SELECT t.id AS track_id, t.title, t.artist, NULL AS idx
         FROM discards d
         JOIN tracks t ON t.id = d.track_id
         WHERE d.show_id = ?
           AND NOT EXISTS (SELECT 1 FROM plays p
                           WHERE p.show_id = d.show_id AND p.track_id = d.track_id)
         ORDER BY t.artist, t.title",
    )
    .bind(show_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn ensure_uncurated(tx: &mut SqliteConnection, show_id: i64, track_id: i64) -> Result<()> {
    let shortlisted = sqlx::query_as::<_, (i64,)>(
        "SELECT 1 FROM shortlist WHERE show_id = ? AND track_id = ?",
    )
    .bind(show_id)
    .bind(track_id)
    .fetch_optional(&mut *tx)
    .await?;
    let discarded =
        sqlx::query_as::<_, (i64,)>("SELECT 1 FROM discards WHERE show_id = ? AND track_id = ?")
            .bind(show_id)
            .bind(track_id)
            .fetch_optional(&mut *tx)
            .await?;
    if shortlisted.is_some() || discarded.is_some() {
        return Err(Error::Validation(
            "track is already shortlisted or discarded for this show".to_string(),
        ));
    }
    Ok(())
}

/// Renumber a show's surviving entries to 0..n-1 in their current order,
/// passing through a negative range to dodge the uniqueness constraint.
async fn repack(tx: &mut SqliteConnection, show_id: i64) -> Result<i64> {
    let rows = sqlx::query_as::<_, (i64,)>(
        "SELECT id FROM shortlist WHERE show_id = ? ORDER BY idx ASC",
    )
    .bind(show_id)
    .fetch_all(&mut *tx)
    .await?;

    for (pos, (id,)) in rows.iter().enumerate() {
        sqlx::query("UPDATE shortlist SET idx = ? WHERE id = ?")
            .bind(-(pos as i64) - 1)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    for (pos, (id,)) in rows.iter().enumerate() {
        sqlx::query("UPDATE shortlist SET idx = ? WHERE id = ?")
            .bind(pos as i64)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    Ok(rows.len() as i64)
}
