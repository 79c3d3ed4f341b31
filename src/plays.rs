//! Plays: the record that a track actually went out over the air.

use chrono::{DateTime, TimeZone, Utc};

use crate::db::models::Play;
use crate::db::{is_unique_violation, DbPool};
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::shows::Scheduler;
use crate::tracks;

/// Record that `track_id` was broadcast at `at`. At most one play per track
/// per show. The announcement is fired after the commit; if it fails the
/// play still stands.
pub async fn record<Tz>(
    pool: &DbPool,
    sched: &Scheduler<Tz>,
    notifier: &dyn Notifier,
    track_id: i64,
    at: DateTime<Utc>,
) -> Result<Play>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    let track = tracks::by_id(pool, track_id)
        .await?
        .ok_or(Error::NotFound("track"))?;
    let show = sched.at(at).await?;

    let inserted = sqlx::query("INSERT INTO plays (show_id, track_id, created_at) VALUES (?, ?, ?)")
        .bind(show.id)
        .bind(track.id)
        .bind(at.timestamp())
        .execute(pool)
        .await;
    let play_id = match inserted {
        Ok(r) => r.last_insert_rowid(),
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::Validation(
                "track has already been played this show".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        "Play {} recorded: {} - {} (show {})",
        play_id,
        track.artist,
        track.title,
        show.id
    );

    match notifier
        .post(&format!("Now playing: {} - {}", track.artist, track.title))
        .await
    {
        Ok(post_id) => {
            sqlx::query("UPDATE plays SET external_post_id = ? WHERE id = ?")
                .bind(&post_id)
                .bind(play_id)
                .execute(pool)
                .await?;
        }
        Err(e) => {
            tracing::warn!("Announcement for play {} failed: {}", play_id, e);
        }
    }

    by_id(pool, play_id).await?.ok_or(Error::NotFound("play"))
}

/// Remove a mistakenly recorded play and take down its announcement. The
/// takedown is best-effort, like the announcement itself.
pub async fn remove(pool: &DbPool, notifier: &dyn Notifier, id: i64) -> Result<()> {
    let play = by_id(pool, id).await?.ok_or(Error::NotFound("play"))?;

    sqlx::query("DELETE FROM plays WHERE id = ?")
        .bind(play.id)
        .execute(pool)
        .await?;
    tracing::info!("Play {} removed (show {})", play.id, play.show_id);

    if let Some(post_id) = &play.external_post_id {
        if let Err(e) = notifier.delete(post_id).await {
            tracing::warn!("Takedown of announcement {} failed: {}", post_id, e);
        }
    }
    Ok(())
}

pub async fn by_id(pool: &DbPool, id: i64) -> Result<Option<Play>> {
    let play = sqlx::query_as::<_, Play>("SELECT * FROM plays WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(play)
}

/// Everything broadcast during one show, in air order.
pub async fn for_show(pool: &DbPool, show_id: i64) -> Result<Vec<Play>> {
    let plays = sqlx::query_as::<_, Play>(
        "SELECT * FROM plays WHERE show_id = ? ORDER BY created_at ASC",
    )
    .bind(show_id)
    .fetch_all(pool)
    .await?;
    Ok(plays)
}
