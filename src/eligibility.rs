//! Whether a track may be requested for a given show, and why not.

use std::fmt;

use sqlx::SqliteConnection;

use crate::db::models::{Block, Show, Track};
use crate::error::Result;

/// Reasons a request is rejected, in the order they are checked. The order
/// is load-bearing: a hidden track that is also blocked reports "hidden",
/// a played track that is also blocked reports the play.
#[derive(Debug, Clone, PartialEq)]
pub enum Ineligibility {
    OffAirCategory,
    Hidden,
    Archived,
    VotingClosed,
    PlayedThisWeek,
    PlayedLastWeek,
    Blocked(String),
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::OffAirCategory => write!(f, "only played on the secondary feed"),
            Ineligibility::Hidden => write!(f, "hidden"),
            Ineligibility::Archived => write!(f, "archived"),
            Ineligibility::VotingClosed => write!(f, "no requests are being taken this week"),
            Ineligibility::PlayedThisWeek => write!(f, "already played this week"),
            Ineligibility::PlayedLastWeek => write!(f, "played last week"),
            Ineligibility::Blocked(reason) => write!(f, "{}", reason),
        }
    }
}

/// First matching reason the track cannot be requested for `show`, or `None`
/// when the request is acceptable.
///
/// Callers accepting a vote must run this inside the same transaction as the
/// insert; plays and blocks can land concurrently with incoming requests, so
/// the answer is never cached.
pub async fn ineligibility_reason(
    conn: &mut SqliteConnection,
    track: &Track,
    show: &Show,
    prev_show: Option<&Show>,
) -> Result<Option<Ineligibility>> {
    if track.secondary_only {
        return Ok(Some(Ineligibility::OffAirCategory));
    }
    if track.hidden {
        return Ok(Some(Ineligibility::Hidden));
    }
    if track.archived {
        return Ok(Some(Ineligibility::Archived));
    }
    if !show.voting_allowed {
        return Ok(Some(Ineligibility::VotingClosed));
    }
    if play_exists(conn, show.id, track.id).await? {
        return Ok(Some(Ineligibility::PlayedThisWeek));
    }
    if let Some(prev) = prev_show {
        if play_exists(conn, prev.id, track.id).await? {
            return Ok(Some(Ineligibility::PlayedLastWeek));
        }
    }
    let block =
        sqlx::query_as::<_, Block>("SELECT * FROM blocks WHERE show_id = ? AND track_id = ?")
            .bind(show.id)
            .bind(track.id)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some(block) = block {
        return Ok(Some(Ineligibility::Blocked(block.reason)));
    }

    Ok(None)
}

async fn play_exists(conn: &mut SqliteConnection, show_id: i64, track_id: i64) -> Result<bool> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM plays WHERE show_id = ? AND track_id = ?")
        .bind(show_id)
        .bind(track_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Staff block of a track for one show, with the reason shown to requesters.
pub async fn block(pool: &crate::db::DbPool, show_id: i64, track_id: i64, reason: &str) -> Result<()> {
    let inserted = sqlx::query("INSERT INTO blocks (show_id, track_id, reason) VALUES (?, ?, ?)")
        .bind(show_id)
        .bind(track_id)
        .bind(reason)
        .execute(pool)
        .await;
    match inserted {
        Ok(_) => Ok(()),
        Err(e) if crate::db::is_unique_violation(&e) => Err(crate::error::Error::Validation(
            "track is already blocked for this show".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DbPool};
    use crate::shows::{Cadence, Scheduler};
    use crate::tracks::{self, NewTrack};
    use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc, Weekday};

    fn cadence() -> Cadence {
        Cadence {
            weekday: Weekday::Sat,
            start: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            duration: Duration::minutes(120),
        }
    }

    fn tuesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 9, 15, 0, 0).unwrap()
    }

    async fn setup() -> (DbPool, Scheduler<Utc>, Show, Track) {
        let pool = db::test_pool().await;
        let sched = Scheduler::new(pool.clone(), cadence(), Utc);
        let show = sched.at(tuesday()).await.unwrap();
        let track = tracks::import(
            &pool,
            NewTrack {
                title: "Cruel Angel's Thesis".to_string(),
                artist: "Yoko Takahashi".to_string(),
                album: None,
                duration: Some(245),
                secondary_only: false,
            },
            tuesday(),
        )
        .await
        .unwrap();
        let track = tracks::reveal(&pool, track.id, tuesday()).await.unwrap();
        (pool, sched, show, track)
    }

    async fn insert_play(pool: &DbPool, show_id: i64, track_id: i64) {
        sqlx::query("INSERT INTO plays (show_id, track_id, created_at) VALUES (?, ?, 0)")
            .bind(show_id)
            .bind(track_id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn reason(
        pool: &DbPool,
        track: &Track,
        show: &Show,
        prev: Option<&Show>,
    ) -> Option<Ineligibility> {
        let mut conn = pool.acquire().await.unwrap();
        ineligibility_reason(&mut conn, track, show, prev)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn revealed_track_is_eligible() {
        let (pool, _sched, show, track) = setup().await;
        assert_eq!(reason(&pool, &track, &show, None).await, None);
    }

    #[tokio::test]
    async fn hidden_wins_over_block() {
        let (pool, _sched, show, track) = setup().await;
        block(&pool, show.id, track.id, "saving it for a special").await.unwrap();
        let track = tracks::hide(&pool, track.id).await.unwrap();
        assert_eq!(
            reason(&pool, &track, &show, None).await,
            Some(Ineligibility::Hidden)
        );
    }

    #[tokio::test]
    async fn archived_track_is_rejected_even_when_blocked() {
        let (pool, _sched, show, track) = setup().await;
        block(&pool, show.id, track.id, "saving it for a special").await.unwrap();
        let track = tracks::archive(&pool, track.id).await.unwrap();
        assert_eq!(
            reason(&pool, &track, &show, None).await,
            Some(Ineligibility::Archived)
        );
    }

    #[tokio::test]
    async fn play_wins_over_block() {
        let (pool, _sched, show, track) = setup().await;
        block(&pool, show.id, track.id, "saving it for a special").await.unwrap();
        insert_play(&pool, show.id, track.id).await;
        assert_eq!(
            reason(&pool, &track, &show, None).await,
            Some(Ineligibility::PlayedThisWeek)
        );
    }

    #[tokio::test]
    async fn block_reason_is_reported_verbatim() {
        let (pool, _sched, show, track) = setup().await;
        block(&pool, show.id, track.id, "artist request").await.unwrap();
        assert_eq!(
            reason(&pool, &track, &show, None).await,
            Some(Ineligibility::Blocked("artist request".to_string()))
        );
    }

    #[tokio::test]
    async fn voting_closed_week_rejects_requests() {
        let (pool, _sched, show, track) = setup().await;
        let show = crate::shows::set_details(&pool, show.id, Some(false), None)
            .await
            .unwrap();
        assert_eq!(
            reason(&pool, &track, &show, None).await,
            Some(Ineligibility::VotingClosed)
        );
    }

    #[tokio::test]
    async fn play_in_previous_show_blocks_this_week() {
        let (pool, sched, show, track) = setup().await;
        let next = sched.next(&show, true).await.unwrap().unwrap();
        insert_play(&pool, show.id, track.id).await;
        assert_eq!(
            reason(&pool, &track, &next, Some(&show)).await,
            Some(Ineligibility::PlayedLastWeek)
        );
    }

    #[tokio::test]
    async fn secondary_feed_track_is_rejected_first() {
        let (pool, _sched, show, _) = setup().await;
        let track = tracks::import(
            &pool,
            NewTrack {
                title: "B-side".to_string(),
                artist: "Someone".to_string(),
                album: None,
                duration: None,
                secondary_only: true,
            },
            tuesday(),
        )
        .await
        .unwrap();
        // Still hidden too: the category check comes first.
        assert_eq!(
            reason(&pool, &track, &show, None).await,
            Some(Ineligibility::OffAirCategory)
        );
    }
}
