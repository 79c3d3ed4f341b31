//! The vote ledger: request recording, per-show aggregation, and voter
//! scoring (success, batting average, streak).

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::cache::TtlCache;
use crate::db::models::{RemoteAccount, Show, Track, Vote, VoteOrigin};
use crate::db::{is_unique_violation, DbPool};
use crate::eligibility;
use crate::error::{Error, Result};
use crate::shows::Scheduler;

/// Trailing window for the "recent" batting average.
const RECENT_WINDOW_DAYS: i64 = 183;

/// Under this much summed weight an average is "too little data", not zero.
const MIN_BATTING_WEIGHT: i64 = 4;

/// How long the current show's request list may be served from cache.
const RECENCY_TTL: StdDuration = StdDuration::from_secs(30);

/// Ended shows are immutable in practice; the long TTL only bounds memory.
const ENDED_RECENCY_TTL: StdDuration = StdDuration::from_secs(3600);

/// A scoreable identity: local account or remote (external-platform) account.
/// Manual votes carry neither and never enter scoring queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterRef {
    User(i64),
    Remote(i64),
}

impl VoterRef {
    fn column(&self) -> &'static str {
        match self {
            VoterRef::User(_) => "user_id",
            VoterRef::Remote(_) => "remote_account_id",
        }
    }

    fn id(&self) -> i64 {
        match self {
            VoterRef::User(id) | VoterRef::Remote(id) => *id,
        }
    }
}

fn voter_ref(origin: &VoteOrigin) -> Option<VoterRef> {
    match origin {
        VoteOrigin::Local { user_id } => Some(VoterRef::User(*user_id)),
        VoteOrigin::External {
            remote_account_id, ..
        } => Some(VoterRef::Remote(*remote_account_id)),
        VoteOrigin::Manual { .. } => None,
    }
}

#[derive(Debug, Clone)]
pub struct NewVote {
    pub origin: VoteOrigin,
    pub track_ids: Vec<i64>,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteScore {
    pub success: f64,
    pub weight: i64,
}

pub struct Ledger {
    pool: DbPool,
    recency: TtlCache<i64, Vec<Track>>,
}

impl Ledger {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            recency: TtlCache::new(),
        }
    }

    /// Record a request. The vote binds to the show whose week contains its
    /// timestamp; eligibility is re-checked inside the insert transaction.
    ///
    /// Returns `Ok(None)` when an external post was already recorded (edits
    /// and re-deliveries are no-ops, not duplicates).
    pub async fn record<Tz>(&self, sched: &Scheduler<Tz>, new: NewVote) -> Result<Option<Vote>>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        if new.track_ids.is_empty() {
            return Err(Error::Validation(
                "a request must name at least one track".to_string(),
            ));
        }

        let show = sched.at(new.at).await?;
        let prev = sched.prev(&show).await?;

        let mut tx = self.pool.begin().await?;

        if let VoteOrigin::External { post_id, .. } = &new.origin {
            let existing =
                sqlx::query_as::<_, (i64,)>("SELECT id FROM votes WHERE external_post_id = ?")
                    .bind(post_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if existing.is_some() {
                return Ok(None);
            }
        }

        // Drop tracks this voter already requested this week; repeats are
        // not an offence, they just don't count twice.
        let mut track_ids = dedupe(&new.track_ids);
        if let Some(voter) = voter_ref(&new.origin) {
            let already = sqlx::query_as::<_, (i64,)>(&format!(
                "SELECT vt.track_id FROM vote_tracks vt
                 JOIN votes v ON v.id = vt.vote_id
                 WHERE v.show_id = ? AND v.{} = ?",
                voter.column()
            ))
            .bind(show.id)
            .bind(voter.id())
            .fetch_all(&mut *tx)
            .await?;
            let already: HashSet<i64> = already.into_iter().map(|(id,)| id).collect();
            track_ids.retain(|id| !already.contains(id));
        }
        if track_ids.is_empty() {
            return Err(Error::Validation(
                "every track on this request was already requested this week".to_string(),
            ));
        }

        for track_id in &track_ids {
            let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
                .bind(track_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(Error::NotFound("track"))?;
            if let Some(reason) =
                eligibility::ineligibility_reason(&mut tx, &track, &show, prev.as_ref()).await?
            {
                return Err(Error::Validation(format!(
                    "{} - {}: {}",
                    track.artist, track.title, reason
                )));
            }
        }

        let (user_id, remote_account_id, external_post_id, manual_name, manual_kind) =
            match &new.origin {
                VoteOrigin::Local { user_id } => (Some(*user_id), None, None, None, None),
                VoteOrigin::External {
                    remote_account_id,
                    post_id,
                } => (None, Some(*remote_account_id), Some(post_id.clone()), None, None),
                VoteOrigin::Manual { name, kind } => {
                    (None, None, None, Some(name.clone()), Some(kind.clone()))
                }
            };

        let inserted = sqlx::query(
            "INSERT INTO votes (show_id, created_at, kind, user_id, remote_account_id,
                                external_post_id, manual_name, manual_kind, comment)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(show.id)
        .bind(new.at.timestamp())
        .bind(new.origin.kind())
        .bind(user_id)
        .bind(remote_account_id)
        .bind(&external_post_id)
        .bind(&manual_name)
        .bind(&manual_kind)
        .bind(&new.comment)
        .execute(&mut *tx)
        .await;

        let vote_id = match inserted {
            Ok(r) => r.last_insert_rowid(),
            // A concurrent delivery of the same external post won the race.
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        for track_id in &track_ids {
            sqlx::query("INSERT INTO vote_tracks (vote_id, track_id) VALUES (?, ?)")
                .bind(vote_id)
                .bind(track_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.recency.invalidate(&show.id);

        tracing::info!(
            "Recorded {} vote {} for show {} ({} track(s))",
            new.origin.kind(),
            vote_id,
            show.id,
            track_ids.len()
        );
        self.vote_by_id(vote_id).await?.map(Some).ok_or_else(|| {
            Error::Consistency(format!("vote {} vanished after insert", vote_id))
        })
    }

    pub async fn vote_by_id(&self, id: i64) -> Result<Option<Vote>> {
        let vote = sqlx::query_as::<_, Vote>("SELECT * FROM votes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(vote)
    }

    pub async fn tracks_for_vote(&self, vote_id: i64) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as::<_, Track>(
            "SELECT t.* FROM tracks t
             JOIN vote_tracks vt ON vt.track_id = t.id
             WHERE vt.vote_id = ?",
        )
        .bind(vote_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tracks)
    }

    /// Tracks requested this show, most recently requested first, one entry
    /// per track. Votes from abusive accounts are stored but never shown.
    pub async fn tracks_by_recency(&self, show: &Show, now: DateTime<Utc>) -> Result<Vec<Track>> {
        let ttl = if show.has_ended(now) {
            ENDED_RECENCY_TTL
        } else {
            RECENCY_TTL
        };
        if let Some(hit) = self.recency.get(&show.id, ttl) {
            return Ok(hit);
        }

        let tracks = sqlx::query_as::<_, Track>(
            "SELECT t.* FROM tracks t
             JOIN vote_tracks vt ON vt.track_id = t.id
             JOIN votes v ON v.id = vt.vote_id
             LEFT JOIN users u ON u.id = v.user_id
             LEFT JOIN remote_accounts r ON r.id = v.remote_account_id
             WHERE v.show_id = ?
               AND COALESCE(u.abusive, 0) = 0
               AND COALESCE(r.abusive, 0) = 0
             GROUP BY t.id
             ORDER BY MAX(v.created_at) DESC",
        )
        .bind(show.id)
        .fetch_all(&self.pool)
        .await?;

        self.recency.insert(show.id, tracks.clone());
        Ok(tracks)
    }

    /// A vote's success fraction and weight. `None` while the owning show is
    /// still open. The first computation is persisted on the vote row and
    /// later plays never change it.
    pub async fn score(&self, vote_id: i64, now: DateTime<Utc>) -> Result<Option<VoteScore>> {
        let vote = self
            .vote_by_id(vote_id)
            .await?
            .ok_or(Error::NotFound("vote"))?;
        if let (Some(success), Some(weight)) = (vote.success, vote.weight) {
            return Ok(Some(VoteScore { success, weight }));
        }

        let show = crate::shows::by_id(&self.pool, vote.show_id)
            .await?
            .ok_or_else(|| {
                Error::Consistency(format!("vote {} references missing show {}", vote.id, vote.show_id))
            })?;
        if !show.has_ended(now) {
            return Ok(None);
        }

        let (weight,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM vote_tracks WHERE vote_id = ?",
        )
        .bind(vote.id)
        .fetch_one(&self.pool)
        .await?;
        if weight == 0 {
            return Err(Error::Consistency(format!("vote {} has no tracks", vote.id)));
        }

        let (played,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM vote_tracks vt
             JOIN plays p ON p.track_id = vt.track_id AND p.show_id = ?
             WHERE vt.vote_id = ?",
        )
        .bind(vote.show_id)
        .bind(vote.id)
        .fetch_one(&self.pool)
        .await?;

        let success = played as f64 / weight as f64;

        // First writer wins; a racing computation already stored the same
        // inputs' result.
        sqlx::query("UPDATE votes SET success = ?, weight = ? WHERE id = ? AND success IS NULL")
            .bind(success)
            .bind(weight)
            .bind(vote.id)
            .execute(&self.pool)
            .await?;

        let committed = self
            .vote_by_id(vote.id)
            .await?
            .ok_or(Error::NotFound("vote"))?;
        match (committed.success, committed.weight) {
            (Some(success), Some(weight)) => Ok(Some(VoteScore { success, weight })),
            _ => Err(Error::Consistency(format!(
                "vote {} score did not persist",
                vote.id
            ))),
        }
    }

    /// Weighted success ratio over the voter's scored votes in a window.
    /// `None` means "too little data", which is distinct from an average of
    /// zero.
    async fn batting_average(
        &self,
        voter: VoterRef,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let mut sql = format!(
            "SELECT v.id FROM votes v
             JOIN shows s ON s.id = v.show_id
             WHERE v.{} = ? AND s.end_time <= ?",
            voter.column()
        );
        if since.is_some() {
            sql.push_str(" AND v.created_at >= ?");
        }

        let mut query = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(voter.id())
            .bind(now.timestamp());
        if let Some(since) = since {
            query = query.bind(since.timestamp());
        }
        let vote_ids = query.fetch_all(&self.pool).await?;

        let mut weighted_sum = 0.0;
        let mut total_weight = 0i64;
        for (vote_id,) in vote_ids {
            if let Some(score) = self.score(vote_id, now).await? {
                weighted_sum += score.success * score.weight as f64;
                total_weight += score.weight;
            }
        }

        if total_weight < MIN_BATTING_WEIGHT {
            return Ok(None);
        }
        Ok(Some(weighted_sum / total_weight as f64))
    }

    pub async fn recent_batting_average(
        &self,
        voter: VoterRef,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        self.batting_average(voter, Some(now - Duration::days(RECENT_WINDOW_DAYS)), now)
            .await
    }

    pub async fn all_time_batting_average(
        &self,
        voter: VoterRef,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        self.batting_average(voter, None, now).await
    }

    /// Consecutive voted shows, walking backward from the show before the
    /// current one. Weeks with requests closed are skipped, not broken on.
    pub async fn streak<Tz>(
        &self,
        sched: &Scheduler<Tz>,
        voter: VoterRef,
        now: DateTime<Utc>,
    ) -> Result<u32>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let current = sched.at(now).await?;
        let mut cursor = sched.prev(&current).await?;
        let mut streak = 0;
        while let Some(show) = cursor {
            if show.voting_allowed {
                if !self.has_vote(voter, show.id).await? {
                    break;
                }
                streak += 1;
            }
            cursor = sched.prev(&show).await?;
        }
        Ok(streak)
    }

    async fn has_vote(&self, voter: VoterRef, show_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(&format!(
            "SELECT 1 FROM votes WHERE show_id = ? AND {} = ? LIMIT 1",
            voter.column()
        ))
        .bind(show_id)
        .bind(voter.id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

fn dedupe(track_ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    track_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Find or create the row for a remote (external-platform) account.
pub async fn ensure_remote_account(
    pool: &DbPool,
    handle: &str,
    display_name: Option<&str>,
) -> Result<RemoteAccount> {
    sqlx::query("INSERT OR IGNORE INTO remote_accounts (handle, display_name) VALUES (?, ?)")
        .bind(handle)
        .bind(display_name)
        .execute(pool)
        .await?;
    if let Some(display_name) = display_name {
        sqlx::query("UPDATE remote_accounts SET display_name = ? WHERE handle = ?")
            .bind(display_name)
            .bind(handle)
            .execute(pool)
            .await?;
    }
    let account =
        sqlx::query_as::<_, RemoteAccount>("SELECT * FROM remote_accounts WHERE handle = ?")
            .bind(handle)
            .fetch_one(pool)
            .await?;
    tracing::debug!("Remote account {} is id {}", account.handle, account.id);
    Ok(account)
}

/// Look up a remote account without creating it.
pub async fn remote_account_by_handle(
    pool: &DbPool,
    handle: &str,
) -> Result<Option<RemoteAccount>> {
    let account =
        sqlx::query_as::<_, RemoteAccount>("SELECT * FROM remote_accounts WHERE handle = ?")
            .bind(handle)
            .fetch_optional(pool)
            .await?;
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::shows::Cadence;
    use crate::tracks::{self, NewTrack};
    use chrono::{NaiveTime, Weekday};

    fn cadence() -> Cadence {
        Cadence {
            weekday: Weekday::Sat,
            start: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            duration: Duration::minutes(120),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    // Tuesday in the week of the 2024-07-13 show.
    fn tuesday() -> DateTime<Utc> {
        at(2024, 7, 9, 15)
    }

    struct Fixture {
        pool: DbPool,
        sched: Scheduler<Utc>,
        ledger: Ledger,
    }

    async fn fixture() -> Fixture {
        let pool = db::test_pool().await;
        Fixture {
            sched: Scheduler::new(pool.clone(), cadence(), Utc),
            ledger: Ledger::new(pool.clone()),
            pool,
        }
    }

    impl Fixture {
        async fn track(&self, title: &str) -> Track {
            let track = tracks::import(
                &self.pool,
                NewTrack {
                    title: title.to_string(),
                    artist: "Artist".to_string(),
                    album: None,
                    duration: Some(240),
                    secondary_only: false,
                },
                tuesday(),
            )
            .await
            .unwrap();
            tracks::reveal(&self.pool, track.id, tuesday()).await.unwrap()
        }

        async fn user(&self, name: &str) -> i64 {
            sqlx::query(
                "INSERT INTO users (username, password_hash, created_at) VALUES (?, 'x', 0)",
            )
            .bind(name)
            .execute(&self.pool)
            .await
            .unwrap()
            .last_insert_rowid()
        }

        async fn play(&self, show_id: i64, track_id: i64) {
            sqlx::query("INSERT INTO plays (show_id, track_id, created_at) VALUES (?, ?, 0)")
                .bind(show_id)
                .bind(track_id)
                .execute(&self.pool)
                .await
                .unwrap();
        }

        async fn local_vote(&self, user_id: i64, track_ids: Vec<i64>, at: DateTime<Utc>) -> Vote {
            self.ledger
                .record(
                    &self.sched,
                    NewVote {
                        origin: VoteOrigin::Local { user_id },
                        track_ids,
                        comment: None,
                        at,
                    },
                )
                .await
                .unwrap()
                .unwrap()
        }
    }

    #[tokio::test]
    async fn vote_binds_to_show_covering_its_timestamp() {
        let f = fixture().await;
        let track = f.track("Opening").await;
        let user = f.user("ayako").await;

        let vote = f.local_vote(user, vec![track.id], tuesday()).await;
        let show = f.sched.at(tuesday()).await.unwrap();
        assert_eq!(vote.show_id, show.id);
        assert_eq!(vote.origin().unwrap(), VoteOrigin::Local { user_id: user });
    }

    #[tokio::test]
    async fn repeat_request_for_same_track_is_dropped() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let user = f.user("ayako").await;

        f.local_vote(user, vec![a.id], tuesday()).await;
        let second = f
            .local_vote(user, vec![a.id, b.id], tuesday() + Duration::hours(1))
            .await;

        let tracks = f.ledger.tracks_for_vote(second.id).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, b.id);
    }

    #[tokio::test]
    async fn fully_repeated_request_is_rejected() {
        let f = fixture().await;
        let a = f.track("A").await;
        let user = f.user("ayako").await;

        f.local_vote(user, vec![a.id], tuesday()).await;
        let err = f
            .ledger
            .record(
                &f.sched,
                NewVote {
                    origin: VoteOrigin::Local { user_id: user },
                    track_ids: vec![a.id],
                    comment: None,
                    at: tuesday() + Duration::hours(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_external_post_is_a_noop() {
        let f = fixture().await;
        let a = f.track("A").await;
        let account = ensure_remote_account(&f.pool, "listener", None).await.unwrap();

        let new = |track_ids: Vec<i64>| NewVote {
            origin: VoteOrigin::External {
                remote_account_id: account.id,
                post_id: "post-1".to_string(),
            },
            track_ids,
            comment: Some("please!".to_string()),
            at: tuesday(),
        };

        let first = f.ledger.record(&f.sched, new(vec![a.id])).await.unwrap();
        assert!(first.is_some());
        let second = f.ledger.record(&f.sched, new(vec![a.id])).await.unwrap();
        assert!(second.is_none());

        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM votes")
            .fetch_one(&f.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn ineligible_track_rejects_the_vote() {
        let f = fixture().await;
        let a = f.track("A").await;
        let user = f.user("ayako").await;
        tracks::hide(&f.pool, a.id).await.unwrap();

        let err = f
            .ledger
            .record(
                &f.sched,
                NewVote {
                    origin: VoteOrigin::Local { user_id: user },
                    track_ids: vec![a.id],
                    comment: None,
                    at: tuesday(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m.contains("hidden")));
    }

    #[tokio::test]
    async fn recency_lists_each_track_once_newest_first() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let ayako = f.user("ayako").await;
        let beryl = f.user("beryl").await;

        f.local_vote(ayako, vec![a.id], tuesday()).await;
        f.local_vote(beryl, vec![b.id], tuesday() + Duration::hours(1)).await;
        // A again, later, from another voter: A moves to the front but
        // appears once.
        f.local_vote(beryl, vec![a.id], tuesday() + Duration::hours(2)).await;

        let show = f.sched.at(tuesday()).await.unwrap();
        let listed = f.ledger.tracks_by_recency(&show, tuesday()).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn abusive_accounts_are_excluded_from_recency() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let ayako = f.user("ayako").await;
        let troll = f.user("troll").await;
        sqlx::query("UPDATE users SET abusive = 1 WHERE id = ?")
            .bind(troll)
            .execute(&f.pool)
            .await
            .unwrap();

        f.local_vote(ayako, vec![a.id], tuesday()).await;
        f.local_vote(troll, vec![b.id], tuesday() + Duration::hours(1)).await;

        let show = f.sched.at(tuesday()).await.unwrap();
        let listed = f.ledger.tracks_by_recency(&show, tuesday()).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id]);
    }

    #[tokio::test]
    async fn two_track_vote_with_one_play_scores_half() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let user = f.user("ayako").await;

        let vote = f.local_vote(user, vec![a.id, b.id], tuesday()).await;
        let show = f.sched.at(tuesday()).await.unwrap();
        f.play(show.id, a.id).await;

        // Not computable while the show is open.
        let open = f.ledger.score(vote.id, tuesday()).await.unwrap();
        assert!(open.is_none());

        let after = show.end_utc() + Duration::minutes(5);
        let score = f.ledger.score(vote.id, after).await.unwrap().unwrap();
        assert_eq!(score.weight, 2);
        assert!((score.success - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn score_is_stable_once_computed() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let user = f.user("ayako").await;

        let vote = f.local_vote(user, vec![a.id, b.id], tuesday()).await;
        let show = f.sched.at(tuesday()).await.unwrap();
        f.play(show.id, a.id).await;

        let after = show.end_utc() + Duration::minutes(5);
        let first = f.ledger.score(vote.id, after).await.unwrap().unwrap();

        // A play recorded after scoring must not move the cached value.
        f.play(show.id, b.id).await;
        let second = f.ledger.score(vote.id, after).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn batting_average_weights_by_track_count() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let c = f.track("C").await;
        let d = f.track("D").await;
        let e = f.track("E").await;
        let user = f.user("ayako").await;

        // One vote for two tracks (one played), one for three (one played).
        f.local_vote(user, vec![a.id, b.id], tuesday()).await;
        f.local_vote(user, vec![c.id, d.id, e.id], tuesday()).await;
        let show = f.sched.at(tuesday()).await.unwrap();
        f.play(show.id, a.id).await;
        f.play(show.id, c.id).await;

        let after = show.end_utc() + Duration::minutes(5);
        let average = f
            .ledger
            .recent_batting_average(VoterRef::User(user), after)
            .await
            .unwrap()
            .unwrap();
        // (0.5 * 2 + (1/3) * 3) / 5
        assert!((average - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn batting_average_needs_enough_weight() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let user = f.user("ayako").await;

        f.local_vote(user, vec![a.id, b.id], tuesday()).await;
        let show = f.sched.at(tuesday()).await.unwrap();
        f.play(show.id, a.id).await;

        let after = show.end_utc() + Duration::minutes(5);
        let average = f
            .ledger
            .recent_batting_average(VoterRef::User(user), after)
            .await
            .unwrap();
        // Summed weight 2 is under the threshold: no average, not zero.
        assert_eq!(average, None);
    }

    #[tokio::test]
    async fn old_votes_only_count_all_time() {
        let f = fixture().await;
        let a = f.track("A").await;
        let b = f.track("B").await;
        let c = f.track("C").await;
        let d = f.track("D").await;
        let user = f.user("ayako").await;

        // January vote, both tracks played.
        let january = at(2024, 1, 2, 15);
        f.local_vote(user, vec![a.id, b.id], january).await;
        let old_show = f.sched.at(january).await.unwrap();
        f.play(old_show.id, a.id).await;
        f.play(old_show.id, b.id).await;

        // July vote, nothing played.
        f.local_vote(user, vec![c.id, d.id], tuesday()).await;
        let show = f.sched.at(tuesday()).await.unwrap();

        let after = show.end_utc() + Duration::minutes(5);
        let all_time = f
            .ledger
            .all_time_batting_average(VoterRef::User(user), after)
            .await
            .unwrap()
            .unwrap();
        assert!((all_time - 0.5).abs() < 1e-9);

        // The January vote is outside the trailing window, leaving too
        // little weight for a recent average.
        let recent = f
            .ledger
            .recent_batting_average(VoterRef::User(user), after)
            .await
            .unwrap();
        assert_eq!(recent, None);
    }

    #[tokio::test]
    async fn streak_counts_back_and_skips_closed_weeks() {
        let f = fixture().await;
        let a = f.track("A").await;
        let user = f.user("ayako").await;

        let s1 = f.sched.at(tuesday()).await.unwrap();
        let s2 = f.sched.next(&s1, true).await.unwrap().unwrap();
        let s3 = f.sched.next(&s2, true).await.unwrap().unwrap();
        crate::shows::set_details(&f.pool, s2.id, Some(false), None)
            .await
            .unwrap();

        // Votes in weeks one and three; week two takes no requests.
        f.local_vote(user, vec![a.id], tuesday()).await;
        f.local_vote(user, vec![a.id], s2.end_utc() + Duration::hours(1)).await;

        // "Now" falls in the week after show three.
        let now = s3.end_utc() + Duration::hours(1);
        let streak = f
            .ledger
            .streak(&f.sched, VoterRef::User(user), now)
            .await
            .unwrap();
        assert_eq!(streak, 2);
    }

    #[tokio::test]
    async fn missed_week_breaks_the_streak() {
        let f = fixture().await;
        let a = f.track("A").await;
        let user = f.user("ayako").await;

        let s1 = f.sched.at(tuesday()).await.unwrap();
        let s2 = f.sched.next(&s1, true).await.unwrap().unwrap();
        let s3 = f.sched.next(&s2, true).await.unwrap().unwrap();

        // Voted in weeks one and three but not two.
        f.local_vote(user, vec![a.id], tuesday()).await;
        f.local_vote(user, vec![a.id], s2.end_utc() + Duration::hours(1)).await;

        let now = s3.end_utc() + Duration::hours(1);
        let streak = f
            .ledger
            .streak(&f.sched, VoterRef::User(user), now)
            .await
            .unwrap();
        assert_eq!(streak, 1);
    }
}
