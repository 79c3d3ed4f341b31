//! Weekly show windows: the cadence math that turns an instant into a
//! broadcast window, and the scheduler that lazily materializes show rows.

use chrono::{DateTime, Datelike, Days, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};

use crate::db::models::Show;
use crate::db::{is_unique_violation, DbPool};
use crate::error::{Error, Result};

/// Configured weekly broadcast cadence, in local wall-clock terms.
#[derive(Debug, Clone)]
pub struct Cadence {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub duration: Duration,
}

/// Nominal bounds of one broadcast, projected to absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub showtime: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The window enclosing `t` if `t` is mid-broadcast, otherwise the next
/// nominal window after `t`. Either way `t < end` holds on return.
///
/// Weekday/time arithmetic happens in the configured zone and is projected
/// back to absolute time, so windows stay aligned to local wall-clock times
/// across daylight-saving shifts.
pub fn upcoming_window<Tz: TimeZone>(cadence: &Cadence, tz: &Tz, t: DateTime<Utc>) -> Result<Window> {
    let local = t.with_timezone(tz);
    let days_back = (local.weekday().num_days_from_monday() + 7
        - cadence.weekday.num_days_from_monday())
        % 7;
    let mut date = local.date_naive() - Days::new(days_back as u64);

    loop {
        let start_naive = date.and_time(cadence.start);
        let showtime = resolve_local(tz, start_naive)?;
        let end = resolve_local(tz, start_naive + cadence.duration)?;
        if t < end {
            if end <= showtime {
                return Err(Error::Consistency(format!(
                    "window starting {} collapses to nothing ({} .. {})",
                    start_naive, showtime, end
                )));
            }
            return Ok(Window { showtime, end });
        }
        date = date + Days::new(7);
    }
}

/// Project a nominal local time onto an instant. Times skipped by a
/// spring-forward transition shift one hour later; ambiguous times during
/// fall-back resolve to the earlier instant.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    let resolved = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .ok_or_else(|| {
                Error::Consistency(format!("local time {} cannot be projected", naive))
            })?,
    };
    Ok(resolved.with_timezone(&Utc))
}

/// Resolves instants to shows, creating missing show rows on the way.
///
/// Show rows are append-only out of this type: every materialized window
/// lands strictly after the latest existing one, so coverage never develops
/// holes between the earliest show and the latest.
#[derive(Clone)]
pub struct Scheduler<Tz: TimeZone> {
    pool: DbPool,
    cadence: Cadence,
    tz: Tz,
}

impl<Tz> Scheduler<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    pub fn new(pool: DbPool, cadence: Cadence, tz: Tz) -> Self {
        Self { pool, cadence, tz }
    }

    pub async fn current(&self) -> Result<Show> {
        self.at(Utc::now()).await
    }

    /// The show whose week covers `t`: the earliest persisted show with
    /// `end > t`. Missing windows up to `t` are materialized, one week at a
    /// time. Losing a creation race against another writer is handled by
    /// retrying the lookup.
    pub async fn at(&self, t: DateTime<Utc>) -> Result<Show> {
        loop {
            if let Some(show) = self.first_ending_after(t.timestamp()).await? {
                return Ok(show);
            }

            let latest = self.latest().await?;
            let window = match &latest {
                None => upcoming_window(&self.cadence, &self.tz, t)?,
                Some(s) => upcoming_window(&self.cadence, &self.tz, s.end_utc())?,
            };
            if let Some(s) = &latest {
                // Each step must strictly advance or the walk would never
                // terminate for far-future instants.
                if window.end.timestamp() <= s.end_time {
                    return Err(Error::Consistency(format!(
                        "scheduler walk stuck: latest show {} ends {}, next window ends {}",
                        s.id,
                        s.end_time,
                        window.end.timestamp()
                    )));
                }
            }
            self.insert_window(&window).await?;
        }
    }

    /// The show immediately after `show`. With `create` unset this is a pure
    /// lookup and returns `None` when nothing is persisted yet.
    pub async fn next(&self, show: &Show, create: bool) -> Result<Option<Show>> {
        let found = self.first_ending_after(show.end_time).await?;
        if found.is_some() || !create {
            return Ok(found);
        }

        let window = upcoming_window(&self.cadence, &self.tz, show.end_utc())?;
        self.insert_window(&window).await?;
        match self.first_ending_after(show.end_time).await? {
            Some(next) => Ok(Some(next)),
            None => Err(Error::Consistency(format!(
                "materialized window after show {} but cannot find it",
                show.id
            ))),
        }
    }

    /// The persisted show preceding `show`, or `None` for the earliest.
    pub async fn prev(&self, show: &Show) -> Result<Option<Show>> {
        let found = sqlx::query_as::<_, Show>(
            "SELECT * FROM shows WHERE end_time < ? ORDER BY end_time DESC LIMIT 1",
        )
        .bind(show.end_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn first_ending_after(&self, ts: i64) -> Result<Option<Show>> {
        let found = sqlx::query_as::<_, Show>(
            "SELECT * FROM shows WHERE end_time > ? ORDER BY end_time ASC LIMIT 1",
        )
        .bind(ts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn latest(&self) -> Result<Option<Show>> {
        let found = sqlx::query_as::<_, Show>("SELECT * FROM shows ORDER BY end_time DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(found)
    }

    /// Persist a window, enforcing non-overlap inside the transaction.
    /// A racing writer committing the identical window first is not an
    /// error; any other overlap is a defect in the policy or its inputs.
    async fn insert_window(&self, window: &Window) -> Result<()> {
        let showtime = window.showtime.timestamp();
        let end_time = window.end.timestamp();

        let mut tx = self.pool.begin().await?;
        let overlapping = sqlx::query_as::<_, Show>(
            "SELECT * FROM shows WHERE showtime < ? AND end_time > ? LIMIT 1",
        )
        .bind(end_time)
        .bind(showtime)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = overlapping {
            if existing.showtime == showtime && existing.end_time == end_time {
                return Ok(());
            }
            return Err(Error::Consistency(format!(
                "show {} [{}, {}) overlaps new window [{}, {})",
                existing.id, existing.showtime, existing.end_time, showtime, end_time
            )));
        }

        let inserted = sqlx::query("INSERT INTO shows (showtime, end_time) VALUES (?, ?)")
            .bind(showtime)
            .bind(end_time)
            .execute(&mut *tx)
            .await;
        match inserted {
            Ok(_) => {
                tx.commit().await?;
                tracing::info!("Materialized show window [{}, {})", showtime, end_time);
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub async fn by_id(pool: &DbPool, id: i64) -> Result<Option<Show>> {
    let show = sqlx::query_as::<_, Show>("SELECT * FROM shows WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(show)
}

/// Staff move of a broadcast window (a special, a one-off late start).
/// Unlike scheduler materialization, an overlap here is the caller's
/// mistake, not a defect.
pub async fn reschedule(
    pool: &DbPool,
    id: i64,
    showtime: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Show> {
    if end <= showtime {
        return Err(Error::Validation(
            "a show must end after it starts".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    let clash = sqlx::query_as::<_, Show>(
        "SELECT * FROM shows WHERE id != ? AND showtime < ? AND end_time > ? LIMIT 1",
    )
    .bind(id)
    .bind(end.timestamp())
    .bind(showtime.timestamp())
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(clash) = clash {
        return Err(Error::Validation(format!(
            "new window would overlap show {}",
            clash.id
        )));
    }

    let updated = sqlx::query("UPDATE shows SET showtime = ?, end_time = ? WHERE id = ?")
        .bind(showtime.timestamp())
        .bind(end.timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await;
    match updated {
        Ok(r) if r.rows_affected() == 0 => return Err(Error::NotFound("show")),
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::Validation(
                "another show already starts at that instant".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit().await?;

    by_id(pool, id).await?.ok_or(Error::NotFound("show"))
}

/// Staff adjustment of a show's request-taking flag and banner message.
pub async fn set_details(
    pool: &DbPool,
    id: i64,
    voting_allowed: Option<bool>,
    message: Option<Option<String>>,
) -> Result<Show> {
    if let Some(allowed) = voting_allowed {
        sqlx::query("UPDATE shows SET voting_allowed = ? WHERE id = ?")
            .bind(allowed)
            .bind(id)
            .execute(pool)
            .await?;
    }
    if let Some(message) = message {
        sqlx::query("UPDATE shows SET message = ? WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(pool)
            .await?;
    }
    by_id(pool, id).await?.ok_or(Error::NotFound("show"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn cadence() -> Cadence {
        Cadence {
            weekday: Weekday::Sat,
            start: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            duration: Duration::minutes(120),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    async fn scheduler() -> Scheduler<Utc> {
        Scheduler::new(db::test_pool().await, cadence(), Utc)
    }

    async fn show_count(sched: &Scheduler<Utc>) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM shows")
            .fetch_one(&sched.pool)
            .await
            .unwrap()
            .0
    }

    #[test]
    fn window_from_midweek_is_upcoming_saturday() {
        // 2024-07-09 is a Tuesday; the next Saturday is 2024-07-13.
        let w = upcoming_window(&cadence(), &Utc, at(2024, 7, 9, 12, 0)).unwrap();
        assert_eq!(w.showtime, at(2024, 7, 13, 21, 0));
        assert_eq!(w.end, at(2024, 7, 13, 23, 0));
    }

    #[test]
    fn window_mid_broadcast_encloses_t() {
        let t = at(2024, 7, 13, 21, 30);
        let w = upcoming_window(&cadence(), &Utc, t).unwrap();
        assert!(w.showtime <= t && t < w.end);
        assert_eq!(w.showtime, at(2024, 7, 13, 21, 0));
    }

    #[test]
    fn window_at_end_boundary_rolls_to_next_week() {
        let w = upcoming_window(&cadence(), &Utc, at(2024, 7, 13, 23, 0)).unwrap();
        assert_eq!(w.showtime, at(2024, 7, 20, 21, 0));
    }

    #[test]
    fn window_is_monotonic() {
        let c = cadence();
        let mut prev_end = None;
        for hour in 0..(24 * 21) {
            let t = at(2024, 7, 1, 0, 0) + Duration::hours(hour);
            let w = upcoming_window(&c, &Utc, t).unwrap();
            if let Some(prev) = prev_end {
                assert!(w.end >= prev, "window regressed at {}", t);
            }
            prev_end = Some(w.end);
        }
    }

    #[tokio::test]
    async fn first_lookup_materializes_exactly_one_show() {
        let sched = scheduler().await;
        // Tuesday afternoon, no shows exist yet.
        let show = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();
        assert_eq!(show.showtime_utc(), at(2024, 7, 13, 21, 0));
        assert_eq!(show.end_utc(), at(2024, 7, 13, 23, 0));
        assert_eq!(show_count(&sched).await, 1);
    }

    #[tokio::test]
    async fn at_is_idempotent() {
        let sched = scheduler().await;
        let t = at(2024, 7, 9, 15, 0);
        let a = sched.at(t).await.unwrap();
        let b = sched.at(t).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(show_count(&sched).await, 1);
    }

    #[tokio::test]
    async fn at_walks_forward_creating_intervening_shows() {
        let sched = scheduler().await;
        let first = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();

        // Ten weeks ahead: every intervening week must get its own show.
        let far = at(2024, 7, 9, 15, 0) + Duration::weeks(10);
        let later = sched.at(far).await.unwrap();
        assert!(later.end_utc() > far);
        assert_eq!(show_count(&sched).await, 11);

        let all = sqlx::query_as::<_, Show>("SELECT * FROM shows ORDER BY showtime ASC")
            .fetch_all(&sched.pool)
            .await
            .unwrap();
        assert_eq!(all.first().unwrap().id, first.id);
        for pair in all.windows(2) {
            assert!(
                pair[0].end_time <= pair[1].showtime,
                "shows {} and {} overlap",
                pair[0].id,
                pair[1].id
            );
        }
    }

    #[tokio::test]
    async fn lookup_during_broadcast_returns_enclosing_show() {
        let sched = scheduler().await;
        let t = at(2024, 7, 13, 21, 45);
        let show = sched.at(t).await.unwrap();
        assert!(show.on_air(t));
    }

    #[tokio::test]
    async fn past_lookup_resolves_to_existing_show() {
        let sched = scheduler().await;
        let show = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();
        // Any instant in the preceding request week maps to the same show.
        let earlier = sched.at(at(2024, 7, 8, 3, 0)).await.unwrap();
        assert_eq!(show.id, earlier.id);
        assert_eq!(show_count(&sched).await, 1);
    }

    #[tokio::test]
    async fn next_without_create_is_pure_lookup() {
        let sched = scheduler().await;
        let show = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();
        assert!(sched.next(&show, false).await.unwrap().is_none());
        assert_eq!(show_count(&sched).await, 1);
    }

    #[tokio::test]
    async fn next_with_create_materializes_following_week() {
        let sched = scheduler().await;
        let show = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();
        let next = sched.next(&show, true).await.unwrap().unwrap();
        assert_eq!(next.showtime_utc(), at(2024, 7, 20, 21, 0));
        assert_eq!(show_count(&sched).await, 2);
    }

    #[tokio::test]
    async fn reschedule_moves_a_window_but_rejects_overlap() {
        let sched = scheduler().await;
        let first = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();
        let second = sched.next(&first, true).await.unwrap().unwrap();

        // Push the second show back a day.
        let moved = reschedule(
            &sched.pool,
            second.id,
            at(2024, 7, 21, 21, 0),
            at(2024, 7, 21, 23, 0),
        )
        .await
        .unwrap();
        assert_eq!(moved.showtime_utc(), at(2024, 7, 21, 21, 0));

        // Moving it on top of the first show is the caller's error.
        let err = reschedule(
            &sched.pool,
            second.id,
            at(2024, 7, 13, 22, 0),
            at(2024, 7, 14, 0, 0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = reschedule(
            &sched.pool,
            second.id,
            at(2024, 7, 21, 23, 0),
            at(2024, 7, 21, 21, 0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn prev_walks_backward_and_stops_at_earliest() {
        let sched = scheduler().await;
        let first = sched.at(at(2024, 7, 9, 15, 0)).await.unwrap();
        let second = sched.next(&first, true).await.unwrap().unwrap();

        let back = sched.prev(&second).await.unwrap().unwrap();
        assert_eq!(back.id, first.id);
        assert!(sched.prev(&first).await.unwrap().is_none());
    }
}
