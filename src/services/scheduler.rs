//! Process-wide job scheduler.
//!
//! A single control loop triggers the ingestion job on a fixed interval and
//! the daily summary / CSV export jobs at fixed local times of day. Due times
//! are kept in UTC, so interval jobs are unaffected by local clock changes;
//! only daily jobs consult the local time zone.
//!
//! Execution model:
//! - Jobs run one at a time, to completion, on the scheduler task.
//! - A job is never re-entered. Its next due time is computed after it
//!   finishes, and any occurrences that passed while it ran are counted as
//!   skipped and dropped, never queued.
//! - No cancellation: a slow job delays everything behind it until it
//!   returns. Remote calls are bounded by the HTTP client timeout.
//! - State is in-memory (`Arc<RwLock<SchedulerState>>`) and exposed by the
//!   status endpoint.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::{AppConfig, TemperatureThresholds};
use crate::errors::AppError;
use crate::services::export::export_weather_csv;
use crate::services::ingest::{run_ingestion, IngestSettings};
use crate::services::summary::update_daily_summary;
use crate::services::wttr::WttrClient;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Shortest pause between scheduler wake-ups (milliseconds).
const SCHEDULER_MIN_SLEEP_MS: u64 = 250;

/// Longest pause between scheduler wake-ups (seconds).
const SCHEDULER_MAX_SLEEP_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// When a job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed interval, measured in UTC.
    Every(Duration),
    /// Once a day at a local wall-clock time.
    DailyAt(NaiveTime),
}

impl Schedule {
    pub fn every(interval: std::time::Duration) -> Result<Self, AppError> {
        let interval = Duration::from_std(interval)
            .map_err(|e| AppError::Config(format!("Interval out of range: {}", e)))?;
        if interval <= Duration::zero() {
            return Err(AppError::Config("Interval must be positive".to_string()));
        }
        Ok(Schedule::Every(interval))
    }

    /// The first occurrence strictly after `after`, with daily times read in `tz`.
    pub fn following<Tz: TimeZone>(&self, after: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
        match *self {
            Schedule::Every(interval) => after + interval,
            Schedule::DailyAt(time) => {
                let local_date = after.with_timezone(tz).date_naive();
                let today = local_occurrence(local_date, time, tz);
                if today > after {
                    today
                } else {
                    local_occurrence(local_date + Duration::days(1), time, tz)
                }
            }
        }
    }

    /// First due time for a scheduler starting at `start`. Interval jobs run
    /// immediately; daily jobs wait for their next occurrence.
    pub fn first_due<Tz: TimeZone>(&self, start: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
        match self {
            Schedule::Every(_) => start,
            Schedule::DailyAt(_) => self.following(start, tz),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Schedule::Every(interval) => format!("every {}s", interval.num_seconds()),
            Schedule::DailyAt(time) => format!("daily at {}", time.format("%H:%M")),
        }
    }
}

/// `date` at wall-clock `time` in `tz`. An ambiguous time takes the earlier
/// instant; a time skipped by a forward clock change runs an hour later.
fn local_occurrence<Tz: TimeZone>(date: NaiveDate, time: NaiveTime, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Advance from `last_due` to the first occurrence after `now`.
///
/// Returns that occurrence and how many occurrences were passed over because
/// the job was still running.
pub fn next_due<Tz: TimeZone>(
    schedule: &Schedule,
    last_due: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: &Tz,
) -> (DateTime<Utc>, u64) {
    let mut next = schedule.following(last_due, tz);
    let mut skipped = 0;
    while next <= now {
        skipped += 1;
        next = schedule.following(next, tz);
    }
    (next, skipped)
}

// ---------------------------------------------------------------------------
// Scheduler state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ingest,
    DailySummary,
    Export,
}

/// Status of one scheduled job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobStatus {
    pub job: JobKind,
    /// Human-readable schedule, e.g. "every 60s" or "daily at 15:54"
    pub schedule: String,
    /// Next due time
    pub next_run_at: DateTime<Utc>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    /// "pending", "ok: ..." or "error: ..."
    pub last_result: String,
    pub runs: u64,
    /// Occurrences dropped because the job was still running
    pub skipped_triggers: u64,
}

/// Global scheduler state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerState {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobStatus>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            active: false,
            started_at: None,
            jobs: Vec::new(),
        }
    }
}

/// Shared scheduler state handle.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// A job plus its schedule bookkeeping.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub kind: JobKind,
    pub schedule: Schedule,
    pub status: JobStatus,
}

impl ScheduledJob {
    pub fn new<Tz: TimeZone>(kind: JobKind, schedule: Schedule, start: DateTime<Utc>, tz: &Tz) -> Self {
        Self {
            kind,
            schedule,
            status: JobStatus {
                job: kind,
                schedule: schedule.describe(),
                next_run_at: schedule.first_due(start, tz),
                last_started_at: None,
                last_duration_ms: None,
                last_result: "pending".to_string(),
                runs: 0,
                skipped_triggers: 0,
            },
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.next_run_at <= now
    }
}

/// The standard job set: ingestion on an interval, summary and export daily
/// at local times.
pub fn default_jobs(config: &AppConfig, start: DateTime<Utc>) -> Result<Vec<ScheduledJob>, AppError> {
    Ok(vec![
        ScheduledJob::new(
            JobKind::Ingest,
            Schedule::every(config.ingest_interval())?,
            start,
            &Local,
        ),
        ScheduledJob::new(
            JobKind::DailySummary,
            Schedule::DailyAt(config.summary_time()?),
            start,
            &Local,
        ),
        ScheduledJob::new(
            JobKind::Export,
            Schedule::DailyAt(config.export_time()?),
            start,
            &Local,
        ),
    ])
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

/// Everything the scheduled jobs need.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub pool: SqlitePool,
    pub client: WttrClient,
    pub ingest: IngestSettings,
    pub thresholds: TemperatureThresholds,
    pub output_folder: PathBuf,
}

impl JobContext {
    pub fn from_config(pool: SqlitePool, client: WttrClient, config: &AppConfig) -> Self {
        Self {
            pool,
            client,
            ingest: IngestSettings {
                cities: config.cities.clone(),
                range: config.temp_range(),
                warm_threshold: config.temperature_thresholds.warm,
            },
            thresholds: config.temperature_thresholds,
            output_folder: PathBuf::from(&config.output_folder),
        }
    }

    /// Run one job to completion and describe the result.
    pub async fn run(&self, kind: JobKind) -> Result<String, AppError> {
        match kind {
            JobKind::Ingest => {
                let report = run_ingestion(&self.pool, &self.client, &self.ingest).await?;
                Ok(format!(
                    "{} stored, {} below threshold, {} skipped, {} failed",
                    report.stored(),
                    report.below_threshold(),
                    report.skipped(),
                    report.failed()
                ))
            }
            JobKind::DailySummary => {
                let groups = update_daily_summary(&self.pool, &self.thresholds).await?;
                Ok(format!("{} city-day groups", groups))
            }
            JobKind::Export => {
                let path = export_weather_csv(
                    &self.pool,
                    &self.output_folder,
                    &self.thresholds,
                    Local::now().date_naive(),
                )
                .await?;
                Ok(format!("exported {}", path.display()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main scheduler loop
// ---------------------------------------------------------------------------

/// Run the scheduler. This function never returns (runs until process exit).
///
/// Should be spawned via `tokio::spawn(run_scheduler(...))`.
pub async fn run_scheduler(ctx: JobContext, mut jobs: Vec<ScheduledJob>, state: SharedSchedulerState) {
    tracing::info!("Scheduler started with {} jobs", jobs.len());
    {
        let mut s = state.write().await;
        s.active = true;
        s.started_at = Some(Utc::now());
    }
    publish(&state, &jobs).await;

    loop {
        run_pending(&ctx, &mut jobs, &state).await;
        let pause = sleep_duration(&jobs, Utc::now());
        tokio::time::sleep(pause).await;
    }
}

/// Run every job that is due now, in order. Returns how many ran.
///
/// The shared state is refreshed with every job's status after each run.
pub async fn run_pending(
    ctx: &JobContext,
    jobs: &mut [ScheduledJob],
    state: &SharedSchedulerState,
) -> usize {
    let mut ran = 0;

    for i in 0..jobs.len() {
        let job = &mut jobs[i];
        if !job.is_due(Utc::now()) {
            continue;
        }

        tracing::debug!("Scheduler: running {:?}", job.kind);
        let started_at = Utc::now();
        let timer = std::time::Instant::now();
        let result = ctx.run(job.kind).await;
        let duration_ms = timer.elapsed().as_millis() as u64;

        let (next, skipped) = next_due(&job.schedule, job.status.next_run_at, Utc::now(), &Local);
        if skipped > 0 {
            tracing::warn!(
                "Scheduler: {:?} overran its schedule, dropping {} missed trigger(s)",
                job.kind,
                skipped
            );
        }

        job.status.last_result = match result {
            Ok(summary) => {
                tracing::info!("Scheduler: {:?} finished in {}ms: {}", job.kind, duration_ms, summary);
                format!("ok: {}", summary)
            }
            Err(e) => {
                tracing::error!("Scheduler: {:?} failed after {}ms: {}", job.kind, duration_ms, e);
                format!("error: {}", e)
            }
        };
        job.status.next_run_at = next;
        job.status.last_started_at = Some(started_at);
        job.status.last_duration_ms = Some(duration_ms);
        job.status.runs += 1;
        job.status.skipped_triggers += skipped;
        ran += 1;

        publish(state, jobs).await;
    }

    ran
}

/// Copy job statuses into the shared state, replacing entries for the same job.
async fn publish(state: &SharedSchedulerState, jobs: &[ScheduledJob]) {
    let mut s = state.write().await;
    for job in jobs {
        match s.jobs.iter_mut().find(|status| status.job == job.kind) {
            Some(existing) => *existing = job.status.clone(),
            None => s.jobs.push(job.status.clone()),
        }
    }
}

/// Time until the earliest due job, clamped to the scheduler's sleep bounds.
fn sleep_duration(jobs: &[ScheduledJob], now: DateTime<Utc>) -> std::time::Duration {
    let min = std::time::Duration::from_millis(SCHEDULER_MIN_SLEEP_MS);
    let max = std::time::Duration::from_secs(SCHEDULER_MAX_SLEEP_SECS);

    jobs.iter()
        .map(|job| job.status.next_run_at)
        .min()
        .map(|earliest| (earliest - now).to_std().unwrap_or(min))
        .unwrap_or(max)
        .clamp(min, max)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::services::validator::TempRange;
    use chrono::FixedOffset;

    fn at(s: &str) -> DateTime<Utc> {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    fn daily(h: u32, m: u32) -> Schedule {
        Schedule::DailyAt(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn every_minute() -> Schedule {
        Schedule::every(std::time::Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_every_following() {
        assert_eq!(
            every_minute().following(at("2026-10-19 10:00:00"), &Utc),
            at("2026-10-19 10:01:00")
        );
    }

    #[test]
    fn test_every_ignores_local_offset() {
        // Interval arithmetic is done on UTC instants, so the zone used for
        // daily times has no effect (a local clock change cannot stall it).
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let minus_five = FixedOffset::west_opt(5 * 3600).unwrap();
        let after = at("2026-10-25 00:59:30");
        assert_eq!(every_minute().following(after, &plus_two), at("2026-10-25 01:00:30"));
        assert_eq!(every_minute().following(after, &minus_five), at("2026-10-25 01:00:30"));
    }

    #[test]
    fn test_every_rejects_zero() {
        assert!(Schedule::every(std::time::Duration::ZERO).is_err());
    }

    #[test]
    fn test_daily_following_same_day() {
        assert_eq!(
            daily(15, 54).following(at("2026-10-19 09:00:00"), &Utc),
            at("2026-10-19 15:54:00")
        );
    }

    #[test]
    fn test_daily_following_next_day() {
        assert_eq!(
            daily(15, 54).following(at("2026-10-19 15:54:00"), &Utc),
            at("2026-10-20 15:54:00"),
            "An occurrence exactly at `after` is not strictly after it"
        );
        assert_eq!(
            daily(15, 54).following(at("2026-10-19 23:00:00"), &Utc),
            at("2026-10-20 15:54:00")
        );
    }

    #[test]
    fn test_daily_uses_local_wall_clock() {
        // 15:54 at UTC+2 is 13:54 UTC.
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            daily(15, 54).following(at("2026-10-19 09:00:00"), &plus_two),
            at("2026-10-19 13:54:00")
        );
        // 23:30 UTC is already the 20th locally, so the next run is the 20th.
        assert_eq!(
            daily(15, 54).following(at("2026-10-19 23:30:00"), &plus_two),
            at("2026-10-20 13:54:00")
        );
    }

    #[test]
    fn test_first_due() {
        let start = at("2026-10-19 12:00:00");
        assert_eq!(every_minute().first_due(start, &Utc), start);
        assert_eq!(daily(15, 55).first_due(start, &Utc), at("2026-10-19 15:55:00"));
    }

    #[test]
    fn test_next_due_on_time_skips_nothing() {
        let (next, skipped) = next_due(
            &every_minute(),
            at("2026-10-19 10:00:00"),
            at("2026-10-19 10:00:05"),
            &Utc,
        );
        assert_eq!(next, at("2026-10-19 10:01:00"));
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_next_due_overrun_drops_missed_ticks() {
        // Job due at 10:00 ran until 10:03:30: 10:01, 10:02 and 10:03 are dropped.
        let (next, skipped) = next_due(
            &every_minute(),
            at("2026-10-19 10:00:00"),
            at("2026-10-19 10:03:30"),
            &Utc,
        );
        assert_eq!(next, at("2026-10-19 10:04:00"));
        assert_eq!(skipped, 3);
    }

    #[test]
    fn test_next_due_daily() {
        let (next, skipped) = next_due(
            &daily(15, 54),
            at("2026-10-19 15:54:00"),
            at("2026-10-19 15:54:02"),
            &Utc,
        );
        assert_eq!(next, at("2026-10-20 15:54:00"));
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_describe() {
        assert_eq!(every_minute().describe(), "every 60s");
        assert_eq!(daily(15, 4).describe(), "daily at 15:04");
    }

    #[test]
    fn test_sleep_duration_is_clamped() {
        let now = at("2026-10-19 10:00:00");
        let mut job = ScheduledJob::new(JobKind::Export, daily(15, 55), now, &Utc);

        // Hours away → capped at the maximum.
        assert_eq!(
            sleep_duration(std::slice::from_ref(&job), now),
            std::time::Duration::from_secs(SCHEDULER_MAX_SLEEP_SECS)
        );

        // Already overdue → minimum.
        job.status.next_run_at = at("2026-10-19 09:59:00");
        assert_eq!(
            sleep_duration(std::slice::from_ref(&job), now),
            std::time::Duration::from_millis(SCHEDULER_MIN_SLEEP_MS)
        );
    }

    #[test]
    fn test_default_jobs() {
        let start = at("2026-10-19 12:00:00");
        let jobs = default_jobs(&AppConfig::default(), start).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs[0].is_due(start));
        assert!(!jobs[1].is_due(start));

        let export_at = jobs[2].status.next_run_at;
        assert!(export_at > start && export_at <= start + Duration::days(1));
        assert_eq!(
            export_at.with_timezone(&Local).time(),
            NaiveTime::from_hms_opt(15, 55, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_run_pending_runs_only_due_jobs() {
        let (pool, dir) = test_pool().await;
        let ctx = JobContext {
            pool,
            // No cities, so the ingest job makes no requests.
            client: WttrClient::new("http://127.0.0.1:9", std::time::Duration::from_millis(50))
                .unwrap(),
            ingest: IngestSettings {
                cities: Vec::new(),
                range: TempRange::default(),
                warm_threshold: 20.0,
            },
            thresholds: TemperatureThresholds::default(),
            output_folder: dir.path().join("out"),
        };

        let now = Utc::now();
        let mut summary = ScheduledJob::new(JobKind::DailySummary, daily(0, 0), now, &Local);
        summary.status.next_run_at = now - Duration::seconds(1);
        let export = ScheduledJob::new(JobKind::Export, daily(0, 0), now, &Local);
        let mut jobs = vec![summary, export];

        let state: SharedSchedulerState = Arc::new(RwLock::new(SchedulerState::new()));
        let ran = run_pending(&ctx, &mut jobs, &state).await;

        assert_eq!(ran, 1);
        assert_eq!(jobs[0].status.runs, 1);
        assert!(jobs[0].status.last_result.starts_with("ok:"));
        assert!(jobs[0].status.next_run_at > now);
        assert_eq!(jobs[1].status.runs, 0);

        // Every job is visible in the shared state, not only the one that ran.
        let s = state.read().await;
        assert_eq!(s.jobs.len(), 2);
        assert_eq!(s.jobs[0].job, JobKind::DailySummary);
        assert_eq!(s.jobs[0].runs, 1);
        assert_eq!(s.jobs[1].job, JobKind::Export);
        assert_eq!(s.jobs[1].last_result, "pending");
    }
}
