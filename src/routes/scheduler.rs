//! Scheduler status HTTP endpoint.
//!
//! GET /api/v1/scheduler/status: current state of the background job
//! scheduler as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::scheduler::{SchedulerState, SharedSchedulerState};

/// Get the current scheduler status.
///
/// Per job: schedule, next due time, last start/duration/result, run count and
/// dropped triggers.
#[utoipa::path(
    get,
    path = "/api/v1/scheduler/status",
    tag = "Scheduler",
    responses(
        (status = 200, description = "Current scheduler status", body = SchedulerState),
    )
)]
pub async fn get_scheduler_status(
    State(state): State<SharedSchedulerState>,
) -> Json<SchedulerState> {
    let s = state.read().await;
    Json(s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scheduler::{JobKind, Schedule, ScheduledJob};
    use chrono::{NaiveDate, NaiveTime, Utc};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_status_reflects_shared_state() {
        let state: SharedSchedulerState = Arc::new(RwLock::new(SchedulerState::new()));

        let Json(before) = get_scheduler_status(State(state.clone())).await;
        assert!(!before.active);
        assert!(before.jobs.is_empty());

        let start = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        let job = ScheduledJob::new(
            JobKind::Export,
            Schedule::DailyAt(NaiveTime::from_hms_opt(15, 55, 0).unwrap()),
            start,
            &Utc,
        );
        {
            let mut s = state.write().await;
            s.active = true;
            s.jobs.push(job.status);
        }

        let Json(after) = get_scheduler_status(State(state)).await;
        assert!(after.active);
        assert_eq!(after.jobs.len(), 1);
        assert_eq!(after.jobs[0].schedule, "daily at 15:55");
        assert_eq!(after.jobs[0].last_result, "pending");
    }
}
