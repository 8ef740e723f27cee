//! The scheduled job registry.
//!
//! Job bodies take an injected "today" so they can be driven by the
//! scheduler, by the administrative trigger endpoint, and by tests without
//! touching the wall clock. Every body is safe to re-run thanks to the
//! guards in the underlying sweeps.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use time::{Date, macros::time};

use crate::{
    Error,
    autopay::{run_exact_reminder_sweep, run_materialization_sweep, run_near_due_scan},
    budget::run_low_balance_sweep,
    savings::{run_monthly_savings, run_savings_reminder},
    scheduler::{Job, Schedule, Scheduler},
    state::AppState,
    timezone::local_today,
};

/// Materializes due autopay templates.
pub const AUTOPAY_MATERIALIZATION: &str = "autopay-materialization";

/// Sends the exact five-days-ahead autopay reminders.
pub const AUTOPAY_REMINDER: &str = "autopay-reminder";

/// Runs the low balance sweep followed by the near-due autopay scan.
pub const BUDGET_CHECK: &str = "budget-check";

/// Posts last month's savings.
pub const MONTHLY_SAVINGS: &str = "monthly-savings";

/// Reminds users mid-month that savings will be calculated.
pub const SAVINGS_REMINDER: &str = "savings-reminder";

/// The full trigger table.
pub fn standard_jobs() -> Vec<Job> {
    vec![
        Job {
            name: AUTOPAY_MATERIALIZATION,
            schedule: Schedule::DailyAt(time!(0:00)),
        },
        Job {
            name: AUTOPAY_REMINDER,
            schedule: Schedule::DailyAt(time!(9:00)),
        },
        Job {
            name: BUDGET_CHECK,
            schedule: Schedule::DailyAt(time!(9:00)),
        },
        Job {
            name: BUDGET_CHECK,
            schedule: Schedule::DailyAt(time!(21:00)),
        },
        Job {
            name: MONTHLY_SAVINGS,
            schedule: Schedule::MonthlyAt {
                day: 1,
                time: time!(0:01),
            },
        },
        Job {
            name: SAVINGS_REMINDER,
            schedule: Schedule::MonthlyAt {
                day: 15,
                time: time!(10:00),
            },
        },
    ]
}

/// Run the named job body for `today`.
///
/// # Errors
/// This function will return a:
/// - [Error::UnknownJob] if `name` is not a registered job,
/// - or any error the job body itself returns.
pub async fn run_job(state: &AppState, name: &str, today: Date) -> Result<(), Error> {
    match name {
        AUTOPAY_MATERIALIZATION => run_materialization_sweep(state, today).await,
        AUTOPAY_REMINDER => run_exact_reminder_sweep(state, today).await,
        BUDGET_CHECK => {
            run_low_balance_sweep(state, today).await?;
            run_near_due_scan(state, today).await
        }
        MONTHLY_SAVINGS => run_monthly_savings(state, today).await,
        SAVINGS_REMINDER => run_savings_reminder(state, today).await,
        _ => Err(Error::UnknownJob(name.to_owned())),
    }
}

/// Start the timer loops for [standard_jobs].
pub fn start_scheduler(state: AppState) {
    Scheduler::new(standard_jobs()).start(state);
}

/// A route handler that runs the named job immediately.
///
/// This is the administrative manual trigger for ops and testing. The job
/// runs with the current local date.
///
/// # Errors
/// This function will return a:
/// - [Error::UnknownJob] if the job name is not registered,
/// - or any error the job body returns.
pub async fn run_job_endpoint(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let today = local_today(&state.local_timezone)?;

    run_job(&state, &job_name, today).await?;

    tracing::info!("Manually triggered job {job_name}");

    Ok((StatusCode::OK, Json(json!({ "ran": job_name }))))
}

// ============================================================================
// TESTS
// ============================================================================
