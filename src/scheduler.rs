//! Time-driven job scheduling.
//!
//! Each named job owns a [Schedule] and runs in its own tokio task that
//! sleeps until the next occurrence in the application's local timezone,
//! runs the job body, and reschedules. [Schedule::next_occurrence] is a pure
//! function so the timing rules are testable without waiting on the clock.
//! There is no distributed coordination; the scheduler assumes a single
//! process instance.

use time::{Date, Duration, Month, OffsetDateTime, Time};

use crate::{jobs::run_job, state::AppState, timezone::local_now};

/// When a job runs, relative to the wall clock in the application's local
/// timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at the given time.
    DailyAt(Time),
    /// Once a month on the given day at the given time.
    ///
    /// `day` must be at most 28 so that it exists in every month.
    MonthlyAt {
        /// The day of the month, 1 to 28.
        day: u8,
        /// The time of day.
        time: Time,
    },
}

impl Schedule {
    /// The first occurrence strictly after `after`.
    ///
    /// Strictness means a job that just ran at its scheduled time reschedules
    /// to the next period instead of firing again immediately.
    pub fn next_occurrence(&self, after: OffsetDateTime) -> OffsetDateTime {
        match *self {
            Schedule::DailyAt(time) => {
                let candidate = after.replace_time(time);

                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Schedule::MonthlyAt { day, time } => {
                let candidate = after
                    .replace_day(day)
                    .expect("schedule day must exist in every month")
                    .replace_time(time);

                if candidate > after {
                    candidate
                } else {
                    let month = after.month().next();
                    let year = if month == Month::January {
                        after.year() + 1
                    } else {
                        after.year()
                    };

                    Date::from_calendar_date(year, month, day)
                        .expect("schedule day must exist in every month")
                        .with_time(time)
                        .assume_offset(after.offset())
                }
            }
        }
    }
}

/// A named job and the schedule it runs on.
#[derive(Clone, Copy, Debug)]
pub struct Job {
    /// The job name, as dispatched by [run_job].
    pub name: &'static str,
    /// When the job runs.
    pub schedule: Schedule,
}

/// Owns the job list and spawns one timer loop per job.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    /// Create a scheduler for `jobs`.
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    /// Spawn the timer loops. Returns immediately; the loops run until the
    /// process exits.
    pub fn start(self, state: AppState) {
        for job in self.jobs {
            let state = state.clone();

            tokio::spawn(async move {
                run_job_loop(job, state).await;
            });
        }
    }
}

async fn run_job_loop(job: Job, state: AppState) {
    loop {
        let now = match local_now(&state.local_timezone) {
            Ok(now) => now,
            Err(error) => {
                tracing::error!(
                    "Could not resolve the local time for job {}: {error}",
                    job.name
                );
                return;
            }
        };

        let next = job.schedule.next_occurrence(now);
        tokio::time::sleep((next - now).unsigned_abs()).await;

        tracing::info!("Running scheduled job {}", job.name);

        if let Err(error) = run_job(&state, job.name, next.date()).await {
            tracing::error!("Scheduled job {} failed: {error}", job.name);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod next_occurrence_tests {
    use time::macros::{datetime, time};

    use crate::scheduler::Schedule;

    #[test]
    fn daily_runs_later_the_same_day() {
        let schedule = Schedule::DailyAt(time!(9:00));

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-06-05 08:00 UTC)),
            datetime!(2025-06-05 09:00 UTC)
        );
    }

    #[test]
    fn daily_rolls_to_the_next_day_once_passed() {
        let schedule = Schedule::DailyAt(time!(9:00));

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-06-05 10:30 UTC)),
            datetime!(2025-06-06 09:00 UTC)
        );
    }

    #[test]
    fn daily_never_fires_twice_at_the_scheduled_instant() {
        let schedule = Schedule::DailyAt(time!(9:00));

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-06-05 09:00 UTC)),
            datetime!(2025-06-06 09:00 UTC)
        );
    }

    #[test]
    fn monthly_runs_later_the_same_month() {
        let schedule = Schedule::MonthlyAt {
            day: 15,
            time: time!(10:00),
        };

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-06-10 12:00 UTC)),
            datetime!(2025-06-15 10:00 UTC)
        );
    }

    #[test]
    fn monthly_rolls_to_the_next_month_once_passed() {
        let schedule = Schedule::MonthlyAt {
            day: 15,
            time: time!(10:00),
        };

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-06-20 12:00 UTC)),
            datetime!(2025-07-15 10:00 UTC)
        );
    }

    #[test]
    fn monthly_rolls_across_the_year_boundary() {
        let schedule = Schedule::MonthlyAt {
            day: 1,
            time: time!(0:01),
        };

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-12-20 12:00 UTC)),
            datetime!(2026-01-01 0:01 UTC)
        );
    }

    #[test]
    fn monthly_rolls_when_the_time_has_passed_on_the_day() {
        let schedule = Schedule::MonthlyAt {
            day: 15,
            time: time!(10:00),
        };

        assert_eq!(
            schedule.next_occurrence(datetime!(2025-06-15 11:00 UTC)),
            datetime!(2025-07-15 10:00 UTC)
        );
    }
}
