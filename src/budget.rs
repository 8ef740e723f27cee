//! Budget assessment.
//!
//! Classifies a new debit against the user's remaining monthly budget and
//! raises a spending alert when it crosses a threshold, and sweeps all users
//! for a low remaining balance. The remaining budget is always derived as
//! `monthly_budget - debits this calendar month`, never stored.

use time::{Date, Month};

use crate::{
    Error,
    currency::format_amount,
    mail::MailMessage,
    notification::{Notification, NotificationKind, notify},
    state::AppState,
    transaction::{Transaction, TransactionKind, sum_amount_in_range},
    user::{User, get_all_users},
};

/// The share of the monthly budget below which the low balance alert fires.
const LOW_BALANCE_FRACTION: f64 = 0.2;

/// The severity of a spending alert, ordered from least to most severe.
///
/// A debit is classified by how large it is relative to the *remaining*
/// monthly budget, not the total budget, so percentages inflate as the
/// budget runs down. That growth is intentional.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendingAlertLevel {
    /// The debit used at least 10% of the remaining budget.
    Significant,
    /// The debit used at least 15% of the remaining budget.
    Large,
    /// The debit used at least 20% of the remaining budget.
    VeryLarge,
}

impl SpendingAlertLevel {
    /// The notification title and email subject for this level.
    pub fn title(&self) -> &'static str {
        match self {
            SpendingAlertLevel::Significant => "Significant Spending Alert",
            SpendingAlertLevel::Large => "Large Transaction Alert",
            SpendingAlertLevel::VeryLarge => "Very Large Expenditure Alert",
        }
    }
}

/// Classify a debit's share of the remaining budget into an alert level.
///
/// Thresholds are checked descending and the first match wins, so exactly one
/// level fires per transaction: 20% or more is [SpendingAlertLevel::VeryLarge],
/// 15% is [SpendingAlertLevel::Large], 10% is [SpendingAlertLevel::Significant]
/// and anything below 10% is not alerted on.
pub fn classify_spending(percentage: f64) -> Option<SpendingAlertLevel> {
    if percentage >= 20.0 {
        Some(SpendingAlertLevel::VeryLarge)
    } else if percentage >= 15.0 {
        Some(SpendingAlertLevel::Large)
    } else if percentage >= 10.0 {
        Some(SpendingAlertLevel::Significant)
    } else {
        None
    }
}

/// The first and last day of the calendar month containing `date`.
pub fn month_bounds(date: Date) -> (Date, Date) {
    let year = date.year();
    let month = date.month();
    let start = Date::from_calendar_date(year, month, 1).expect("invalid month start date");
    let end = Date::from_calendar_date(year, month, last_day_of_month(year, month))
        .expect("invalid month end date");

    (start, end)
}

/// The first and last day of the calendar month before the one containing
/// `date`.
pub fn previous_month_bounds(date: Date) -> (Date, Date) {
    let (year, month) = if date.month() == Month::January {
        (date.year() - 1, Month::December)
    } else {
        (date.year(), date.month().previous())
    };

    month_bounds(Date::from_calendar_date(year, month, 1).expect("invalid month start date"))
}

fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Assess a just-created or just-amended transaction against the user's
/// remaining budget for the month containing `today` and raise at most one
/// spending alert.
///
/// The transaction under assessment is excluded from the month-to-date spend
/// so that its percentage is measured against the budget that remained before
/// it was posted. Returns the alert notification when one fired.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if there is an SQL error.
pub async fn assess_transaction(
    state: &AppState,
    user: &User,
    transaction: &Transaction,
    today: Date,
) -> Result<Option<Notification>, Error> {
    let Some(monthly_budget) = user.monthly_budget else {
        tracing::debug!("Skipping budget check for user {}: no budget set", user.id);
        return Ok(None);
    };

    if monthly_budget <= 0.0 {
        tracing::debug!("Skipping budget check for user {}: no budget set", user.id);
        return Ok(None);
    }

    if transaction.kind == TransactionKind::Credit {
        tracing::debug!(
            "Skipping budget check for user {}: credit transaction",
            user.id
        );
        return Ok(None);
    }

    let (month_start, month_end) = month_bounds(today);

    let spent_this_month = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        sum_amount_in_range(
            user.id,
            TransactionKind::Debit,
            month_start,
            month_end,
            Some(transaction.id),
            &connection,
        )?
    };

    let remaining_budget = monthly_budget - spent_this_month;

    if remaining_budget <= 0.0 {
        tracing::debug!(
            "Skipping budget check for user {}: budget already exhausted",
            user.id
        );
        return Ok(None);
    }

    let percentage = (transaction.amount / remaining_budget) * 100.0;

    let Some(level) = classify_spending(percentage) else {
        return Ok(None);
    };

    let description = format!(
        "Your spending of {} on {} used {percentage:.1}% of your remaining monthly budget",
        format_amount(transaction.amount),
        transaction.label
    );
    let email = MailMessage::spending_alert(user, level, transaction, percentage);

    let notification = notify(
        state,
        user,
        level.title(),
        &description,
        NotificationKind::Budget,
        Some(email),
    )
    .await?;

    Ok(Some(notification))
}

/// Alert every user whose remaining budget for the month containing `today`
/// has fallen to 20% of their monthly budget or less.
///
/// A failure while checking one user is logged and does not stop the sweep
/// for the remaining users.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if the users could not be listed.
pub async fn run_low_balance_sweep(state: &AppState, today: Date) -> Result<(), Error> {
    let users = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_users(&connection)?
    };

    for user in users {
        if let Err(error) = check_low_balance(state, &user, today).await {
            tracing::error!(
                "Could not run the low balance check for user {}: {error}",
                user.id
            );
        }
    }

    Ok(())
}

async fn check_low_balance(
    state: &AppState,
    user: &User,
    today: Date,
) -> Result<Option<Notification>, Error> {
    let Some(monthly_budget) = user.monthly_budget else {
        return Ok(None);
    };

    if monthly_budget <= 0.0 {
        return Ok(None);
    }

    let (month_start, month_end) = month_bounds(today);

    let spent_this_month = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        sum_amount_in_range(
            user.id,
            TransactionKind::Debit,
            month_start,
            month_end,
            None,
            &connection,
        )?
    };

    let remaining_budget = monthly_budget - spent_this_month;

    if remaining_budget > monthly_budget * LOW_BALANCE_FRACTION {
        return Ok(None);
    }

    let description = format!(
        "You have {} left of your {} monthly budget. Review your recent spending to stay on track",
        format_amount(remaining_budget),
        format_amount(monthly_budget)
    );
    let email = MailMessage::low_balance(user, remaining_budget, monthly_budget);

    let notification = notify(
        state,
        user,
        "Low Monthly Balance Alert",
        &description,
        NotificationKind::Budget,
        Some(email),
    )
    .await?;

    Ok(Some(notification))
}

// ============================================================================
// TESTS
// ============================================================================
