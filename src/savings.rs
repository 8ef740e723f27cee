//! Monthly savings aggregation.
//!
//! Once a calendar month has completed, each user's net savings for that
//! month (base income plus credits, minus debits) is posted back to their
//! account as a single credit transaction labeled with the month's name. The
//! label doubles as the idempotence guard: a savings credit is never posted
//! twice for the same month, no matter how often the job runs.

use time::Date;

use crate::{
    Error,
    budget::{month_bounds, previous_month_bounds},
    currency::format_amount,
    notification::{NotificationKind, notify},
    state::AppState,
    transaction::{
        Transaction, TransactionKind, create_transaction, label_exists_in_range,
        sum_amount_in_range,
    },
    user::{User, get_all_users},
};

/// The category assigned to posted savings credits.
const SAVINGS_CATEGORY: &str = "Savings";

/// Post last month's net savings as a credit transaction for every user.
///
/// The target period is the calendar month before the one containing
/// `today`. Savings are never negative; a loss month posts nothing. Posting
/// is idempotent per month thanks to the month-named label guard.
///
/// A failure while processing one user is logged and does not stop the run
/// for the remaining users.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if the users could not be listed.
pub async fn run_monthly_savings(state: &AppState, today: Date) -> Result<(), Error> {
    let users = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_users(&connection)?
    };

    for user in users {
        if let Err(error) = post_savings_for_user(state, &user, today).await {
            tracing::error!(
                "Could not process monthly savings for user {}: {error}",
                user.id
            );
        }
    }

    Ok(())
}

async fn post_savings_for_user(state: &AppState, user: &User, today: Date) -> Result<(), Error> {
    let (previous_start, previous_end) = previous_month_bounds(today);
    let month_name = format!("{} {}", previous_start.month(), previous_start.year());
    let label = format!("{month_name} Savings");

    let savings = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        let credits = sum_amount_in_range(
            user.id,
            TransactionKind::Credit,
            previous_start,
            previous_end,
            None,
            &connection,
        )?;
        let debits = sum_amount_in_range(
            user.id,
            TransactionKind::Debit,
            previous_start,
            previous_end,
            None,
            &connection,
        )?;

        let savings = (user.income + credits) - debits;

        if savings <= 0.0 {
            tracing::debug!("No savings to add for user {} from {month_name}", user.id);
            return Ok(());
        }

        // The guard looks in the current month, where a previous run of this
        // job would have dated the credit.
        let (current_start, current_end) = month_bounds(today);
        if label_exists_in_range(user.id, &label, current_start, current_end, &connection)? {
            tracing::info!("Savings already processed for user {} for {month_name}", user.id);
            return Ok(());
        }

        let builder = Transaction::build(TransactionKind::Credit, savings, today, &label)
            .description(&format!("Automatically calculated savings from {month_name}"))
            .category(SAVINGS_CATEGORY);
        create_transaction(user.id, builder, &connection)?;

        tracing::info!(
            "Added {} savings for user {} from {month_name}",
            format_amount(savings),
            user.id
        );

        savings
    };

    let description = format!(
        "Your savings of {} from {month_name} have been added to your account",
        format_amount(savings)
    );

    notify(
        state,
        user,
        "Monthly Savings Added",
        &description,
        NotificationKind::System,
        None,
    )
    .await?;

    Ok(())
}

/// Remind every user that the current month's savings will be calculated at
/// month end. Informational only, no financial computation.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if the users could not be listed.
pub async fn run_savings_reminder(state: &AppState, today: Date) -> Result<(), Error> {
    let users = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_users(&connection)?
    };

    let month_name = format!("{} {}", today.month(), today.year());
    let description = format!(
        "Your {month_name} savings will be calculated and added at the end of this month. \
         Keep tracking your expenses!"
    );

    for user in users {
        if let Err(error) = notify(
            state,
            &user,
            "Monthly Savings Reminder",
            &description,
            NotificationKind::System,
            None,
        )
        .await
        {
            tracing::error!(
                "Could not send the savings reminder to user {}: {error}",
                user.id
            );
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
