//! Recurring transaction templates (autopay).
//!
//! A template stores the date it last ran and a recurrence interval in days.
//! The daily materialization sweep turns due templates into concrete
//! transactions and advances the template's date in place, so a template is
//! never duplicated and materialized occurrences have no separate delete
//! path. Two overlapping reminder passes exist on purpose: an exact
//! five-days-ahead check and a twice-daily near-due scan. They are never
//! deduplicated.

use time::{Date, Duration};

use crate::{
    Error,
    currency::format_amount,
    mail::MailMessage,
    notification::{NotificationKind, notify},
    state::AppState,
    transaction::{Transaction, advance_autopay_template, create_transaction, get_autopay_templates},
    user::{Feature, User, get_all_users, is_entitled},
};

/// How many days before a template's next due date the reminder passes look
/// ahead.
const REMINDER_LEAD_DAYS: i64 = 5;

/// Materialize every autopay template that has come due for users entitled
/// to the feature.
///
/// A template is due when at least its recurrence interval has passed since
/// the date it last ran. Materializing creates a concrete transaction dated
/// `today` with the template's kind, amount, label and category, marks its
/// description as auto-generated, and advances the template's own date to
/// `today` so the next due check measures from the new baseline.
///
/// A failure while processing one user is logged and does not stop the sweep
/// for the remaining users.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if the users could not be listed.
pub async fn run_materialization_sweep(state: &AppState, today: Date) -> Result<(), Error> {
    let users = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_users(&connection)?
    };

    for user in users {
        if !is_entitled(user.tier, Feature::Autopay) {
            continue;
        }

        if let Err(error) = materialize_due_templates(state, &user, today).await {
            tracing::error!("Could not process autopay for user {}: {error}", user.id);
        }
    }

    Ok(())
}

async fn materialize_due_templates(
    state: &AppState,
    user: &User,
    today: Date,
) -> Result<(), Error> {
    let materialized = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        let mut materialized = Vec::new();

        for template in get_autopay_templates(user.id, &connection)? {
            let days_since_last = (today - template.date).whole_days();

            if days_since_last < template.recurrence_days {
                continue;
            }

            let description = if template.description.is_empty() {
                "(Auto-generated)".to_owned()
            } else {
                format!("{} (Auto-generated)", template.description)
            };
            let builder =
                Transaction::build(template.kind, template.amount, today, &template.label)
                    .description(&description)
                    .category(&template.category);

            let transaction = create_transaction(user.id, builder, &connection)?;
            advance_autopay_template(template.id, today, &connection)?;

            tracing::info!(
                "Materialized autopay transaction for user {}: {} - {}",
                user.id,
                transaction.label,
                format_amount(transaction.amount)
            );

            materialized.push(transaction);
        }

        materialized
    };

    for transaction in materialized {
        let description = format!(
            "{} has been automatically {} for {}",
            format_amount(transaction.amount),
            transaction.kind.verb(),
            transaction.label
        );

        notify(
            state,
            user,
            "Autopay Transaction Processed",
            &description,
            NotificationKind::System,
            None,
        )
        .await?;
    }

    Ok(())
}

/// Remind entitled users with in-app notifications enabled about templates
/// due in exactly five days.
///
/// The comparison is date-exact, so each occurrence produces at most one
/// reminder from this pass.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if the users could not be listed.
pub async fn run_exact_reminder_sweep(state: &AppState, today: Date) -> Result<(), Error> {
    let users = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_users(&connection)?
    };

    for user in users {
        if !is_entitled(user.tier, Feature::Autopay) || !user.notifications_enabled {
            continue;
        }

        if let Err(error) = remind_due_in_lead_days(state, &user, today).await {
            tracing::error!(
                "Could not send autopay reminders for user {}: {error}",
                user.id
            );
        }
    }

    Ok(())
}

async fn remind_due_in_lead_days(state: &AppState, user: &User, today: Date) -> Result<(), Error> {
    let templates = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_autopay_templates(user.id, &connection)?
    };

    for template in templates {
        let next_due = template.date + Duration::days(template.recurrence_days);

        if next_due != today + Duration::days(REMINDER_LEAD_DAYS) {
            continue;
        }

        notify(
            state,
            user,
            "Upcoming Autopay Reminder",
            &reminder_description(&template, next_due),
            NotificationKind::System,
            None,
        )
        .await?;
    }

    Ok(())
}

/// Remind every user about templates due within the next five days, with an
/// email alongside the in-app notification.
///
/// Unlike the exact pass this one matches a window, so a template close to
/// its due date is reminded on each run. Overdue templates are not matched.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database connection lock is poisoned,
/// - or [Error::SqlError] if the users could not be listed.
pub async fn run_near_due_scan(state: &AppState, today: Date) -> Result<(), Error> {
    let users = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_all_users(&connection)?
    };

    for user in users {
        if let Err(error) = remind_near_due(state, &user, today).await {
            tracing::error!(
                "Could not scan upcoming autopay for user {}: {error}",
                user.id
            );
        }
    }

    Ok(())
}

async fn remind_near_due(state: &AppState, user: &User, today: Date) -> Result<(), Error> {
    let templates = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_autopay_templates(user.id, &connection)?
    };

    for template in templates {
        let next_due = template.date + Duration::days(template.recurrence_days);
        let days_remaining = (next_due - today).whole_days();

        if !(0..REMINDER_LEAD_DAYS).contains(&days_remaining) {
            continue;
        }

        let email = MailMessage::autopay_upcoming(user, &template, next_due);

        notify(
            state,
            user,
            "Upcoming Autopay Reminder",
            &reminder_description(&template, next_due),
            NotificationKind::System,
            Some(email),
        )
        .await?;
    }

    Ok(())
}

fn reminder_description(template: &Transaction, next_due: Date) -> String {
    format!(
        "{} will be automatically {} for {} on {next_due}",
        format_amount(template.amount),
        template.kind.verb(),
        template.label
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod materialization_tests {
    use std::sync::Arc;

    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        autopay::run_materialization_sweep,
        email::Email,
        mail::MemoryMail,
        notification::{Notification, get_notifications},
        state::AppState,
        transaction::{Transaction, TransactionKind, create_transaction, get_transactions},
        user::{Tier, User, UserBuilder, create_user},
    };

    fn get_test_state() -> (AppState, Arc<MemoryMail>) {
        let mail = Arc::new(MemoryMail::new());
        let state = AppState::new(
            Connection::open_in_memory().expect("Could not open in-memory database"),
            mail.clone(),
            "UTC",
        )
        .expect("Could not create app state");

        (state, mail)
    }

    fn seed_user(state: &AppState, builder: UserBuilder) -> User {
        let connection = state.db_connection.lock().unwrap();
        create_user(builder, &connection).expect("Could not create test user")
    }

    fn premium_user(state: &AppState) -> User {
        seed_user(
            state,
            User::build("Ada", Email::new("ada@example.com").unwrap()).tier(Tier::Premium),
        )
    }

    fn seed_template(state: &AppState, user: &User, date: Date, recurrence: i64) -> Transaction {
        let connection = state.db_connection.lock().unwrap();
        create_transaction(
            user.id,
            Transaction::build(TransactionKind::Debit, 50.0, date, "Rent")
                .description("Monthly rent")
                .category("Housing")
                .autopay(recurrence),
            &connection,
        )
        .expect("Could not create test template")
    }

    fn concrete_transactions(state: &AppState, user: &User) -> Vec<Transaction> {
        let connection = state.db_connection.lock().unwrap();
        get_transactions(user.id, &connection)
            .expect("Could not list transactions")
            .into_iter()
            .filter(|transaction| !transaction.is_autopay)
            .collect()
    }

    fn must_get_notifications(state: &AppState, user: &User) -> Vec<Notification> {
        let connection = state.db_connection.lock().unwrap();
        get_notifications(user.id, &connection).expect("Could not list notifications")
    }

    #[tokio::test]
    async fn materializes_when_the_interval_has_elapsed() {
        let (state, mail) = get_test_state();
        let user = premium_user(&state);
        let template = seed_template(&state, &user, date!(2025 - 01 - 01), 30);

        run_materialization_sweep(&state, date!(2025 - 01 - 31))
            .await
            .expect("Could not run sweep");

        let concrete = concrete_transactions(&state, &user);
        assert_eq!(concrete.len(), 1);
        assert_eq!(concrete[0].kind, TransactionKind::Debit);
        assert_eq!(concrete[0].amount, 50.0);
        assert_eq!(concrete[0].label, "Rent");
        assert_eq!(concrete[0].category, "Housing");
        assert_eq!(concrete[0].description, "Monthly rent (Auto-generated)");
        assert_eq!(concrete[0].date, date!(2025 - 01 - 31));
        assert_eq!(concrete[0].recurrence_days, 0);

        let connection = state.db_connection.lock().unwrap();
        let templates = crate::transaction::get_autopay_templates(user.id, &connection)
            .expect("Could not list templates");
        assert_eq!(templates.len(), 1, "the template itself must not duplicate");
        assert_eq!(templates[0].id, template.id);
        assert_eq!(templates[0].date, date!(2025 - 01 - 31));
        drop(connection);

        let notifications = must_get_notifications(&state, &user);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Autopay Transaction Processed");
        assert_eq!(
            notifications[0].description,
            "$50.00 has been automatically debited for Rent"
        );

        assert!(mail.sent().is_empty(), "materialization is in-app only");
    }

    #[tokio::test]
    async fn does_not_rematerialize_the_next_day() {
        let (state, _mail) = get_test_state();
        let user = premium_user(&state);
        seed_template(&state, &user, date!(2025 - 01 - 01), 30);

        run_materialization_sweep(&state, date!(2025 - 01 - 31))
            .await
            .expect("Could not run sweep");
        run_materialization_sweep(&state, date!(2025 - 02 - 01))
            .await
            .expect("Could not run sweep");

        assert_eq!(concrete_transactions(&state, &user).len(), 1);
        assert_eq!(must_get_notifications(&state, &user).len(), 1);
    }

    #[tokio::test]
    async fn waits_for_the_full_interval() {
        let (state, _mail) = get_test_state();
        let user = premium_user(&state);
        seed_template(&state, &user, date!(2025 - 01 - 01), 30);

        run_materialization_sweep(&state, date!(2025 - 01 - 15))
            .await
            .expect("Could not run sweep");

        assert!(concrete_transactions(&state, &user).is_empty());
        assert!(must_get_notifications(&state, &user).is_empty());
    }

    #[tokio::test]
    async fn skips_users_not_on_premium() {
        let (state, _mail) = get_test_state();
        let user = seed_user(
            &state,
            User::build("Ada", Email::new("ada@example.com").unwrap()),
        );
        seed_template(&state, &user, date!(2025 - 01 - 01), 30);

        run_materialization_sweep(&state, date!(2025 - 01 - 31))
            .await
            .expect("Could not run sweep");

        assert!(concrete_transactions(&state, &user).is_empty());
        assert!(must_get_notifications(&state, &user).is_empty());
    }

    #[tokio::test]
    async fn materializes_once_per_interval_over_many_ticks() {
        let (state, _mail) = get_test_state();
        let user = premium_user(&state);
        seed_template(&state, &user, date!(2025 - 01 - 01), 10);

        for today in [
            date!(2025 - 01 - 11),
            date!(2025 - 01 - 21),
            date!(2025 - 01 - 25),
            date!(2025 - 01 - 31),
        ] {
            run_materialization_sweep(&state, today)
                .await
                .expect("Could not run sweep");
        }

        let concrete = concrete_transactions(&state, &user);
        assert_eq!(concrete.len(), 3, "want one instance per elapsed interval");

        let connection = state.db_connection.lock().unwrap();
        let templates = crate::transaction::get_autopay_templates(user.id, &connection)
            .expect("Could not list templates");
        assert_eq!(
            templates[0].date,
            date!(2025 - 01 - 31),
            "the template follows the latest occurrence"
        );
    }

    #[tokio::test]
    async fn template_without_description_gets_the_bare_suffix() {
        let (state, _mail) = get_test_state();
        let user = premium_user(&state);

        {
            let connection = state.db_connection.lock().unwrap();
            create_transaction(
                user.id,
                Transaction::build(TransactionKind::Debit, 9.99, date!(2025 - 01 - 01), "Music")
                    .autopay(30),
                &connection,
            )
            .expect("Could not create test template");
        }

        run_materialization_sweep(&state, date!(2025 - 01 - 31))
            .await
            .expect("Could not run sweep");

        let concrete = concrete_transactions(&state, &user);
        assert_eq!(concrete[0].description, "(Auto-generated)");
    }
}
