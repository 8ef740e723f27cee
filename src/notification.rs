//! In-app notifications and the helper that fans a notification out to email.
//!
//! Every event the application wants the user to know about is recorded as an
//! in-app [Notification]. Some events additionally send an email through the
//! configured [crate::mail::MailTransport], but only when the user has email
//! notifications enabled, and a failed delivery never undoes the in-app
//! notification.

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{Path, Query, State},
};
use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    database_id::DatabaseId,
    mail::MailMessage,
    user::{User, UserID, get_user_by_id},
};

// ============================================================================
// MODELS
// ============================================================================

/// The category a notification belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Routine events such as autopay activity and savings updates.
    System,
    /// Account lifecycle events such as signing up.
    Auth,
    /// Marketing and feature announcements.
    Promotional,
    /// Budget warnings such as spending alerts and low balances.
    Budget,
}

impl NotificationKind {
    /// The name of the kind as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::System => "system",
            NotificationKind::Auth => "auth",
            NotificationKind::Promotional => "promotional",
            NotificationKind::Budget => "budget",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "system" => Ok(NotificationKind::System),
            "auth" => Ok(NotificationKind::Auth),
            "promotional" => Ok(NotificationKind::Promotional),
            "budget" => Ok(NotificationKind::Budget),
            _ => Err(Error::InvalidNotificationKind(text.to_owned())),
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// A message shown to the user in the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// The ID of the notification.
    pub id: DatabaseId,
    /// The ID of the user the notification belongs to.
    pub user_id: UserID,
    /// A short headline, e.g. "Autopay Setup Complete".
    pub title: String,
    /// The full notification text.
    pub description: String,
    /// The category the notification belongs to.
    pub kind: NotificationKind,
    /// Whether the user has read the notification.
    pub is_read: bool,
    /// When the notification was recorded.
    pub created_at: OffsetDateTime,
    /// When the notification was last changed, e.g. marked as read.
    pub updated_at: OffsetDateTime,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the notification table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_notification_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS notification (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('notification', 0)",
        (),
    )?;

    // Index used when listing a user's notifications newest first.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_notification_user_created
             ON notification(user_id, created_at);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Notification].
pub fn map_notification_row(row: &Row) -> Result<Notification, rusqlite::Error> {
    let id = row.get(0)?;
    let raw_user_id = row.get(1)?;
    let title = row.get(2)?;
    let description = row.get(3)?;
    let kind = row.get(4)?;
    let is_read = row.get(5)?;
    let created_at = row.get(6)?;
    let updated_at = row.get(7)?;

    Ok(Notification {
        id,
        user_id: UserID::new(raw_user_id),
        title,
        description,
        kind,
        is_read,
        created_at,
        updated_at,
    })
}

/// Record a new unread notification for `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `user_id` does not belong to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_notification(
    user_id: UserID,
    title: &str,
    description: &str,
    kind: NotificationKind,
    connection: &Connection,
) -> Result<Notification, Error> {
    let now = OffsetDateTime::now_utc();

    let notification = connection
        .prepare(
            "INSERT INTO notification (user_id, title, description, kind, is_read,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
             RETURNING id, user_id, title, description, kind, is_read, created_at, updated_at",
        )?
        .query_row(
            (user_id.as_i64(), title, description, kind, now),
            map_notification_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    Ok(notification)
}

/// Get all notifications belonging to `user_id`, newest first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_notifications(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Notification>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, title, description, kind, is_read, created_at, updated_at
             FROM notification WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?
        .query_map((user_id.as_i64(),), map_notification_row)?
        .map(|maybe_notification| maybe_notification.map_err(|error| error.into()))
        .collect()
}

/// Mark all of `user_id`'s unread notifications as read.
///
/// Returns the number of notifications that changed.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn mark_all_read(user_id: UserID, connection: &Connection) -> Result<usize, Error> {
    let rows_affected = connection.execute(
        "UPDATE notification SET is_read = 1, updated_at = ?1
         WHERE user_id = ?2 AND is_read = 0",
        (OffsetDateTime::now_utc(), user_id.as_i64()),
    )?;

    Ok(rows_affected)
}

/// Delete every notification recorded before `cutoff`, across all users.
///
/// Returns the number of notifications deleted.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn delete_older_than(cutoff: OffsetDateTime, connection: &Connection) -> Result<usize, Error> {
    let rows_affected = connection.execute(
        "DELETE FROM notification WHERE created_at < ?1",
        (cutoff,),
    )?;

    Ok(rows_affected)
}

// ============================================================================
// NOTIFY
// ============================================================================

/// Record an in-app notification for `user`, and optionally send `email`.
///
/// The email is only sent when the user has email notifications enabled.
/// A failed delivery is logged and swallowed, it never undoes the in-app
/// notification.
///
/// # Errors
/// This function will return a:
/// - [Error::DatabaseLockError] if the database lock cannot be acquired,
/// - or [Error::NotFound] if the user has been deleted in the meantime,
/// - or [Error::SqlError] if there is some other SQL error.
pub async fn notify(
    state: &AppState,
    user: &User,
    title: &str,
    description: &str,
    kind: NotificationKind,
    email: Option<MailMessage>,
) -> Result<Notification, Error> {
    let notification = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        create_notification(user.id, title, description, kind, &connection)?
    };

    if let Some(message) = email
        && user.email_notifications_enabled
        && let Err(error) = state.mail.send(&message).await
    {
        tracing::warn!(
            "Could not deliver {} email to {}: {error}",
            message.kind,
            message.to
        );
    }

    Ok(notification)
}

// ============================================================================
// ENDPOINTS
// ============================================================================

/// The query parameters for the notification retention endpoint.
#[derive(Debug, Deserialize)]
pub struct RetentionParams {
    /// Notifications older than this many days are deleted.
    pub days: i64,
}

/// A route handler for listing a user's notifications, newest first.
///
/// # Errors
/// This function will return a [Error::NotFound] (404) if `user_id` does not
/// belong to a registered user.
pub async fn get_notifications_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Notification>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let user = get_user_by_id(UserID::new(user_id), &connection)?;
    let notifications = get_notifications(user.id, &connection)?;

    Ok(Json(notifications))
}

/// A route handler for marking all of a user's notifications as read.
///
/// # Errors
/// This function will return a [Error::NotFound] (404) if `user_id` does not
/// belong to a registered user.
pub async fn mark_notifications_read_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let user = get_user_by_id(UserID::new(user_id), &connection)?;
    let marked_read = mark_all_read(user.id, &connection)?;

    Ok(Json(json!({ "marked_read": marked_read })))
}

/// A route handler for pruning old notifications across all users.
///
/// Notifications older than `days` days are deleted.
///
/// # Errors
/// This function will return a [Error::InvalidRetentionDays] (422) if `days`
/// is not at least one.
pub async fn notification_retention_endpoint(
    State(state): State<AppState>,
    Query(params): Query<RetentionParams>,
) -> Result<Json<Value>, Error> {
    if params.days < 1 {
        return Err(Error::InvalidRetentionDays(params.days));
    }

    let cutoff = OffsetDateTime::now_utc() - Duration::days(params.days);
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let deleted = delete_older_than(cutoff, &connection)?;

    tracing::info!("Deleted {deleted} notifications older than {} days", params.days);

    Ok(Json(json!({ "deleted": deleted })))
}

// ============================================================================
// TESTS
// ============================================================================
