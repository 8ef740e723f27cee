//! Spendeur is a personal finance tracker for recording income and expenses
//! against a monthly budget.
//!
//! This library provides a JSON REST API along with scheduled jobs that
//! materialize autopay transactions, post monthly savings, and notify users
//! about their spending.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod autopay;
mod budget;
mod currency;
mod database_id;
mod db;
mod email;
mod endpoints;
mod jobs;
mod mail;
mod notification;
mod routing;
mod savings;
mod scheduler;
mod state;
mod timezone;
mod transaction;
mod user;

pub use db::initialize as initialize_db;
pub use email::Email;
pub use jobs::start_scheduler;
pub use mail::{EmailKind, LogMail, MailMessage, MailTransport, MemoryMail};
pub use routing::build_router;
pub use state::AppState;
pub use user::{Feature, Tier, User, UserID, get_user_by_id};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An invalid string was used to create an email address.
    #[error("\"{0}\" is not a valid email address")]
    InvalidEmail(String),

    /// An unknown string was used to create a subscription tier.
    #[error("\"{0}\" is not a valid subscription tier")]
    InvalidTier(String),

    /// An unknown string was used to create a transaction kind.
    #[error("\"{0}\" is not a valid transaction kind")]
    InvalidTransactionKind(String),

    /// An unknown string was used to create a notification kind.
    #[error("\"{0}\" is not a valid notification kind")]
    InvalidNotificationKind(String),

    /// A zero or negative amount was used to create a transaction.
    #[error("transaction amounts must be greater than zero, got {0}")]
    InvalidAmount(f64),

    /// A zero or negative number of days was used as an autopay recurrence.
    #[error("the autopay recurrence must be a positive number of days, got {0}")]
    InvalidRecurrence(i64),

    /// A transaction was flagged as autopay without a recurrence.
    #[error("autopay transactions must have a recurrence in days")]
    AutopayRequiresRecurrence,

    /// A negative monthly budget was given for a user.
    #[error("the monthly budget must not be negative, got {0}")]
    InvalidBudget(f64),

    /// A negative income was given for a user.
    #[error("the income must not be negative, got {0}")]
    InvalidIncome(f64),

    /// A zero or negative number of days was used as a notification
    /// retention period.
    #[error("the retention period must be a positive number of days, got {0}")]
    InvalidRetentionDays(i64),

    /// The user's subscription tier does not include the requested feature.
    #[error("the {0} feature is not included in the user's subscription tier")]
    NotEntitled(Feature),

    /// The requested job name does not match a scheduled job.
    #[error("there is no scheduled job named \"{0}\"")]
    UnknownJob(String),

    /// The specified email address already belongs to a registered user.
    #[error("the email address is already registered")]
    DuplicateEmail,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An email could not be handed to the mail transport.
    #[error("could not deliver email: {0}")]
    EmailDeliveryError(String),

    /// Tried to update a user that does not exist
    #[error("tried to update a user that is not in the database")]
    UpdateMissingUser,

    /// Tried to delete a user that does not exist
    #[error("tried to delete a user that is not in the database")]
    DeleteMissingUser,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound
            | Error::UnknownJob(_)
            | Error::UpdateMissingUser
            | Error::DeleteMissingUser
            | Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction => StatusCode::NOT_FOUND,
            Error::InvalidEmail(_)
            | Error::InvalidTier(_)
            | Error::InvalidTransactionKind(_)
            | Error::InvalidNotificationKind(_)
            | Error::InvalidAmount(_)
            | Error::InvalidRecurrence(_)
            | Error::AutopayRequiresRecurrence
            | Error::InvalidBudget(_)
            | Error::InvalidIncome(_)
            | Error::InvalidRetentionDays(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DuplicateEmail => StatusCode::CONFLICT,
            Error::NotEntitled(_) => StatusCode::FORBIDDEN,
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {error}");
                let body = Json(json!({"error": "an internal error occurred"}));

                return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
            }
        };

        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
