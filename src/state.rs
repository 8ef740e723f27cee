//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{Error, db, mail::MailTransport, timezone::get_local_offset};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
    /// The transport used to deliver email notifications.
    pub mail: Arc<dyn MailTransport>,
    /// The canonical timezone string (e.g. "Pacific/Auckland") used to decide
    /// the local date for budget maths and scheduled jobs.
    pub local_timezone: String,
}

impl AppState {
    /// Create a new [AppState] over `connection`, creating the application
    /// tables if they do not already exist.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidTimezoneError] if `local_timezone` is not a canonical
    ///   timezone string,
    /// - [Error::SqlError] if the database could not be initialized.
    pub fn new(
        connection: Connection,
        mail: Arc<dyn MailTransport>,
        local_timezone: &str,
    ) -> Result<Self, Error> {
        if get_local_offset(local_timezone).is_none() {
            return Err(Error::InvalidTimezoneError(local_timezone.to_owned()));
        }

        db::initialize(&connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(connection)),
            mail,
            local_timezone: local_timezone.to_owned(),
        })
    }
}
