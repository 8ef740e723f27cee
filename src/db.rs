//! Create and configure the application database.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    Error, notification::create_notification_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Create the application tables if they do not already exist.
///
/// Foreign key enforcement is switched on for the connection so that deleting
/// a user also deletes their transactions and notifications.
///
/// # Errors
/// This function will return a [Error::SqlError] if the tables could not be
/// created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    // SQLite leaves foreign keys off unless each connection opts in.
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_notification_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
