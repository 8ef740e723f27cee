//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, database_id::TransactionId, user::UserID};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money left or entered the user's account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money spent, e.g. rent or groceries.
    Debit,
    /// Money earned, e.g. salary or savings.
    Credit,
}

impl TransactionKind {
    /// The name of the kind as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Credit => "credit",
        }
    }

    /// The verb used in notification copy, e.g. "$5.00 has been debited".
    pub fn verb(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debited",
            TransactionKind::Credit => "credited",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "debit" => Ok(TransactionKind::Debit),
            "credit" => Ok(TransactionKind::Credit),
            _ => Err(Error::InvalidTransactionKind(text.to_owned())),
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The ID of the user the transaction belongs to.
    pub user_id: UserID,
    /// Whether money was spent or earned.
    pub kind: TransactionKind,
    /// The amount of money spent or earned in this transaction. Always positive.
    pub amount: f64,
    /// A short label for what the transaction was for, e.g. "Rent".
    pub label: String,
    /// A longer free-form description of the transaction.
    pub description: String,
    /// When the transaction happened.
    ///
    /// For autopay templates this is the date the template was last applied,
    /// or the date it was set up if it has never been applied.
    pub date: Date,
    /// The category the transaction belongs to, e.g. "Groceries".
    pub category: String,
    /// Whether this transaction is an autopay template rather than a spend or
    /// income event.
    pub is_autopay: bool,
    /// How often an autopay template repeats, in days. Zero for one-off
    /// transactions.
    pub recurrence_days: i64,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(kind: TransactionKind, amount: f64, date: Date, label: &str) -> TransactionBuilder {
        TransactionBuilder {
            kind,
            amount,
            date,
            label: label.to_owned(),
            description: String::new(),
            category: String::new(),
            is_autopay: false,
            recurrence_days: 0,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// The description and category default to empty strings, and the transaction
/// is a one-off unless [TransactionBuilder::autopay] is called.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// Whether money was spent or earned.
    pub kind: TransactionKind,

    /// The monetary amount of the transaction.
    ///
    /// Amounts are always positive. Whether the money left or entered the
    /// account is carried by `kind`, not by the sign of the amount.
    ///
    /// # Examples
    /// - `150.00` with [TransactionKind::Credit] - Salary deposit
    /// - `45.99` with [TransactionKind::Debit] - Coffee shop purchase
    pub amount: f64,

    /// The date when the transaction occurred.
    pub date: Date,

    /// A short label for what the transaction was for.
    ///
    /// # Examples
    /// - `"Rent"`
    /// - `"Salary - January 2025"`
    pub label: String,

    /// A longer free-form description of the transaction.
    pub description: String,

    /// The category of the transaction, e.g. "Groceries", "Transport", "Rent".
    pub category: String,

    /// Whether this transaction is an autopay template.
    pub is_autopay: bool,

    /// How often the autopay template repeats, in days.
    pub recurrence_days: i64,
}

impl TransactionBuilder {
    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// Set the category for the transaction.
    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self
    }

    /// Mark the transaction as an autopay template that repeats every
    /// `recurrence_days` days.
    pub fn autopay(mut self, recurrence_days: i64) -> Self {
        self.is_autopay = true;
        self.recurrence_days = recurrence_days;
        self
    }
}

/// The fields of a transaction that [update_transaction] may replace.
///
/// Fields set to `None` keep their current value. The autopay fields cannot
/// be changed after creation, delete the transaction and create a new one
/// instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// The new transaction kind.
    pub kind: Option<TransactionKind>,
    /// The new amount in dollars.
    pub amount: Option<f64>,
    /// The new label.
    pub label: Option<String>,
    /// The new description.
    pub description: Option<String>,
    /// The new category.
    pub category: Option<String>,
    /// The new transaction date.
    pub date: Option<Date>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                label TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                is_autopay INTEGER NOT NULL DEFAULT 0,
                recurrence_days INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    // Composite index used by the budget and savings queries.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Transaction].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let raw_user_id = row.get(1)?;
    let kind = row.get(2)?;
    let amount = row.get(3)?;
    let label = row.get(4)?;
    let description = row.get(5)?;
    let date = row.get(6)?;
    let category = row.get(7)?;
    let is_autopay = row.get(8)?;
    let recurrence_days = row.get(9)?;

    Ok(Transaction {
        id,
        user_id: UserID::new(raw_user_id),
        kind,
        amount,
        label,
        description,
        date,
        category,
        is_autopay,
        recurrence_days,
    })
}

/// Create a new transaction for `user_id` in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the builder's amount is zero or negative,
/// - or [Error::InvalidRecurrence] if the builder's recurrence is negative,
/// - or [Error::AutopayRequiresRecurrence] if the builder is an autopay
///   template without a positive recurrence,
/// - or [Error::NotFound] if `user_id` does not belong to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    user_id: UserID,
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if builder.amount <= 0.0 {
        return Err(Error::InvalidAmount(builder.amount));
    }

    if builder.recurrence_days < 0 {
        return Err(Error::InvalidRecurrence(builder.recurrence_days));
    }

    if builder.is_autopay && builder.recurrence_days == 0 {
        return Err(Error::AutopayRequiresRecurrence);
    }

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (user_id, kind, amount, label, description, date,
                 category, is_autopay, recurrence_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id, user_id, kind, amount, label, description, date, category,
                 is_autopay, recurrence_days",
        )?
        .query_row(
            (
                user_id.as_i64(),
                builder.kind,
                builder.amount,
                builder.label,
                builder.description,
                builder.date,
                builder.category,
                builder.is_autopay,
                builder.recurrence_days,
            ),
            map_transaction_row,
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

    Ok(transaction)
}

/// Retrieve the transaction with `transaction_id` belonging to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the transaction does not exist or belongs to a
///   different user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_transaction(
    user_id: UserID,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "SELECT id, user_id, kind, amount, label, description, date, category,
                 is_autopay, recurrence_days
             FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        )?
        .query_one((transaction_id, user_id.as_i64()), map_transaction_row)?;

    Ok(transaction)
}

/// Get all transactions belonging to `user_id`, newest first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_transactions(user_id: UserID, connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, kind, amount, label, description, date, category,
                 is_autopay, recurrence_days
             FROM \"transaction\" WHERE user_id = ?1
             ORDER BY date DESC, id DESC",
        )?
        .query_map((user_id.as_i64(),), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Get the autopay templates belonging to `user_id`.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_autopay_templates(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, kind, amount, label, description, date, category,
                 is_autopay, recurrence_days
             FROM \"transaction\" WHERE user_id = ?1 AND is_autopay = 1
             ORDER BY id ASC",
        )?
        .query_map((user_id.as_i64(),), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Replace the fields of the transaction `transaction_id` with the values set
/// in `update`.
///
/// Fields that are `None` in `update` keep their current value.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if the transaction does not exist or
///   belongs to a different user,
/// - or [Error::InvalidAmount] if the new amount is zero or negative,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    user_id: UserID,
    transaction_id: TransactionId,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let mut transaction = match get_transaction(user_id, transaction_id, connection) {
        Ok(transaction) => transaction,
        Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
        Err(error) => return Err(error),
    };

    if let Some(kind) = update.kind {
        transaction.kind = kind;
    }

    if let Some(amount) = update.amount {
        if amount <= 0.0 {
            return Err(Error::InvalidAmount(amount));
        }

        transaction.amount = amount;
    }

    if let Some(label) = update.label {
        transaction.label = label;
    }

    if let Some(description) = update.description {
        transaction.description = description;
    }

    if let Some(category) = update.category {
        transaction.category = category;
    }

    if let Some(date) = update.date {
        transaction.date = date;
    }

    connection.execute(
        "UPDATE \"transaction\" SET kind = ?1, amount = ?2, label = ?3, description = ?4,
             category = ?5, date = ?6
         WHERE id = ?7 AND user_id = ?8",
        (
            transaction.kind,
            transaction.amount,
            &transaction.label,
            &transaction.description,
            &transaction.category,
            transaction.date,
            transaction.id,
            transaction.user_id.as_i64(),
        ),
    )?;

    Ok(transaction)
}

/// Delete the transaction `transaction_id` belonging to `user_id`.
///
/// Returns the deleted transaction so that callers can react to what was
/// removed, e.g. notify the user when an autopay template is cancelled.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTransaction] if the transaction does not exist or
///   belongs to a different user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_transaction(
    user_id: UserID,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = match get_transaction(user_id, transaction_id, connection) {
        Ok(transaction) => transaction,
        Err(Error::NotFound) => return Err(Error::DeleteMissingTransaction),
        Err(error) => return Err(error),
    };

    connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (transaction_id, user_id.as_i64()),
    )?;

    Ok(transaction)
}

/// Sum the amounts of `user_id`'s transactions of `kind` dated within
/// `start..=end`.
///
/// Autopay templates are not counted, they are not spend or income events.
/// Pass `exclude` to leave a single transaction out of the sum, e.g. the
/// transaction currently being assessed against the budget.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn sum_amount_in_range(
    user_id: UserID,
    kind: TransactionKind,
    start: Date,
    end: Date,
    exclude: Option<TransactionId>,
    connection: &Connection,
) -> Result<f64, Error> {
    let total = connection
        .prepare(
            "SELECT COALESCE(SUM(amount), 0) FROM \"transaction\"
             WHERE user_id = ?1 AND kind = ?2 AND is_autopay = 0
                 AND date >= ?3 AND date <= ?4
                 AND (?5 IS NULL OR id != ?5)",
        )?
        .query_one(
            (user_id.as_i64(), kind, start, end, exclude),
            |row| row.get(0),
        )?;

    Ok(total)
}

/// Check whether `user_id` has a transaction labelled `label` dated within
/// `start..=end`.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn label_exists_in_range(
    user_id: UserID,
    label: &str,
    start: Date,
    end: Date,
    connection: &Connection,
) -> Result<bool, Error> {
    let exists = connection
        .prepare(
            "SELECT EXISTS (
                 SELECT 1 FROM \"transaction\"
                 WHERE user_id = ?1 AND label = ?2 AND date >= ?3 AND date <= ?4
             )",
        )?
        .query_one((user_id.as_i64(), label, start, end), |row| row.get(0))?;

    Ok(exists)
}

/// Move the anchor date of the autopay template `transaction_id` to `new_date`.
///
/// Applying a template advances its anchor date to the day it was applied, so
/// a template is never applied twice for the same period.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn advance_autopay_template(
    transaction_id: TransactionId,
    new_date: Date,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE \"transaction\" SET date = ?1 WHERE id = ?2 AND is_autopay = 1",
        (new_date, transaction_id),
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
