//! Defines the core data models and database queries for user accounts.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

use crate::{Error, email::Email};

// ============================================================================
// MODELS
// ============================================================================

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The subscription tier of a user account.
///
/// Tiers gate access to paid features, see [is_entitled].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The tier assigned to new accounts.
    #[default]
    Free,
    /// The entry-level paid tier.
    Plus,
    /// The top paid tier.
    Premium,
}

impl Tier {
    /// The name of the tier as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Plus => "plus",
            Tier::Premium => "premium",
        }
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "free" => Ok(Tier::Free),
            "plus" => Ok(Tier::Plus),
            "premium" => Ok(Tier::Premium),
            _ => Err(Error::InvalidTier(text.to_owned())),
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Tier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Tier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// A feature that is only available on certain subscription tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feature {
    /// Recurring transactions that the server materializes on schedule.
    Autopay,
}

impl Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Autopay => f.write_str("Autopay"),
        }
    }
}

/// Check whether `tier` grants access to `feature`.
pub fn is_entitled(tier: Tier, feature: Feature) -> bool {
    match feature {
        Feature::Autopay => tier == Tier::Premium,
    }
}

/// A user of the application.
///
/// To create a new `User`, use [User::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's display name.
    pub full_name: String,
    /// The user's email address.
    pub email: Email,
    /// The subscription tier the user is on.
    pub tier: Tier,
    /// How much the user intends to spend each month, if they have set a budget.
    pub monthly_budget: Option<f64>,
    /// The user's base monthly income.
    pub income: f64,
    /// Whether the user wants to receive reminder notifications.
    pub notifications_enabled: bool,
    /// Whether notifications should also be delivered to the user's email address.
    pub email_notifications_enabled: bool,
}

impl User {
    /// Create a new user.
    ///
    /// Shortcut for [UserBuilder] for discoverability.
    pub fn build(full_name: &str, email: Email) -> UserBuilder {
        UserBuilder {
            full_name: full_name.to_owned(),
            email,
            tier: Tier::default(),
            monthly_budget: None,
            income: 0.0,
            notifications_enabled: true,
            email_notifications_enabled: true,
        }
    }
}

/// A builder for creating [User] instances.
///
/// Optional fields default to the values a brand new account gets: the free
/// tier, no budget, zero income, and both notification channels switched on.
#[derive(Debug, PartialEq, Clone)]
pub struct UserBuilder {
    /// The user's display name.
    pub full_name: String,
    /// The user's email address.
    pub email: Email,
    /// The subscription tier, defaults to [Tier::Free].
    pub tier: Tier,
    /// The monthly spending budget in dollars, defaults to no budget.
    pub monthly_budget: Option<f64>,
    /// The base monthly income in dollars, defaults to zero.
    pub income: f64,
    /// Whether reminder notifications are sent, defaults to true.
    pub notifications_enabled: bool,
    /// Whether notifications are also emailed, defaults to true.
    pub email_notifications_enabled: bool,
}

impl UserBuilder {
    /// Set the subscription tier for the user.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Set the monthly spending budget for the user.
    pub fn monthly_budget(mut self, monthly_budget: f64) -> Self {
        self.monthly_budget = Some(monthly_budget);
        self
    }

    /// Set the base monthly income for the user.
    pub fn income(mut self, income: f64) -> Self {
        self.income = income;
        self
    }

    /// Set whether the user receives reminder notifications.
    pub fn notifications_enabled(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    /// Set whether notifications are also emailed to the user.
    pub fn email_notifications_enabled(mut self, enabled: bool) -> Self {
        self.email_notifications_enabled = enabled;
        self
    }
}

/// The fields of a user account that [update_user] may replace.
///
/// Fields set to `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    /// The new display name.
    pub full_name: Option<String>,
    /// The new email address.
    pub email: Option<Email>,
    /// The new subscription tier.
    pub tier: Option<Tier>,
    /// The new monthly spending budget in dollars.
    pub monthly_budget: Option<f64>,
    /// The new base monthly income in dollars.
    pub income: Option<f64>,
    /// Whether reminder notifications are sent.
    pub notifications_enabled: Option<bool>,
    /// Whether notifications are also emailed.
    pub email_notifications_enabled: Option<bool>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the user table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                tier TEXT NOT NULL DEFAULT 'free',
                monthly_budget REAL,
                income REAL NOT NULL DEFAULT 0,
                notifications_enabled INTEGER NOT NULL DEFAULT 1,
                email_notifications_enabled INTEGER NOT NULL DEFAULT 1
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('user', 0)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [User].
pub fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_id = row.get(0)?;
    let full_name = row.get(1)?;
    let raw_email: String = row.get(2)?;
    let tier = row.get(3)?;
    let monthly_budget = row.get(4)?;
    let income = row.get(5)?;
    let notifications_enabled = row.get(6)?;
    let email_notifications_enabled = row.get(7)?;

    Ok(User {
        id: UserID::new(raw_id),
        full_name,
        email: Email::new_unchecked(raw_email),
        tier,
        monthly_budget,
        income,
        notifications_enabled,
        email_notifications_enabled,
    })
}

/// Create a new user in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidBudget] if the builder's monthly budget is negative,
/// - or [Error::InvalidIncome] if the builder's income is negative,
/// - or [Error::DuplicateEmail] if a user with the same email address already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_user(builder: UserBuilder, connection: &Connection) -> Result<User, Error> {
    if let Some(monthly_budget) = builder.monthly_budget
        && monthly_budget < 0.0
    {
        return Err(Error::InvalidBudget(monthly_budget));
    }

    if builder.income < 0.0 {
        return Err(Error::InvalidIncome(builder.income));
    }

    let user = connection
        .prepare(
            "INSERT INTO user (full_name, email, tier, monthly_budget, income,
                 notifications_enabled, email_notifications_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id, full_name, email, tier, monthly_budget, income,
                 notifications_enabled, email_notifications_enabled",
        )?
        .query_row(
            (
                builder.full_name,
                builder.email.as_ref(),
                builder.tier,
                builder.monthly_budget,
                builder.income,
                builder.notifications_enabled,
                builder.email_notifications_enabled,
            ),
            map_user_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateEmail,
            error => error.into(),
        })?;

    Ok(user)
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `user_id` does not belong to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    let user = connection
        .prepare(
            "SELECT id, full_name, email, tier, monthly_budget, income,
                 notifications_enabled, email_notifications_enabled
             FROM user WHERE id = :id",
        )?
        .query_one(&[(":id", &user_id.as_i64())], map_user_row)?;

    Ok(user)
}

/// Get every registered user, ordered by ID.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_all_users(connection: &Connection) -> Result<Vec<User>, Error> {
    connection
        .prepare(
            "SELECT id, full_name, email, tier, monthly_budget, income,
                 notifications_enabled, email_notifications_enabled
             FROM user ORDER BY id ASC",
        )?
        .query_map([], map_user_row)?
        .map(|maybe_user| maybe_user.map_err(|error| error.into()))
        .collect()
}

/// Replace the fields of the user `user_id` with the values set in `update`.
///
/// Fields that are `None` in `update` keep their current value.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingUser] if `user_id` does not belong to a registered user,
/// - or [Error::InvalidBudget] if the new monthly budget is negative,
/// - or [Error::InvalidIncome] if the new income is negative,
/// - or [Error::DuplicateEmail] if the new email address belongs to another user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_user(
    user_id: UserID,
    update: UserUpdate,
    connection: &Connection,
) -> Result<User, Error> {
    let mut user = match get_user_by_id(user_id, connection) {
        Ok(user) => user,
        Err(Error::NotFound) => return Err(Error::UpdateMissingUser),
        Err(error) => return Err(error),
    };

    if let Some(full_name) = update.full_name {
        user.full_name = full_name;
    }

    if let Some(email) = update.email {
        user.email = email;
    }

    if let Some(tier) = update.tier {
        user.tier = tier;
    }

    if let Some(monthly_budget) = update.monthly_budget {
        if monthly_budget < 0.0 {
            return Err(Error::InvalidBudget(monthly_budget));
        }

        user.monthly_budget = Some(monthly_budget);
    }

    if let Some(income) = update.income {
        if income < 0.0 {
            return Err(Error::InvalidIncome(income));
        }

        user.income = income;
    }

    if let Some(notifications_enabled) = update.notifications_enabled {
        user.notifications_enabled = notifications_enabled;
    }

    if let Some(email_notifications_enabled) = update.email_notifications_enabled {
        user.email_notifications_enabled = email_notifications_enabled;
    }

    connection
        .execute(
            "UPDATE user SET full_name = ?1, email = ?2, tier = ?3, monthly_budget = ?4,
                 income = ?5, notifications_enabled = ?6, email_notifications_enabled = ?7
             WHERE id = ?8",
            (
                &user.full_name,
                user.email.as_ref(),
                user.tier,
                user.monthly_budget,
                user.income,
                user.notifications_enabled,
                user.email_notifications_enabled,
                user.id.as_i64(),
            ),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateEmail,
            error => error.into(),
        })?;

    Ok(user)
}

/// Delete the user `user_id` from the database.
///
/// Transactions and notifications belonging to the user are deleted by the
/// cascade rules on those tables.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingUser] if `user_id` does not belong to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_user(user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM user WHERE id = ?1", (user_id.as_i64(),))?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingUser);
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tier_tests {
    use crate::{
        Error,
        user::{Feature, Tier, is_entitled},
    };

    #[test]
    fn parse_round_trips_every_tier() {
        for tier in [Tier::Free, Tier::Plus, Tier::Premium] {
            assert_eq!(Ok(tier), tier.as_str().parse());
        }
    }

    #[test]
    fn parse_fails_with_unknown_tier() {
        let result: Result<Tier, Error> = "platinum".parse();

        assert_eq!(result, Err(Error::InvalidTier("platinum".to_owned())));
    }

    #[test]
    fn premium_is_entitled_to_autopay() {
        assert!(is_entitled(Tier::Premium, Feature::Autopay));
    }

    #[test]
    fn free_and_plus_are_not_entitled_to_autopay() {
        assert!(!is_entitled(Tier::Free, Feature::Autopay));
        assert!(!is_entitled(Tier::Plus, Feature::Autopay));
    }
}

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        db::initialize,
        email::Email,
        user::{
            Tier, User, UserID, UserUpdate, create_user, delete_user, get_all_users,
            get_user_by_id, update_user,
        },
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn test_email(address: &str) -> Email {
        Email::new(address).expect("Could not create email")
    }

    #[test]
    fn create_succeeds() {
        let conn = get_test_connection();

        let result = create_user(
            User::build("Ada Lovelace", test_email("ada@example.com"))
                .tier(Tier::Premium)
                .monthly_budget(1000.0)
                .income(5000.0),
            &conn,
        );

        match result {
            Ok(user) => {
                assert!(user.id.as_i64() > 0);
                assert_eq!(user.full_name, "Ada Lovelace");
                assert_eq!(user.email, test_email("ada@example.com"));
                assert_eq!(user.tier, Tier::Premium);
                assert_eq!(user.monthly_budget, Some(1000.0));
                assert_eq!(user.income, 5000.0);
                assert!(user.notifications_enabled);
                assert!(user.email_notifications_enabled);
            }
            Err(error) => panic!("Unexpected error: {error}"),
        }
    }

    #[test]
    fn create_uses_free_tier_by_default() {
        let conn = get_test_connection();

        let user = create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");

        assert_eq!(user.tier, Tier::Free);
        assert_eq!(user.monthly_budget, None);
        assert_eq!(user.income, 0.0);
    }

    #[test]
    fn create_fails_on_duplicate_email() {
        let conn = get_test_connection();
        create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");

        let duplicate_user = create_user(
            User::build("Also Ada", test_email("ada@example.com")),
            &conn,
        );

        assert_eq!(duplicate_user, Err(Error::DuplicateEmail));
    }

    #[test]
    fn create_fails_on_negative_budget() {
        let conn = get_test_connection();

        let result = create_user(
            User::build("Ada", test_email("ada@example.com")).monthly_budget(-50.0),
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidBudget(-50.0)));
    }

    #[test]
    fn create_accepts_a_zero_budget() {
        let conn = get_test_connection();

        let user = create_user(
            User::build("Ada", test_email("ada@example.com")).monthly_budget(0.0),
            &conn,
        )
        .expect("Could not create user");

        assert_eq!(user.monthly_budget, Some(0.0));
    }

    #[test]
    fn create_fails_on_negative_income() {
        let conn = get_test_connection();

        let result = create_user(
            User::build("Ada", test_email("ada@example.com")).income(-1.0),
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidIncome(-1.0)));
    }

    #[test]
    fn get_user_fails_with_non_existent_id() {
        let conn = get_test_connection();

        let result = get_user_by_id(UserID::new(42), &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn get_user_succeeds_with_existing_id() {
        let conn = get_test_connection();
        let test_user = create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");

        let retrieved_user =
            get_user_by_id(test_user.id, &conn).expect("Could not retrieve user by ID");

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn get_all_users_returns_users_in_id_order() {
        let conn = get_test_connection();
        let first = create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");
        let second = create_user(User::build("Grace", test_email("grace@example.com")), &conn)
            .expect("Could not create user");

        let users = get_all_users(&conn).expect("Could not list users");

        assert_eq!(users, vec![first, second]);
    }

    #[test]
    fn update_replaces_only_given_fields() {
        let conn = get_test_connection();
        let user = create_user(
            User::build("Ada", test_email("ada@example.com")).income(4000.0),
            &conn,
        )
        .expect("Could not create user");

        let updated_user = update_user(
            user.id,
            UserUpdate {
                tier: Some(Tier::Premium),
                monthly_budget: Some(1500.0),
                ..Default::default()
            },
            &conn,
        )
        .expect("Could not update user");

        assert_eq!(updated_user.tier, Tier::Premium);
        assert_eq!(updated_user.monthly_budget, Some(1500.0));
        assert_eq!(updated_user.full_name, user.full_name);
        assert_eq!(updated_user.income, user.income);

        let stored_user = get_user_by_id(user.id, &conn).expect("Could not retrieve user by ID");
        assert_eq!(stored_user, updated_user);
    }

    #[test]
    fn update_fails_with_non_existent_id() {
        let conn = get_test_connection();

        let result = update_user(UserID::new(42), UserUpdate::default(), &conn);

        assert_eq!(result, Err(Error::UpdateMissingUser));
    }

    #[test]
    fn update_fails_with_email_of_another_user() {
        let conn = get_test_connection();
        create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");
        let other_user = create_user(User::build("Grace", test_email("grace@example.com")), &conn)
            .expect("Could not create user");

        let result = update_user(
            other_user.id,
            UserUpdate {
                email: Some(test_email("ada@example.com")),
                ..Default::default()
            },
            &conn,
        );

        assert_eq!(result, Err(Error::DuplicateEmail));
    }

    #[test]
    fn delete_removes_user() {
        let conn = get_test_connection();
        let user = create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");

        delete_user(user.id, &conn).expect("Could not delete user");

        assert_eq!(get_user_by_id(user.id, &conn), Err(Error::NotFound));
    }

    #[test]
    fn delete_fails_with_non_existent_id() {
        let conn = get_test_connection();

        let result = delete_user(UserID::new(42), &conn);

        assert_eq!(result, Err(Error::DeleteMissingUser));
    }

    #[test]
    fn delete_cascades_to_transactions_and_notifications() {
        let conn = get_test_connection();
        let user = create_user(User::build("Ada", test_email("ada@example.com")), &conn)
            .expect("Could not create user");
        crate::transaction::create_transaction(
            user.id,
            crate::transaction::Transaction::build(
                crate::transaction::TransactionKind::Debit,
                50.0,
                time::macros::date!(2025 - 06 - 01),
                "Rent",
            ),
            &conn,
        )
        .expect("Could not create transaction");
        crate::notification::create_notification(
            user.id,
            "Welcome",
            "Welcome to the app",
            crate::notification::NotificationKind::Auth,
            &conn,
        )
        .expect("Could not create notification");

        delete_user(user.id, &conn).expect("Could not delete user");

        let transaction_count: i64 = conn
            .query_one("SELECT COUNT(id) FROM \"transaction\"", [], |row| {
                row.get(0)
            })
            .expect("Could not count transactions");
        let notification_count: i64 = conn
            .query_one("SELECT COUNT(id) FROM notification", [], |row| row.get(0))
            .expect("Could not count notifications");

        assert_eq!(transaction_count, 0, "want transactions deleted with user");
        assert_eq!(
            notification_count, 0,
            "want notifications deleted with user"
        );
    }
}
