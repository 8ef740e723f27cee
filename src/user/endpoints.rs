//! Defines the JSON API endpoints for managing user accounts.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState, Error,
    email::Email,
    mail::MailMessage,
    notification::{NotificationKind, notify},
    user::{
        Tier, User, UserID, UserUpdate, create_user, delete_user, get_user_by_id, update_user,
    },
};

/// The request body for registering a new user account.
///
/// These are the only fields an API client can set. Everything else on
/// [User] is managed by the server.
#[derive(Debug, Deserialize)]
pub struct CreateUser {
    /// The user's display name.
    pub full_name: String,
    /// The user's email address.
    pub email: String,
    /// The subscription tier, defaults to "free".
    pub tier: Option<String>,
    /// The monthly spending budget in dollars.
    pub monthly_budget: Option<f64>,
    /// The base monthly income in dollars.
    pub income: Option<f64>,
}

/// The request body for updating a user account.
///
/// Fields left out of the request keep their current value. Fields not listed
/// here are ignored.
#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    /// The new display name.
    pub full_name: Option<String>,
    /// The new email address.
    pub email: Option<String>,
    /// The new subscription tier.
    pub tier: Option<String>,
    /// The new monthly spending budget in dollars.
    pub monthly_budget: Option<f64>,
    /// The new base monthly income in dollars.
    pub income: Option<f64>,
    /// Whether reminder notifications are sent.
    pub notifications_enabled: Option<bool>,
    /// Whether notifications are also emailed.
    pub email_notifications_enabled: Option<bool>,
}

/// A route handler for registering a new user account.
///
/// Records a welcome notification for the new user and sends a welcome email.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidEmail] (422) if the email address is not valid,
/// - or [Error::InvalidTier] (422) if the tier is not a known subscription tier,
/// - or [Error::InvalidBudget] (422) if the monthly budget is negative,
/// - or [Error::InvalidIncome] (422) if the income is negative,
/// - or [Error::DuplicateEmail] (409) if the email address is already registered.
pub async fn create_user_endpoint(
    State(state): State<AppState>,
    Json(request): Json<CreateUser>,
) -> Result<impl IntoResponse, Error> {
    let email = Email::new(&request.email)?;
    let tier = match &request.tier {
        Some(tier) => tier.parse()?,
        None => Tier::default(),
    };

    let mut builder = User::build(&request.full_name, email).tier(tier);

    if let Some(monthly_budget) = request.monthly_budget {
        builder = builder.monthly_budget(monthly_budget);
    }

    if let Some(income) = request.income {
        builder = builder.income(income);
    }

    let user = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        create_user(builder, &connection)?
    };

    if let Err(error) = notify(
        &state,
        &user,
        "Welcome to Spendeur",
        "Your account has been created. Set a monthly budget to start tracking your spending.",
        NotificationKind::Auth,
        Some(MailMessage::welcome(&user)),
    )
    .await
    {
        tracing::warn!("Could not send welcome notification to user {}: {error}", user.id);
    }

    Ok((StatusCode::CREATED, Json(user)))
}

/// A route handler for fetching a user account by its ID.
///
/// # Errors
/// This function will return a [Error::NotFound] (404) if `user_id` does not
/// belong to a registered user.
pub async fn get_user_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let user = get_user_by_id(UserID::new(user_id), &connection)?;

    Ok(Json(user))
}

/// A route handler for updating a user account.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingUser] (404) if `user_id` does not belong to a registered user,
/// - or [Error::InvalidEmail] (422) if the new email address is not valid,
/// - or [Error::InvalidTier] (422) if the new tier is not a known subscription tier,
/// - or [Error::DuplicateEmail] (409) if the new email address belongs to another user.
pub async fn update_user_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdateUser>,
) -> Result<Json<User>, Error> {
    let email = match &request.email {
        Some(email) => Some(Email::new(email)?),
        None => None,
    };
    let tier = match &request.tier {
        Some(tier) => Some(tier.parse::<Tier>()?),
        None => None,
    };

    let update = UserUpdate {
        full_name: request.full_name,
        email,
        tier,
        monthly_budget: request.monthly_budget,
        income: request.income,
        notifications_enabled: request.notifications_enabled,
        email_notifications_enabled: request.email_notifications_enabled,
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let user = update_user(UserID::new(user_id), update, &connection)?;

    Ok(Json(user))
}

/// A route handler for deleting a user account.
///
/// The user's transactions and notifications are deleted along with the
/// account.
///
/// # Errors
/// This function will return a [Error::DeleteMissingUser] (404) if `user_id`
/// does not belong to a registered user.
pub async fn delete_user_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    delete_user(UserID::new(user_id), &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod endpoint_tests {
    use std::sync::Arc;

    use axum::{
        Router,
        http::StatusCode,
        routing::{delete, get, post, put},
    };
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        AppState, endpoints,
        mail::{EmailKind, MemoryMail},
        user::{
            Tier, User, create_user_endpoint, delete_user_endpoint, get_user_endpoint,
            update_user_endpoint,
        },
    };

    fn get_test_state() -> (AppState, Arc<MemoryMail>) {
        let mail = Arc::new(MemoryMail::new());
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        let state =
            AppState::new(conn, mail.clone(), "UTC").expect("Could not create app state");

        (state, mail)
    }

    fn get_test_server(state: AppState) -> TestServer {
        let app = Router::new()
            .route(endpoints::USERS, post(create_user_endpoint))
            .route(endpoints::USER, get(get_user_endpoint))
            .route(endpoints::USER, put(update_user_endpoint))
            .route(endpoints::USER, delete(delete_user_endpoint))
            .with_state(state);

        TestServer::try_new(app).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn create_user_succeeds() {
        let (state, mail) = get_test_state();
        let server = get_test_server(state);

        let response = server
            .post(endpoints::USERS)
            .json(&json!({
                "full_name": "Ada Lovelace",
                "email": "ada@example.com",
                "monthly_budget": 1000.0,
                "income": 5000.0,
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let user: User = response.json();
        assert_eq!(user.full_name, "Ada Lovelace");
        assert_eq!(user.email.as_ref(), "ada@example.com");
        assert_eq!(user.tier, Tier::Free);
        assert_eq!(user.monthly_budget, Some(1000.0));
        assert_eq!(user.income, 5000.0);

        let sent = mail.sent();
        assert_eq!(sent.len(), 1, "want one welcome email, got {}", sent.len());
        assert_eq!(sent[0].kind, EmailKind::Welcome);
        assert_eq!(sent[0].to.as_ref(), "ada@example.com");
    }

    #[tokio::test]
    async fn create_user_records_welcome_notification() {
        let (state, _) = get_test_state();
        let server = get_test_server(state.clone());

        let response = server
            .post(endpoints::USERS)
            .json(&json!({
                "full_name": "Ada Lovelace",
                "email": "ada@example.com",
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let user: User = response.json();

        let connection = state.db_connection.lock().unwrap();
        let notifications = crate::notification::get_notifications(user.id, &connection)
            .expect("Could not list notifications");
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Welcome to Spendeur");
    }

    #[tokio::test]
    async fn create_user_fails_with_invalid_email() {
        let (state, mail) = get_test_state();
        let server = get_test_server(state);

        let response = server
            .post(endpoints::USERS)
            .json(&json!({
                "full_name": "Ada Lovelace",
                "email": "not-an-email",
            }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(mail.sent().is_empty());
    }

    #[tokio::test]
    async fn create_user_fails_with_unknown_tier() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);

        let response = server
            .post(endpoints::USERS)
            .json(&json!({
                "full_name": "Ada Lovelace",
                "email": "ada@example.com",
                "tier": "platinum",
            }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn create_user_fails_with_duplicate_email() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);
        server
            .post(endpoints::USERS)
            .json(&json!({"full_name": "Ada", "email": "ada@example.com"}))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post(endpoints::USERS)
            .json(&json!({"full_name": "Also Ada", "email": "ada@example.com"}))
            .await;

        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn get_user_succeeds() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);
        let created: User = server
            .post(endpoints::USERS)
            .json(&json!({"full_name": "Ada", "email": "ada@example.com"}))
            .await
            .json();

        let response = server
            .get(&endpoints::format_endpoint(
                endpoints::USER,
                created.id.as_i64(),
            ))
            .await;

        response.assert_status_ok();
        let user: User = response.json();
        assert_eq!(user, created);
    }

    #[tokio::test]
    async fn get_user_fails_with_non_existent_id() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);

        let response = server
            .get(&endpoints::format_endpoint(endpoints::USER, 42))
            .await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn update_user_replaces_given_fields() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);
        let created: User = server
            .post(endpoints::USERS)
            .json(&json!({"full_name": "Ada", "email": "ada@example.com", "income": 4000.0}))
            .await
            .json();

        let response = server
            .put(&endpoints::format_endpoint(
                endpoints::USER,
                created.id.as_i64(),
            ))
            .json(&json!({"tier": "premium", "monthly_budget": 1500.0}))
            .await;

        response.assert_status_ok();
        let user: User = response.json();
        assert_eq!(user.tier, Tier::Premium);
        assert_eq!(user.monthly_budget, Some(1500.0));
        assert_eq!(user.full_name, "Ada");
        assert_eq!(user.income, 4000.0);
    }

    #[tokio::test]
    async fn update_user_ignores_unlisted_fields() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);
        let created: User = server
            .post(endpoints::USERS)
            .json(&json!({"full_name": "Ada", "email": "ada@example.com"}))
            .await
            .json();

        let response = server
            .put(&endpoints::format_endpoint(
                endpoints::USER,
                created.id.as_i64(),
            ))
            .json(&json!({"id": 999, "is_admin": true}))
            .await;

        response.assert_status_ok();
        let user: User = response.json();
        assert_eq!(user, created, "want unlisted fields to be ignored");
    }

    #[tokio::test]
    async fn update_user_fails_with_non_existent_id() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);

        let response = server
            .put(&endpoints::format_endpoint(endpoints::USER, 42))
            .json(&json!({"full_name": "Nobody"}))
            .await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn delete_user_succeeds() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);
        let created: User = server
            .post(endpoints::USERS)
            .json(&json!({"full_name": "Ada", "email": "ada@example.com"}))
            .await
            .json();
        let user_endpoint = endpoints::format_endpoint(endpoints::USER, created.id.as_i64());

        let response = server.delete(&user_endpoint).await;

        response.assert_status(StatusCode::NO_CONTENT);
        server.get(&user_endpoint).await.assert_status_not_found();
    }

    #[tokio::test]
    async fn delete_user_fails_with_non_existent_id() {
        let (state, _) = get_test_state();
        let server = get_test_server(state);

        let response = server
            .delete(&endpoints::format_endpoint(endpoints::USER, 42))
            .await;

        response.assert_status_not_found();
    }
}
