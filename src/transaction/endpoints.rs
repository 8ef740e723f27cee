//! Defines the JSON API endpoints for managing transactions and autopay
//! templates.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use time::Date;

use crate::{
    AppState, Error,
    budget::assess_transaction,
    currency::format_amount,
    notification::{NotificationKind, notify},
    timezone::local_today,
    transaction::{
        Transaction, TransactionKind, TransactionUpdate, create_transaction, delete_transaction,
        get_autopay_templates, get_transaction, get_transactions, update_transaction,
    },
    user::{Feature, UserID, get_user_by_id, is_entitled},
};

/// The request body for recording a new transaction.
#[derive(Debug, Deserialize)]
pub struct CreateTransaction {
    /// Whether money was spent ("debit") or earned ("credit").
    pub kind: String,
    /// The amount in dollars. Must be positive.
    pub amount: f64,
    /// A short label for what the transaction was for.
    pub label: String,
    /// A longer free-form description.
    pub description: Option<String>,
    /// The category the transaction belongs to.
    pub category: Option<String>,
    /// When the transaction happened, defaults to today.
    pub date: Option<Date>,
    /// Whether to create an autopay template instead of a one-off transaction.
    pub is_autopay: Option<bool>,
    /// How often the autopay template repeats, in days.
    pub recurrence_days: Option<i64>,
}

/// The request body for updating a transaction.
///
/// Fields left out of the request keep their current value. The autopay fields
/// cannot be changed, cancel the template and set up a new one instead.
#[derive(Debug, Deserialize)]
pub struct UpdateTransaction {
    /// The new transaction kind.
    pub kind: Option<String>,
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

/// A route handler for recording a new transaction or setting up an autopay
/// template.
///
/// Recording a debit assesses the user's spending against their monthly
/// budget, which may record a spending alert notification. Setting up an
/// autopay template records a confirmation notification instead.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] (404) if `user_id` does not belong to a registered user,
/// - or [Error::InvalidTransactionKind] (422) if the kind is not "debit" or "credit",
/// - or [Error::InvalidAmount] (422) if the amount is zero or negative,
/// - or [Error::AutopayRequiresRecurrence] (422) if an autopay template has no
///   positive recurrence,
/// - or [Error::NotEntitled] (403) if the user's tier does not include autopay.
pub async fn create_transaction_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<CreateTransaction>,
) -> Result<impl IntoResponse, Error> {
    let kind = request.kind.parse::<TransactionKind>()?;
    let is_autopay = request.is_autopay.unwrap_or(false);
    let date = match request.date {
        Some(date) => date,
        None => local_today(&state.local_timezone)?,
    };

    let (user, transaction) = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        let user = get_user_by_id(UserID::new(user_id), &connection)?;

        if is_autopay && !is_entitled(user.tier, Feature::Autopay) {
            return Err(Error::NotEntitled(Feature::Autopay));
        }

        let mut builder = Transaction::build(kind, request.amount, date, &request.label);

        if let Some(description) = &request.description {
            builder = builder.description(description);
        }

        if let Some(category) = &request.category {
            builder = builder.category(category);
        }

        if is_autopay {
            builder = builder.autopay(request.recurrence_days.unwrap_or(0));
        }

        let transaction = create_transaction(user.id, builder, &connection)?;

        (user, transaction)
    };

    if transaction.is_autopay {
        let description = format!(
            "Autopay has been set up for {} - {} every {} days",
            transaction.label,
            format_amount(transaction.amount),
            transaction.recurrence_days
        );

        if let Err(error) = notify(
            &state,
            &user,
            "Autopay Setup Complete",
            &description,
            NotificationKind::System,
            None,
        )
        .await
        {
            tracing::warn!(
                "Could not send autopay setup notification to user {}: {error}",
                user.id
            );
        }
    } else if transaction.kind == TransactionKind::Debit {
        let today = local_today(&state.local_timezone)?;

        if let Err(error) = assess_transaction(&state, &user, &transaction, today).await {
            tracing::warn!(
                "Could not assess transaction {} against the budget: {error}",
                transaction.id
            );
        }
    }

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for listing a user's transactions, newest first.
///
/// # Errors
/// This function will return a [Error::NotFound] (404) if `user_id` does not
/// belong to a registered user.
pub async fn get_transactions_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let user = get_user_by_id(UserID::new(user_id), &connection)?;
    let transactions = get_transactions(user.id, &connection)?;

    Ok(Json(transactions))
}

/// A route handler for fetching a single transaction.
///
/// # Errors
/// This function will return a [Error::NotFound] (404) if the transaction does
/// not exist or belongs to a different user.
pub async fn get_transaction_endpoint(
    State(state): State<AppState>,
    Path((user_id, transaction_id)): Path<(i64, i64)>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let transaction = get_transaction(UserID::new(user_id), transaction_id, &connection)?;

    Ok(Json(transaction))
}

/// A route handler for updating a transaction.
///
/// Changing the amount or kind of a debit re-assesses the user's spending
/// against their monthly budget.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] (404) if `user_id` does not belong to a registered user,
/// - or [Error::UpdateMissingTransaction] (404) if the transaction does not
///   exist or belongs to a different user,
/// - or [Error::InvalidTransactionKind] (422) if the new kind is not "debit"
///   or "credit",
/// - or [Error::InvalidAmount] (422) if the new amount is zero or negative.
pub async fn update_transaction_endpoint(
    State(state): State<AppState>,
    Path((user_id, transaction_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateTransaction>,
) -> Result<Json<Transaction>, Error> {
    let kind = match &request.kind {
        Some(kind) => Some(kind.parse::<TransactionKind>()?),
        None => None,
    };
    let spend_changed = kind.is_some() || request.amount.is_some();

    let (user, transaction) = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        let user = get_user_by_id(UserID::new(user_id), &connection)?;
        let transaction = update_transaction(
            user.id,
            transaction_id,
            TransactionUpdate {
                kind,
                amount: request.amount,
                label: request.label,
                description: request.description,
                category: request.category,
                date: request.date,
            },
            &connection,
        )?;

        (user, transaction)
    };

    if spend_changed && transaction.kind == TransactionKind::Debit && !transaction.is_autopay {
        let today = local_today(&state.local_timezone)?;

        if let Err(error) = assess_transaction(&state, &user, &transaction, today).await {
            tracing::warn!(
                "Could not assess transaction {} against the budget: {error}",
                transaction.id
            );
        }
    }

    Ok(Json(transaction))
}

/// A route handler for deleting a transaction.
///
/// Deleting an autopay template records a cancellation notification for the
/// user.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] (404) if `user_id` does not belong to a registered user,
/// - or [Error::DeleteMissingTransaction] (404) if the transaction does not
///   exist or belongs to a different user.
pub async fn delete_transaction_endpoint(
    State(state): State<AppState>,
    Path((user_id, transaction_id)): Path<(i64, i64)>,
) -> Result<StatusCode, Error> {
    let (user, deleted) = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        let user = get_user_by_id(UserID::new(user_id), &connection)?;
        let deleted = delete_transaction(user.id, transaction_id, &connection)?;

        (user, deleted)
    };

    if deleted.is_autopay {
        let description = format!("Autopay for {} has been cancelled", deleted.label);

        if let Err(error) = notify(
            &state,
            &user,
            "Autopay Cancelled",
            &description,
            NotificationKind::System,
            None,
        )
        .await
        {
            tracing::warn!(
                "Could not send autopay cancellation notification to user {}: {error}",
                user.id
            );
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// A route handler for listing a user's autopay templates.
///
/// # Errors
/// This function will return a [Error::NotFound] (404) if `user_id` does not
/// belong to a registered user.
pub async fn get_autopay_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let user = get_user_by_id(UserID::new(user_id), &connection)?;
    let templates = get_autopay_templates(user.id, &connection)?;

    Ok(Json(templates))
}
