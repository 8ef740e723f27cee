//! Application router configuration wiring every API route to its handler.

use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
};

use crate::{
    AppState, endpoints,
    jobs::run_job_endpoint,
    notification::{
        get_notifications_endpoint, mark_notifications_read_endpoint,
        notification_retention_endpoint,
    },
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_autopay_endpoint,
        get_transaction_endpoint, get_transactions_endpoint, update_transaction_endpoint,
    },
    user::{create_user_endpoint, delete_user_endpoint, get_user_endpoint, update_user_endpoint},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::COFFEE, get(get_coffee))
        .route(endpoints::USERS, post(create_user_endpoint))
        .route(endpoints::USER, get(get_user_endpoint))
        .route(endpoints::USER, put(update_user_endpoint))
        .route(endpoints::USER, delete(delete_user_endpoint))
        .route(endpoints::TRANSACTIONS, post(create_transaction_endpoint))
        .route(endpoints::TRANSACTIONS, get(get_transactions_endpoint))
        .route(endpoints::TRANSACTION, get(get_transaction_endpoint))
        .route(endpoints::TRANSACTION, put(update_transaction_endpoint))
        .route(endpoints::TRANSACTION, delete(delete_transaction_endpoint))
        .route(endpoints::AUTOPAY, get(get_autopay_endpoint))
        .route(endpoints::NOTIFICATIONS, get(get_notifications_endpoint))
        .route(
            endpoints::NOTIFICATIONS_READ,
            post(mark_notifications_read_endpoint),
        )
        .route(
            endpoints::NOTIFICATIONS_RETENTION,
            delete(notification_retention_endpoint),
        )
        .route(endpoints::JOBS, post(run_job_endpoint))
        .with_state(state)
}

/// Attempt to get a cup of coffee from the server.
async fn get_coffee() -> Response {
    (StatusCode::IM_A_TEAPOT, Html("I'm a teapot")).into_response()
}
