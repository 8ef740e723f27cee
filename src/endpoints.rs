//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/users/{user_id}', use [format_endpoint].

/// The route to request a cup of coffee (experimental).
pub const COFFEE: &str = "/api/coffee";
/// The route to create users.
pub const USERS: &str = "/api/users";
/// The route to access a single user.
pub const USER: &str = "/api/users/{user_id}";
/// The route to access a user's transactions.
pub const TRANSACTIONS: &str = "/api/users/{user_id}/transactions";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/users/{user_id}/transactions/{transaction_id}";
/// The route to list a user's autopay templates.
pub const AUTOPAY: &str = "/api/users/{user_id}/autopay";
/// The route to list a user's notifications.
pub const NOTIFICATIONS: &str = "/api/users/{user_id}/notifications";
/// The route to mark all of a user's notifications as read.
pub const NOTIFICATIONS_READ: &str = "/api/users/{user_id}/notifications/read";
/// The route to delete notifications older than a retention period.
pub const NOTIFICATIONS_RETENTION: &str = "/api/notifications";
/// The route to run a scheduled job by name.
pub const JOBS: &str = "/api/jobs/{job_name}";

/// Replace the first parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters.
/// For paths with multiple parameters, apply this function once per parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::COFFEE);
        assert_endpoint_is_valid_uri(endpoints::USERS);
        assert_endpoint_is_valid_uri(endpoints::USER);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTION);
        assert_endpoint_is_valid_uri(endpoints::AUTOPAY);
        assert_endpoint_is_valid_uri(endpoints::NOTIFICATIONS);
        assert_endpoint_is_valid_uri(endpoints::NOTIFICATIONS_READ);
        assert_endpoint_is_valid_uri(endpoints::NOTIFICATIONS_RETENTION);
        assert_endpoint_is_valid_uri(endpoints::JOBS);
    }

    #[test]
    fn produces_valid_uri() {
        let formatted_path = format_endpoint("/hello/{world_id}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());

        // Parameter with single word should also work.
        let formatted_path = format_endpoint("/hello/{world}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint("/hello/world", 1);

        assert_eq!(formatted_path, "/hello/world");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn parameter_in_middle() {
        let formatted_path = format_endpoint("/hello/{world}/bye", 1);

        assert_eq!(formatted_path, "/hello/1/bye");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn formats_one_parameter_at_a_time() {
        let formatted_path = format_endpoint(&format_endpoint(endpoints::TRANSACTION, 1), 42);

        assert_eq!(formatted_path, "/api/users/1/transactions/42");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }
}
