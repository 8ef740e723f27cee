//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;
/// Alias for the integer type used for transaction IDs.
pub type TransactionId = i64;
