//! Transaction management for the budgeting application.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing, querying, and managing transactions and
//!   autopay templates
//! - The JSON API handlers for the transaction endpoints

mod core;
mod endpoints;

pub use core::{
    Transaction, TransactionBuilder, TransactionKind, TransactionUpdate,
    advance_autopay_template, create_transaction, create_transaction_table, delete_transaction,
    get_autopay_templates, get_transaction, get_transactions, label_exists_in_range,
    map_transaction_row, sum_amount_in_range, update_transaction,
};
pub use endpoints::{
    CreateTransaction, UpdateTransaction, create_transaction_endpoint,
    delete_transaction_endpoint, get_autopay_endpoint, get_transaction_endpoint,
    get_transactions_endpoint, update_transaction_endpoint,
};
