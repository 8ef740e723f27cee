//! User account management.
//!
//! This module contains everything related to user accounts:
//! - The `User` model, subscription tiers, and feature entitlements
//! - Database functions for storing, querying, and updating users
//! - The JSON API handlers for the user endpoints

mod core;
mod endpoints;

pub use core::{
    Feature, Tier, User, UserBuilder, UserID, UserUpdate, create_user, create_user_table,
    delete_user, get_all_users, get_user_by_id, is_entitled, map_user_row, update_user,
};
pub use endpoints::{
    CreateUser, UpdateUser, create_user_endpoint, delete_user_endpoint, get_user_endpoint,
    update_user_endpoint,
};
