//! Request handlers.

pub mod auth;
pub mod health;
pub mod notifications;
pub mod todo_items;
pub mod todo_lists;
pub mod users;
