//! Domain models.
//!
//! Storage-agnostic types shared by the stores, the use cases and the API
//! layer (which wraps them in its own camelCase DTOs where needed).

pub mod auth;
pub mod paging;
pub mod todo;
