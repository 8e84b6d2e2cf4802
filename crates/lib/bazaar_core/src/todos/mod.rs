//! Todo use cases. A list owns its items; every mutation runs in one
//! Unit-of-Work and raises domain events once it has committed.

pub mod items;
pub mod lists;
pub mod query;

pub use items::{CreateTodoItem, TodoItemService, UpdateTodoItem};
pub use lists::{CreateTodoList, TodoListDetails, TodoListService, UpdateTodoList};

use crate::error::DomainError;
use uuid::Uuid;

pub(crate) fn list_not_found(id: Uuid) -> DomainError {
    DomainError::not_found("todo_list.not_found", format!("Todo list {id} was not found"))
}

pub(crate) fn item_not_found(id: Uuid) -> DomainError {
    DomainError::not_found("todo_item.not_found", format!("Todo item {id} was not found"))
}
