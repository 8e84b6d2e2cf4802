//! Typed filters and sort orders for todo queries.
//!
//! Stores render these either to SQL (column names come from the field
//! enums, never from client input) or to iterator adaptors.

use std::cmp::Ordering;

use serde::Deserialize;
use uuid::Uuid;

use crate::models::paging::PageRequest;
use crate::models::todo::{Priority, TodoItem, TodoList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TodoListSortField {
    #[default]
    Title,
    CreatedAt,
}

impl TodoListSortField {
    pub fn column(self) -> &'static str {
        match self {
            TodoListSortField::Title => "title",
            TodoListSortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TodoListQuery {
    pub search: Option<String>,
    pub sort: TodoListSortField,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl TodoListQuery {
    pub fn matches(&self, list: &TodoList) -> bool {
        match normalized(&self.search) {
            Some(needle) => list.title.to_lowercase().contains(&needle),
            None => true,
        }
    }

    pub fn compare(&self, a: &TodoList, b: &TodoList) -> Ordering {
        let ordering = match self.sort {
            TodoListSortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            TodoListSortField::CreatedAt => a.audit.created_at.cmp(&b.audit.created_at),
        };
        self.direction.apply(ordering).then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TodoItemSortField {
    Title,
    Priority,
    #[default]
    CreatedAt,
    DoneAt,
}

impl TodoItemSortField {
    pub fn column(self) -> &'static str {
        match self {
            TodoItemSortField::Title => "title",
            TodoItemSortField::Priority => "priority",
            TodoItemSortField::CreatedAt => "created_at",
            TodoItemSortField::DoneAt => "done_at",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TodoItemFilter {
    pub list_id: Option<Uuid>,
    pub done: Option<bool>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring match on title or note.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TodoItemQuery {
    pub filter: TodoItemFilter,
    pub sort: TodoItemSortField,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl TodoItemQuery {
    pub fn for_list(list_id: Uuid) -> Self {
        Self {
            filter: TodoItemFilter {
                list_id: Some(list_id),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn matches(&self, item: &TodoItem) -> bool {
        let f = &self.filter;
        if f.list_id.is_some_and(|id| id != item.list_id) {
            return false;
        }
        if f.done.is_some_and(|done| done != item.done) {
            return false;
        }
        if f.priority.is_some_and(|p| p != item.priority) {
            return false;
        }
        match normalized(&f.search) {
            Some(needle) => {
                item.title.to_lowercase().contains(&needle)
                    || item
                        .note
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }

    pub fn compare(&self, a: &TodoItem, b: &TodoItem) -> Ordering {
        let ordering = match self.sort {
            TodoItemSortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            TodoItemSortField::Priority => a.priority.cmp(&b.priority),
            TodoItemSortField::CreatedAt => a.audit.created_at.cmp(&b.audit.created_at),
            TodoItemSortField::DoneAt => a.done_at.cmp(&b.done_at),
        };
        self.direction.apply(ordering).then_with(|| a.id.cmp(&b.id))
    }

    /// Search term as a SQL `ILIKE` pattern with wildcards escaped.
    pub fn search_pattern(&self) -> Option<String> {
        like_pattern(&self.filter.search)
    }
}

fn normalized(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// `%term%` with `\`, `%` and `_` escaped.
pub fn like_pattern(search: &Option<String>) -> Option<String> {
    let term = search.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}
