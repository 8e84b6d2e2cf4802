//! Todo aggregate: a list owns its items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_NOTE_LEN: usize = 2000;

/// Audit trail shared by todo entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<Uuid>,
}

impl Audit {
    pub fn created(at: DateTime<Utc>, by: Option<Uuid>) -> Self {
        Self {
            created_at: at,
            created_by: by,
            last_modified_at: None,
            last_modified_by: None,
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>, by: Option<Uuid>) {
        self.last_modified_at = Some(at);
        self.last_modified_by = by;
    }
}

/// Supported list colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colour {
    #[default]
    White,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Grey,
}

impl Colour {
    pub const ALL: [Colour; 8] = [
        Colour::White,
        Colour::Red,
        Colour::Orange,
        Colour::Yellow,
        Colour::Green,
        Colour::Blue,
        Colour::Purple,
        Colour::Grey,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Colour::White => "#FFFFFF",
            Colour::Red => "#FF5733",
            Colour::Orange => "#FFC300",
            Colour::Yellow => "#FFFF66",
            Colour::Green => "#CCFF99",
            Colour::Blue => "#6666FF",
            Colour::Purple => "#9966CC",
            Colour::Grey => "#999999",
        }
    }

    /// Case-insensitive lookup by hex code.
    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| {
                DomainError::validation(
                    "todo_list.unsupported_colour",
                    format!("Colour \"{code}\" is unsupported"),
                )
            })
    }
}

impl Serialize for Colour {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Colour {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Colour::from_code(&code).map_err(serde::de::Error::custom)
    }
}

/// Item priority, stored as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_i16(self) -> i16 {
        match self {
            Priority::None => 0,
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    pub fn from_i16(v: i16) -> Self {
        match v {
            1 => Priority::Low,
            2 => Priority::Medium,
            3 => Priority::High,
            _ => Priority::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: Uuid,
    pub title: String,
    pub colour: Colour,
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub note: Option<String>,
    pub priority: Priority,
    pub done: bool,
    pub done_at: Option<DateTime<Utc>>,
    pub audit: Audit,
}

impl TodoItem {
    /// Completes the item. A second call is a conflict and changes nothing.
    pub fn mark_done(&mut self, at: DateTime<Utc>, by: Option<Uuid>) -> Result<(), DomainError> {
        if self.done {
            return Err(DomainError::conflict(
                "todo_item.already_done",
                format!("Todo item {} is already done", self.id),
            ));
        }
        self.done = true;
        self.done_at = Some(at);
        self.audit.touch(at, by);
        Ok(())
    }
}

/// Trim and validate a title.
pub fn normalize_title(title: &str, code_prefix: &str) -> Result<String, DomainError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(
            &format!("{code_prefix}.title_required"),
            "Title is required",
        ));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(DomainError::validation(
            &format!("{code_prefix}.title_too_long"),
            format!("Title must not exceed {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim a note; blank notes become `None`.
pub fn normalize_note(note: Option<&str>) -> Result<Option<String>, DomainError> {
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        None => Ok(None),
        Some(n) if n.chars().count() > MAX_NOTE_LEN => Err(DomainError::validation(
            "todo_item.note_too_long",
            format!("Note must not exceed {MAX_NOTE_LEN} characters"),
        )),
        Some(n) => Ok(Some(n.to_string())),
    }
}
