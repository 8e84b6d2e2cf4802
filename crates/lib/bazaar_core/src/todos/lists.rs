//! Todo list use cases.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::list_not_found;
use super::query::TodoListQuery;
use crate::error::DomainError;
use crate::events::{DomainEvent, EventDispatcher};
use crate::models::paging::Page;
use crate::models::todo::{Audit, Colour, TodoItem, TodoList, normalize_title};
use crate::store::uow::UnitOfWork;
use crate::store::{Database, Transaction};
use crate::uuid::uuidv7;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoList {
    pub title: String,
    /// Hex code from the palette; white when absent.
    #[serde(default)]
    pub colour: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoList {
    pub title: String,
    #[serde(default)]
    pub colour: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListDetails {
    #[serde(flatten)]
    pub list: TodoList,
    pub items: Vec<TodoItem>,
}

fn parse_colour(colour: Option<&str>) -> Result<Colour, DomainError> {
    match colour.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => Colour::from_code(code),
        None => Ok(Colour::default()),
    }
}

pub struct TodoListService {
    db: Arc<dyn Database>,
    events: EventDispatcher,
}

impl TodoListService {
    pub fn new(db: Arc<dyn Database>, events: EventDispatcher) -> Self {
        Self { db, events }
    }

    pub async fn create(
        &self,
        cmd: CreateTodoList,
        actor: Option<Uuid>,
    ) -> Result<TodoList, DomainError> {
        let list = TodoList {
            id: uuidv7(),
            title: normalize_title(&cmd.title, "todo_list")?,
            colour: parse_colour(cmd.colour.as_deref())?,
            audit: Audit::created(Utc::now(), actor),
        };

        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = scope.insert_list(&list).await.map_err(DomainError::from);
        scope.complete(outcome).await?;

        info!(list_id = %list.id, "Created todo list");
        self.events
            .dispatch(&[DomainEvent::TodoListCreated {
                list_id: list.id,
                title: list.title.clone(),
            }])
            .await;
        Ok(list)
    }

    pub async fn get(&self, id: Uuid) -> Result<TodoListDetails, DomainError> {
        let tx = self.db.begin().await?;
        let details = load_details(tx.as_ref(), id).await;
        tx.rollback().await?;
        details
    }

    pub async fn query(&self, query: &TodoListQuery) -> Result<Page<TodoList>, DomainError> {
        let tx = self.db.begin().await?;
        let page = tx.query_lists(query).await;
        tx.rollback().await?;
        Ok(page?)
    }

    pub async fn update(
        &self,
        id: Uuid,
        cmd: UpdateTodoList,
        actor: Option<Uuid>,
    ) -> Result<TodoList, DomainError> {
        let title = normalize_title(&cmd.title, "todo_list")?;
        let colour = match cmd.colour.as_deref() {
            Some(code) => Some(parse_colour(Some(code))?),
            None => None,
        };

        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = async {
            let mut list = scope.find_list(id).await?.ok_or_else(|| list_not_found(id))?;
            list.title = title;
            if let Some(colour) = colour {
                list.colour = colour;
            }
            list.audit.touch(Utc::now(), actor);
            scope.update_list(&list).await?;
            Ok::<_, DomainError>(list)
        }
        .await;
        let list = scope.complete(outcome).await?;

        self.events
            .dispatch(&[DomainEvent::TodoListUpdated { list_id: list.id }])
            .await;
        Ok(list)
    }

    /// Delete a list and all of its items atomically.
    pub async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = async {
            scope.find_list(id).await?.ok_or_else(|| list_not_found(id))?;
            let items = scope.items_for_list(id).await?;
            let mut events = Vec::with_capacity(items.len() + 1);
            for item in items {
                scope.delete_item(item.id).await?;
                events.push(DomainEvent::TodoItemDeleted {
                    item_id: item.id,
                    list_id: id,
                });
            }
            scope.delete_list(id).await?;
            events.push(DomainEvent::TodoListDeleted { list_id: id });
            Ok::<_, DomainError>(events)
        }
        .await;
        let events = scope.complete(outcome).await?;

        info!(list_id = %id, items = events.len() - 1, "Deleted todo list");
        self.events.dispatch(&events).await;
        Ok(())
    }
}

async fn load_details(tx: &dyn Transaction, id: Uuid) -> Result<TodoListDetails, DomainError> {
    let list = tx.find_list(id).await?.ok_or_else(|| list_not_found(id))?;
    let items = tx.items_for_list(id).await?;
    Ok(TodoListDetails { list, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingHandler;
    use crate::store::memory::MemoryDatabase;
    use crate::todos::items::{CreateTodoItem, TodoItemService};

    struct Fixture {
        db: MemoryDatabase,
        lists: TodoListService,
        items: TodoItemService,
        recorder: Arc<RecordingHandler>,
    }

    fn fixture() -> Fixture {
        let db = MemoryDatabase::new();
        let recorder = Arc::new(RecordingHandler::default());
        let events = EventDispatcher::new().with_handler(recorder.clone());
        let shared: Arc<dyn Database> = Arc::new(db.clone());
        Fixture {
            lists: TodoListService::new(shared.clone(), events.clone()),
            items: TodoItemService::new(shared, events),
            db,
            recorder,
        }
    }

    async fn list_with_items(f: &Fixture, n: usize) -> TodoList {
        let list = f
            .lists
            .create(
                CreateTodoList {
                    title: "Groceries".into(),
                    colour: Some("#6666ff".into()),
                },
                None,
            )
            .await
            .unwrap();
        for i in 0..n {
            f.items
                .create(
                    CreateTodoItem {
                        list_id: list.id,
                        title: format!("item {i}"),
                        note: None,
                        priority: None,
                    },
                    None,
                )
                .await
                .unwrap();
        }
        f.recorder.events.lock().unwrap().clear();
        list
    }

    #[tokio::test]
    async fn create_validates_title_and_colour() {
        let f = fixture();
        let err = f
            .lists
            .create(
                CreateTodoList {
                    title: "  ".into(),
                    colour: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("todo_list.title_required"));

        let err = f
            .lists
            .create(
                CreateTodoList {
                    title: "Chores".into(),
                    colour: Some("#000000".into()),
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("todo_list.unsupported_colour"));
        assert!(f.recorder.names().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_and_raises_events_after_commit() {
        let f = fixture();
        let list = list_with_items(&f, 3).await;

        f.lists.delete(list.id).await.unwrap();

        let tx = f.db.begin().await.unwrap();
        assert!(tx.find_list(list.id).await.unwrap().is_none());
        assert!(tx.items_for_list(list.id).await.unwrap().is_empty());
        drop(tx);

        let names = f.recorder.names();
        assert_eq!(names.iter().filter(|n| **n == "TodoItemDeleted").count(), 3);
        assert_eq!(names.last(), Some(&"TodoListDeleted"));
    }

    #[tokio::test]
    async fn failed_delete_leaves_everything_and_raises_nothing() {
        let f = fixture();
        let list = list_with_items(&f, 3).await;

        f.db.fail_next("delete_list");
        assert!(f.lists.delete(list.id).await.is_err());

        let details = f.lists.get(list.id).await.unwrap();
        assert_eq!(details.items.len(), 3);
        assert!(f.recorder.names().is_empty());
    }

    #[tokio::test]
    async fn update_keeps_colour_when_absent() {
        let f = fixture();
        let list = list_with_items(&f, 0).await;
        let updated = f
            .lists
            .update(
                list.id,
                UpdateTodoList {
                    title: " Weekly shop ".into(),
                    colour: None,
                },
                Some(Uuid::nil()),
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Weekly shop");
        assert_eq!(updated.colour, Colour::Blue);
        assert_eq!(updated.audit.last_modified_by, Some(Uuid::nil()));
        assert_eq!(f.recorder.names(), vec!["TodoListUpdated"]);
    }

    #[tokio::test]
    async fn missing_list_is_not_found() {
        let f = fixture();
        let err = f.lists.get(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), Some("todo_list.not_found"));
        assert!(matches!(f.lists.delete(Uuid::new_v4()).await, Err(DomainError::NotFound(_))));
    }
}
