//! Todo item use cases.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::query::TodoItemQuery;
use super::{item_not_found, list_not_found};
use crate::error::DomainError;
use crate::events::{DomainEvent, EventDispatcher};
use crate::models::paging::Page;
use crate::models::todo::{Audit, Priority, TodoItem, normalize_note, normalize_title};
use crate::store::Database;
use crate::store::uow::UnitOfWork;
use crate::uuid::uuidv7;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoItem {
    pub list_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoItem {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

pub struct TodoItemService {
    db: Arc<dyn Database>,
    events: EventDispatcher,
}

impl TodoItemService {
    pub fn new(db: Arc<dyn Database>, events: EventDispatcher) -> Self {
        Self { db, events }
    }

    pub async fn create(
        &self,
        cmd: CreateTodoItem,
        actor: Option<Uuid>,
    ) -> Result<TodoItem, DomainError> {
        let item = TodoItem {
            id: uuidv7(),
            list_id: cmd.list_id,
            title: normalize_title(&cmd.title, "todo_item")?,
            note: normalize_note(cmd.note.as_deref())?,
            priority: cmd.priority.unwrap_or_default(),
            done: false,
            done_at: None,
            audit: Audit::created(Utc::now(), actor),
        };

        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = async {
            scope
                .find_list(item.list_id)
                .await?
                .ok_or_else(|| list_not_found(item.list_id))?;
            scope.insert_item(&item).await?;
            Ok::<_, DomainError>(())
        }
        .await;
        scope.complete(outcome).await?;

        info!(item_id = %item.id, list_id = %item.list_id, "Created todo item");
        self.events
            .dispatch(&[DomainEvent::TodoItemCreated {
                item_id: item.id,
                list_id: item.list_id,
            }])
            .await;
        Ok(item)
    }

    pub async fn get(&self, id: Uuid) -> Result<TodoItem, DomainError> {
        let tx = self.db.begin().await?;
        let item = tx.find_item(id).await;
        tx.rollback().await?;
        item?.ok_or_else(|| item_not_found(id))
    }

    pub async fn query(&self, query: &TodoItemQuery) -> Result<Page<TodoItem>, DomainError> {
        let tx = self.db.begin().await?;
        let page = tx.query_items(query).await;
        tx.rollback().await?;
        Ok(page?)
    }

    /// Replace title, note and, when given, priority. Completion state is
    /// only changed through [`TodoItemService::complete`].
    pub async fn update(
        &self,
        id: Uuid,
        cmd: UpdateTodoItem,
        actor: Option<Uuid>,
    ) -> Result<TodoItem, DomainError> {
        let title = normalize_title(&cmd.title, "todo_item")?;
        let note = normalize_note(cmd.note.as_deref())?;

        self.mutate(id, |item| {
            item.title = title;
            item.note = note;
            if let Some(priority) = cmd.priority {
                item.priority = priority;
            }
            item.audit.touch(Utc::now(), actor);
            Ok(DomainEvent::TodoItemUpdated {
                item_id: item.id,
                list_id: item.list_id,
            })
        })
        .await
    }

    /// Mark the item done. Completing an already done item is a conflict.
    pub async fn complete(&self, id: Uuid, actor: Option<Uuid>) -> Result<TodoItem, DomainError> {
        self.mutate(id, |item| {
            let at = Utc::now();
            item.mark_done(at, actor)?;
            Ok(DomainEvent::TodoItemCompleted {
                item_id: item.id,
                list_id: item.list_id,
                done_at: at,
            })
        })
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = async {
            let item = scope.find_item(id).await?.ok_or_else(|| item_not_found(id))?;
            scope.delete_item(id).await?;
            Ok::<_, DomainError>(item.list_id)
        }
        .await;
        let list_id = scope.complete(outcome).await?;

        self.events
            .dispatch(&[DomainEvent::TodoItemDeleted { item_id: id, list_id }])
            .await;
        Ok(())
    }

    async fn mutate<F>(&self, id: Uuid, change: F) -> Result<TodoItem, DomainError>
    where
        F: FnOnce(&mut TodoItem) -> Result<DomainEvent, DomainError> + Send,
    {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = async {
            let mut item = scope.find_item(id).await?.ok_or_else(|| item_not_found(id))?;
            let event = change(&mut item)?;
            scope.update_item(&item).await?;
            Ok::<_, DomainError>((item, event))
        }
        .await;
        let (item, event) = scope.complete(outcome).await?;

        self.events.dispatch(std::slice::from_ref(&event)).await;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingHandler;
    use crate::store::memory::MemoryDatabase;
    use crate::todos::lists::{CreateTodoList, TodoListService};
    use crate::todos::query::TodoItemSortField;

    struct Fixture {
        db: MemoryDatabase,
        items: TodoItemService,
        list_id: Uuid,
        recorder: Arc<RecordingHandler>,
    }

    async fn fixture() -> Fixture {
        let db = MemoryDatabase::new();
        let recorder = Arc::new(RecordingHandler::default());
        let events = EventDispatcher::new().with_handler(recorder.clone());
        let shared: Arc<dyn Database> = Arc::new(db.clone());
        let list = TodoListService::new(shared.clone(), EventDispatcher::new())
            .create(
                CreateTodoList {
                    title: "Chores".into(),
                    colour: None,
                },
                None,
            )
            .await
            .unwrap();
        Fixture {
            items: TodoItemService::new(shared, events),
            db,
            list_id: list.id,
            recorder,
        }
    }

    fn new_item(list_id: Uuid, title: &str, priority: Priority) -> CreateTodoItem {
        CreateTodoItem {
            list_id,
            title: title.into(),
            note: None,
            priority: Some(priority),
        }
    }

    #[tokio::test]
    async fn create_requires_existing_list() {
        let f = fixture().await;
        let err = f
            .items
            .create(new_item(Uuid::new_v4(), "Vacuum", Priority::Low), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("todo_list.not_found"));
        assert!(f.recorder.names().is_empty());
    }

    #[tokio::test]
    async fn complete_twice_is_conflict() {
        let f = fixture().await;
        let item = f
            .items
            .create(new_item(f.list_id, "Vacuum", Priority::High), None)
            .await
            .unwrap();

        let done = f.items.complete(item.id, None).await.unwrap();
        assert!(done.done);
        let done_at = done.done_at;

        let err = f.items.complete(item.id, None).await.unwrap_err();
        assert_eq!(err.code(), Some("todo_item.already_done"));
        assert_eq!(f.items.get(item.id).await.unwrap().done_at, done_at);
        assert_eq!(f.recorder.names(), vec!["TodoItemCreated", "TodoItemCompleted"]);
    }

    #[tokio::test]
    async fn update_keeps_priority_when_absent() {
        let f = fixture().await;
        let item = f
            .items
            .create(new_item(f.list_id, "Vacuum", Priority::Medium), None)
            .await
            .unwrap();
        let updated = f
            .items
            .update(
                item.id,
                UpdateTodoItem {
                    title: "Vacuum upstairs".into(),
                    note: Some("  ".into()),
                    priority: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.priority, Priority::Medium);
        assert_eq!(updated.note, None);
        assert!(updated.audit.last_modified_at.is_some());
    }

    #[tokio::test]
    async fn failed_update_raises_no_event() {
        let f = fixture().await;
        let item = f
            .items
            .create(new_item(f.list_id, "Vacuum", Priority::Low), None)
            .await
            .unwrap();
        f.db.fail_next("update_item");
        assert!(f.items.complete(item.id, None).await.is_err());
        assert!(!f.items.get(item.id).await.unwrap().done);
        assert_eq!(f.recorder.names(), vec!["TodoItemCreated"]);
    }

    #[tokio::test]
    async fn query_sorts_by_priority() {
        let f = fixture().await;
        for (title, priority) in [("a", Priority::Low), ("b", Priority::High), ("c", Priority::Medium)] {
            f.items.create(new_item(f.list_id, title, priority), None).await.unwrap();
        }
        let mut query = TodoItemQuery::for_list(f.list_id);
        query.sort = TodoItemSortField::Priority;
        query.direction = crate::todos::query::SortDirection::Desc;
        let page = f.items.query(&query).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c", "a"]);
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test]
    async fn delete_missing_item_is_not_found() {
        let f = fixture().await;
        let err = f.items.delete(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), Some("todo_item.not_found"));
    }
}
