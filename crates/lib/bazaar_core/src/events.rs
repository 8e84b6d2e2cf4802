//! Domain events raised by use cases and dispatched after commit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    TodoListCreated { list_id: Uuid, title: String },
    TodoListUpdated { list_id: Uuid },
    TodoListDeleted { list_id: Uuid },
    TodoItemCreated { item_id: Uuid, list_id: Uuid },
    TodoItemUpdated { item_id: Uuid, list_id: Uuid },
    TodoItemCompleted { item_id: Uuid, list_id: Uuid, done_at: DateTime<Utc> },
    TodoItemDeleted { item_id: Uuid, list_id: Uuid },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TodoListCreated { .. } => "TodoListCreated",
            DomainEvent::TodoListUpdated { .. } => "TodoListUpdated",
            DomainEvent::TodoListDeleted { .. } => "TodoListDeleted",
            DomainEvent::TodoItemCreated { .. } => "TodoItemCreated",
            DomainEvent::TodoItemUpdated { .. } => "TodoItemUpdated",
            DomainEvent::TodoItemCompleted { .. } => "TodoItemCompleted",
            DomainEvent::TodoItemDeleted { .. } => "TodoItemDeleted",
        }
    }
}

#[derive(Debug, Error)]
#[error("Event handler {handler} failed: {message}")]
pub struct EventError {
    pub handler: &'static str,
    pub message: String,
}

#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError>;
}

/// Runs every handler for every event, in registration order.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn DomainEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn DomainEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Handler failures are logged and never propagated.
    pub async fn dispatch(&self, events: &[DomainEvent]) {
        for event in events {
            for handler in &self.handlers {
                if let Err(e) = handler.handle(event).await {
                    warn!(event = event.name(), handler = handler.name(), error = %e, "Domain event handler failed");
                }
            }
        }
    }
}

/// Logs every event.
pub struct LoggingEventHandler;

#[async_trait]
impl DomainEventHandler for LoggingEventHandler {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        info!(event = event.name(), payload = ?event, "Domain event");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingHandler;
    use super::*;

    struct FailingHandler;

    #[async_trait]
    impl DomainEventHandler for FailingHandler {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<(), EventError> {
            Err(EventError {
                handler: "failing",
                message: "boom".into(),
            })
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_others() {
        let recorder = Arc::new(RecordingHandler::default());
        let dispatcher = EventDispatcher::new()
            .with_handler(Arc::new(FailingHandler))
            .with_handler(recorder.clone());
        let list_id = Uuid::new_v4();
        dispatcher
            .dispatch(&[
                DomainEvent::TodoListCreated {
                    list_id,
                    title: "Groceries".into(),
                },
                DomainEvent::TodoListDeleted { list_id },
            ])
            .await;
        assert_eq!(recorder.names(), vec!["TodoListCreated", "TodoListDeleted"]);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(DomainEvent::TodoListDeleted { list_id: id }).unwrap();
        assert_eq!(json["type"], "TodoListDeleted");
        assert_eq!(json["listId"], id.to_string());
    }
}
