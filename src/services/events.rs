use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::ids::{validate_id, IdKind};
use crate::models::{Event, EventInput};
use crate::store::Store;

/// Справочник событий: обычный CRUD без производных инвариантов.
#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn Store>,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: EventInput) -> AppResult<Event> {
        input.validate()?;
        let event = self.store.insert_event(input).await?;
        info!(event_id = %event.id, tickets = event.available_tickets, "Event created");
        Ok(event)
    }

    pub async fn get(&self, id: &str) -> AppResult<Event> {
        validate_id(IdKind::Event, id)?;
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| AppError::not_found("event", id))
    }

    pub async fn list(&self) -> AppResult<Vec<Event>> {
        self.store.list_events().await
    }

    pub async fn update(&self, id: &str, input: EventInput) -> AppResult<Event> {
        validate_id(IdKind::Event, id)?;
        input.validate()?;
        let event = self
            .store
            .update_event(id, input)
            .await?
            .ok_or_else(|| AppError::not_found("event", id))?;
        info!(event_id = %event.id, "Event updated");
        Ok(event)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        validate_id(IdKind::Event, id)?;
        self.store.delete_event(id).await?;
        info!(event_id = %id, "Event deleted");
        Ok(())
    }
}
