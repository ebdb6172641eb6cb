use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{restock_overflow, NewBooking, NewUser, Store, UserChanges};
use crate::error::{AppError, AppResult};
use crate::ids::{parse_id, IdKind, SequenceAllocator};
use crate::models::{Booking, Event, EventInput, User};

// Ключ - номер из идентификатора, поэтому обход BTreeMap идёт в порядке выделения.
#[derive(Debug, Default)]
struct Tables {
    events: BTreeMap<u64, Event>,
    users: BTreeMap<u64, User>,
    bookings: BTreeMap<u64, Booking>,
}

/// Хранилище в памяти процесса. Все изменения идут под одной блокировкой записи.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    ids: SequenceAllocator,
}

fn key(kind: IdKind, id: &str) -> Option<u64> {
    parse_id(kind, id).ok()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Восстановить хранилище из ранее сохранённых записей.
    ///
    /// Счётчики продолжают нумерацию после максимального номера; битый
    /// идентификатор в данных даёт `AllocationFailure`.
    pub fn restore(events: Vec<Event>, users: Vec<User>, bookings: Vec<Booking>) -> AppResult<Self> {
        let ids = SequenceAllocator::new();
        ids.resume(IdKind::Event, events.iter().map(|e| e.id.as_str()))?;
        ids.resume(IdKind::User, users.iter().map(|u| u.id.as_str()))?;
        ids.resume(IdKind::Booking, bookings.iter().map(|b| b.id.as_str()))?;

        let mut tables = Tables::default();
        for event in events {
            let number = parse_id(IdKind::Event, &event.id)
                .map_err(|e| AppError::AllocationFailure(e.to_string()))?;
            tables.events.insert(number, event);
        }
        for user in users {
            let number = parse_id(IdKind::User, &user.id)
                .map_err(|e| AppError::AllocationFailure(e.to_string()))?;
            tables.users.insert(number, user);
        }
        for booking in bookings {
            let number = parse_id(IdKind::Booking, &booking.id)
                .map_err(|e| AppError::AllocationFailure(e.to_string()))?;
            tables.bookings.insert(number, booking);
        }

        info!(
            events = tables.events.len(),
            users = tables.users.len(),
            bookings = tables.bookings.len(),
            "Memory store restored"
        );
        Ok(Self { tables: RwLock::new(tables), ids })
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self, kind: IdKind) -> (u64, String) {
        let number = self.ids.next_number(kind);
        (number, crate::ids::format_id(kind, number))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_event(&self, input: EventInput) -> AppResult<Event> {
        let mut tables = self.write();
        let (number, id) = self.allocate(IdKind::Event);
        let event = input.into_event(id);
        tables.events.insert(number, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>> {
        Ok(key(IdKind::Event, id).and_then(|k| self.read().events.get(&k).cloned()))
    }

    async fn list_events(&self) -> AppResult<Vec<Event>> {
        Ok(self.read().events.values().cloned().collect())
    }

    async fn update_event(&self, id: &str, input: EventInput) -> AppResult<Option<Event>> {
        let Some(k) = key(IdKind::Event, id) else {
            return Ok(None);
        };
        let mut tables = self.write();
        Ok(tables.events.get_mut(&k).map(|event| {
            *event = input.into_event(event.id.clone());
            event.clone()
        }))
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        let k = key(IdKind::Event, id).ok_or_else(|| AppError::not_found("event", id))?;
        let mut tables = self.write();
        if !tables.events.contains_key(&k) {
            return Err(AppError::not_found("event", id));
        }
        if tables.bookings.values().any(|b| b.event_id == id) {
            return Err(AppError::Conflict(format!("На событие {id} есть брони")));
        }
        tables.events.remove(&k);
        Ok(())
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut tables = self.write();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email уже используется".to_string()));
        }
        let (number, id) = self.allocate(IdKind::User);
        let user = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
        };
        tables.users.insert(number, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        Ok(key(IdKind::User, id).and_then(|k| self.read().users.get(&k).cloned()))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.read().users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.read().users.values().cloned().collect())
    }

    async fn update_user(&self, id: &str, changes: UserChanges) -> AppResult<Option<User>> {
        let Some(k) = key(IdKind::User, id) else {
            return Ok(None);
        };
        let mut tables = self.write();
        if tables
            .users
            .iter()
            .any(|(other, u)| *other != k && u.email == changes.email)
        {
            return Err(AppError::Conflict("Email уже используется".to_string()));
        }
        Ok(tables.users.get_mut(&k).map(|user| {
            user.email = changes.email;
            user.role = changes.role;
            user.clone()
        }))
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> AppResult<bool> {
        let Some(k) = key(IdKind::User, id) else {
            return Ok(false);
        };
        let mut tables = self.write();
        Ok(match tables.users.get_mut(&k) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                true
            }
            None => false,
        })
    }

    async fn delete_user(&self, id: &str) -> AppResult<()> {
        let k = key(IdKind::User, id).ok_or_else(|| AppError::not_found("user", id))?;
        let mut tables = self.write();
        if !tables.users.contains_key(&k) {
            return Err(AppError::not_found("user", id));
        }
        if tables.bookings.values().any(|b| b.user_id == id) {
            return Err(AppError::Conflict(format!("У пользователя {id} есть брони")));
        }
        tables.users.remove(&k);
        Ok(())
    }

    async fn create_booking(&self, booking: NewBooking) -> AppResult<Booking> {
        let mut tables = self.write();

        let user_known = key(IdKind::User, &booking.user_id)
            .is_some_and(|k| tables.users.contains_key(&k));
        if !user_known {
            return Err(AppError::not_found("user", booking.user_id));
        }

        let event = match key(IdKind::Event, &booking.event_id) {
            Some(k) => tables.events.get_mut(&k),
            None => None,
        };
        let Some(event) = event else {
            return Err(AppError::not_found("event", booking.event_id));
        };

        let remaining = event.available_tickets - booking.ticket_quantity;
        if remaining < 0 {
            return Err(AppError::InsufficientInventory {
                event_id: event.id.clone(),
                requested: booking.ticket_quantity,
                available: event.available_tickets,
            });
        }
        event.available_tickets = remaining;
        let event_id = event.id.clone();

        let (number, id) = self.allocate(IdKind::Booking);
        let created = Booking {
            id,
            user_id: booking.user_id,
            event_id,
            ticket_quantity: booking.ticket_quantity,
            created_at: chrono::Utc::now().naive_utc(),
        };
        tables.bookings.insert(number, created.clone());
        debug!(booking_id = %created.id, remaining, "Booking stored");
        Ok(created)
    }

    async fn get_booking(&self, id: &str) -> AppResult<Option<Booking>> {
        Ok(key(IdKind::Booking, id).and_then(|k| self.read().bookings.get(&k).cloned()))
    }

    async fn list_bookings(&self) -> AppResult<Vec<Booking>> {
        Ok(self.read().bookings.values().cloned().collect())
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        Ok(self
            .read()
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn cancel_booking(&self, id: &str) -> AppResult<Booking> {
        let k = key(IdKind::Booking, id).ok_or_else(|| AppError::not_found("booking", id))?;
        let mut tables = self.write();
        let Some(booking) = tables.bookings.get(&k).cloned() else {
            return Err(AppError::not_found("booking", id));
        };

        // Билеты возвращаем до удаления брони: при переполнении ничего не меняется
        let event = match key(IdKind::Event, &booking.event_id) {
            Some(ek) => tables.events.get_mut(&ek),
            None => None,
        };
        if let Some(event) = event {
            event.available_tickets = event
                .available_tickets
                .checked_add(booking.ticket_quantity)
                .ok_or_else(|| restock_overflow(&booking))?;
        }
        tables.bookings.remove(&k);
        Ok(booking)
    }
}
