//! Хранилище записей: события, пользователи и брони.
//!
//! Две реализации: [`postgres::PgStore`] для боевого режима и
//! [`memory::MemoryStore`] для локального запуска без базы и для тестов.
//! Обе гарантируют, что списание билетов и вставка брони происходят атомарно.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::models::{Booking, Event, EventInput, Role, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UserChanges {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: String,
    pub event_id: String,
    pub ticket_quantity: i32,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- события ---
    async fn insert_event(&self, input: EventInput) -> AppResult<Event>;
    async fn get_event(&self, id: &str) -> AppResult<Option<Event>>;
    async fn list_events(&self) -> AppResult<Vec<Event>>;
    async fn update_event(&self, id: &str, input: EventInput) -> AppResult<Option<Event>>;
    /// `NotFound`, если события нет; `Conflict`, если на него ссылаются брони.
    async fn delete_event(&self, id: &str) -> AppResult<()>;

    // --- пользователи ---
    /// `Conflict`, если email уже занят.
    async fn insert_user(&self, user: NewUser) -> AppResult<User>;
    async fn get_user(&self, id: &str) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn update_user(&self, id: &str, changes: UserChanges) -> AppResult<Option<User>>;
    async fn set_password_hash(&self, id: &str, password_hash: &str) -> AppResult<bool>;
    async fn delete_user(&self, id: &str) -> AppResult<()>;

    // --- брони ---
    /// Проверка остатка, списание и вставка брони одной атомарной операцией.
    async fn create_booking(&self, booking: NewBooking) -> AppResult<Booking>;
    async fn get_booking(&self, id: &str) -> AppResult<Option<Booking>>;
    async fn list_bookings(&self) -> AppResult<Vec<Booking>>;
    async fn list_bookings_for_user(&self, user_id: &str) -> AppResult<Vec<Booking>>;
    /// Удаляет бронь и возвращает билеты событию.
    /// `Conflict`, если остаток события вышел бы за пределы `i32`.
    async fn cancel_booking(&self, id: &str) -> AppResult<Booking>;
}

fn restock_overflow(booking: &Booking) -> AppError {
    AppError::Conflict(format!(
        "Отмена {} переполнит остаток билетов события {}",
        booking.id, booking.event_id
    ))
}
