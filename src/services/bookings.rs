//! bookings.rs
//!
//! Сценарий бронирования: проверка количества, списание билетов у события и
//! сохранение брони. Атомарность обеспечивает хранилище (`Store::create_booking`),
//! здесь только входные проверки и поиск пользователя по email.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::ids::{validate_id, IdKind};
use crate::models::Booking;
use crate::store::{NewBooking, Store};

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn Store>,
}

impl BookingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_booking(&self, event_id: &str, user_id: &str, quantity: i32) -> AppResult<Booking> {
        if quantity <= 0 {
            return Err(AppError::invalid("ticketQuantity должен быть > 0"));
        }
        validate_id(IdKind::Event, event_id)?;
        validate_id(IdKind::User, user_id)?;

        let result = self
            .store
            .create_booking(NewBooking {
                user_id: user_id.to_string(),
                event_id: event_id.to_string(),
                ticket_quantity: quantity,
            })
            .await;

        match &result {
            Ok(booking) => info!(
                booking_id = %booking.id,
                event_id = %booking.event_id,
                user_id = %booking.user_id,
                quantity,
                "Booking created"
            ),
            Err(AppError::InsufficientInventory { available, .. }) => warn!(
                %event_id,
                quantity,
                available,
                "Booking rejected: not enough tickets"
            ),
            Err(_) => {}
        }
        result
    }

    pub async fn list_all_bookings(&self) -> AppResult<Vec<Booking>> {
        self.store.list_bookings().await
    }

    pub async fn list_bookings_for_user(&self, email: &str) -> AppResult<Vec<Booking>> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found("user", email))?;
        self.store.list_bookings_for_user(&user.id).await
    }

    pub async fn get_booking(&self, id: &str) -> AppResult<Booking> {
        validate_id(IdKind::Booking, id)?;
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| AppError::not_found("booking", id))
    }

    pub async fn cancel_booking(&self, id: &str) -> AppResult<Booking> {
        validate_id(IdKind::Booking, id)?;
        let booking = self.store.cancel_booking(id).await?;
        info!(
            booking_id = %booking.id,
            event_id = %booking.event_id,
            released = booking.ticket_quantity,
            "Booking cancelled"
        );
        Ok(booking)
    }
}
