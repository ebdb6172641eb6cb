//! PostgreSQL-хранилище на sqlx.
//!
//! Списание билетов - один условный `UPDATE ... WHERE available_tickets >= $q`
//! в той же транзакции, что и вставка брони. Если строка не обновилась, билетов
//! не хватает (или события нет), и транзакция откатывается целиком.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgExecutor, PgPool};
use std::time::Duration;
use tracing::{debug, info};

use super::{restock_overflow, NewBooking, NewUser, Store, UserChanges};
use crate::error::{AppError, AppResult};
use crate::ids::{format_id, IdKind};
use crate::models::{Booking, Event, EventInput, User};

const EVENT_COLUMNS: &str = "id, title, date, location, price, available_tickets, image_base64";
const BOOKING_COLUMNS: &str = "id, user_id, event_id, ticket_quantity, created_at";
const USER_COLUMNS: &str = "id, email, password_hash, role";

// Номера монотонны, поэтому (length, id) упорядочивает как порядок вставки.
const ORDER_BY_ID: &str = "ORDER BY length(id), id";

#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

// role хранится текстом, в модель переводим через FromStr
#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            role: row.role.parse().map_err(AppError::Internal)?,
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
        })
    }
}

/// Уникальность и внешние ключи превращаем в `Conflict`, остальное - в `Database`.
fn constraint_error(e: sqlx::Error, conflict: impl Into<String>) -> AppError {
    let violated = e
        .as_database_error()
        .map(|db| db.is_unique_violation() || db.is_foreign_key_violation())
        .unwrap_or(false);
    if violated {
        AppError::Conflict(conflict.into())
    } else {
        AppError::Database(e)
    }
}

async fn next_id<'e, E: PgExecutor<'e>>(executor: E, kind: IdKind) -> AppResult<String> {
    let sql = format!("SELECT nextval('{}')", kind.sequence());
    let number: i64 = sqlx::query_scalar(&sql).fetch_one(executor).await?;
    let number = u64::try_from(number)
        .map_err(|_| AppError::AllocationFailure(format!("{} returned {}", kind.sequence(), number)))?;
    Ok(format_id(kind, number))
}

impl PgStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(PgStore { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_event(&self, input: EventInput) -> AppResult<Event> {
        let mut tx = self.pool.begin().await?;
        let id = next_id(&mut *tx, IdKind::Event).await?;

        let event = sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&id)
        .bind(&input.title)
        .bind(input.date)
        .bind(&input.location)
        .bind(input.price)
        .bind(input.available_tickets)
        .bind(&input.image_base64)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn list_events(&self) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events {ORDER_BY_ID}"))
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn update_event(&self, id: &str, input: EventInput) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET title = $2, date = $3, location = $4, price = $5,
                available_tickets = $6, image_base64 = $7
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.title)
        .bind(input.date)
        .bind(&input.location)
        .bind(input.price)
        .bind(input.available_tickets)
        .bind(&input.image_base64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, format!("На событие {id} есть брони")))?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::not_found("event", id));
        }
        Ok(())
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;
        let id = next_id(&mut *tx, IdKind::User).await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| constraint_error(e, "Email уже используется"))?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users {ORDER_BY_ID}"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn update_user(&self, id: &str, changes: UserChanges) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET email = $2, role = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&changes.email)
        .bind(changes.role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Email уже используется"))?
        .map(User::try_from)
        .transpose()
    }

    async fn set_password_hash(&self, id: &str, password_hash: &str) -> AppResult<bool> {
        let updated = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn delete_user(&self, id: &str) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, format!("У пользователя {id} есть брони")))?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::not_found("user", id));
        }
        Ok(())
    }

    async fn create_booking(&self, booking: NewBooking) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE держит строку пользователя до коммита: параллельный DELETE ждёт нас
        let user: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR SHARE")
            .bind(&booking.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            tx.rollback().await?;
            return Err(AppError::not_found("user", booking.user_id));
        }

        // 1) Условное списание: строка обновится только если билетов хватает
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE events
            SET available_tickets = available_tickets - $1
            WHERE id = $2 AND available_tickets >= $1
            RETURNING available_tickets
            "#,
        )
        .bind(booking.ticket_quantity)
        .bind(&booking.event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(remaining) = remaining else {
            let available: Option<i32> =
                sqlx::query_scalar("SELECT available_tickets FROM events WHERE id = $1")
                    .bind(&booking.event_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Err(match available {
                None => AppError::not_found("event", booking.event_id),
                Some(available) => AppError::InsufficientInventory {
                    event_id: booking.event_id,
                    requested: booking.ticket_quantity,
                    available,
                },
            });
        };

        // 2) Сама бронь
        let id = next_id(&mut *tx, IdKind::Booking).await?;
        let created = sqlx::query_as::<_, Booking>(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES ($1, $2, $3, $4, $5) RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(&id)
        .bind(&booking.user_id)
        .bind(&booking.event_id)
        .bind(booking.ticket_quantity)
        .bind(chrono::Utc::now().naive_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match constraint_error(e, "") {
            AppError::Conflict(_) => AppError::not_found("user", booking.user_id.clone()),
            other => other,
        })?;

        // 3) Коммитим
        tx.commit().await?;
        debug!(booking_id = %created.id, remaining, "Booking stored");
        Ok(created)
    }

    async fn get_booking(&self, id: &str) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_bookings(&self) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings {ORDER_BY_ID}"))
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 {ORDER_BY_ID}"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn cancel_booking(&self, id: &str) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "DELETE FROM bookings WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(booking) = booking else {
            tx.rollback().await?;
            return Err(AppError::not_found("booking", id));
        };

        // Возврат не должен выйти за пределы int4
        let restocked: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE events
            SET available_tickets = available_tickets + $1
            WHERE id = $2 AND available_tickets <= 2147483647 - $1
            RETURNING available_tickets
            "#,
        )
        .bind(booking.ticket_quantity)
        .bind(&booking.event_id)
        .fetch_optional(&mut *tx)
        .await?;

        if restocked.is_none() {
            tx.rollback().await?;
            return Err(restock_overflow(&booking));
        }

        tx.commit().await?;
        Ok(booking)
    }
}
