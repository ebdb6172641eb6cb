//! otp.rs
//!
//! Одноразовые коды для сброса пароля: email -> {код, срок действия}.
//!
//! В памяти просроченные записи игнорируются при чтении и дополнительно
//! вычищаются фоновой задачей (`spawn_sweeper`). В Redis срок задаётся TTL ключа.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};
use crate::redis_client::RedisClient;

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn put(&self, email: &str, code: &str, ttl: Duration) -> AppResult<()>;
    /// Действующий код или `None`, если его нет или он просрочен.
    async fn get(&self, email: &str) -> AppResult<Option<String>>;
    /// Гасит код, если он совпал и ещё действует. Проверка и удаление атомарны:
    /// один код срабатывает ровно один раз.
    async fn take(&self, email: &str, code: &str) -> AppResult<bool>;
    /// Удаляет просроченные записи, возвращает их количество.
    async fn sweep(&self) -> AppResult<usize>;
}

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    entries: Mutex<HashMap<String, OtpEntry>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, OtpEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn put(&self, email: &str, code: &str, ttl: Duration) -> AppResult<()> {
        let entry = OtpEntry {
            code: code.to_string(),
            expires_at: Utc::now() + ttl,
        };
        self.entries().insert(email.to_string(), entry);
        Ok(())
    }

    async fn get(&self, email: &str) -> AppResult<Option<String>> {
        let now = Utc::now();
        Ok(self
            .entries()
            .get(email)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.code.clone()))
    }

    async fn take(&self, email: &str, code: &str) -> AppResult<bool> {
        let now = Utc::now();
        let mut entries = self.entries();
        let matches = entries
            .get(email)
            .is_some_and(|entry| now < entry.expires_at && entry.code == code);
        if matches {
            entries.remove(email);
        }
        Ok(matches)
    }

    async fn sweep(&self) -> AppResult<usize> {
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        Ok(before - entries.len())
    }
}

pub struct RedisOtpStore {
    redis: RedisClient,
}

impl RedisOtpStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn key(email: &str) -> String {
        format!("otp:{}", email)
    }
}

// GET и DEL одним скриптом, чтобы между ними не вклинился другой запрос
const TAKE_IF_EQUAL: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn redis_error(e: redis::RedisError) -> AppError {
    AppError::internal(format!("redis: {e}"))
}

#[async_trait]
impl OtpStore for RedisOtpStore {
    async fn put(&self, email: &str, code: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.redis.conn.clone();
        let seconds = ttl.num_seconds().max(1) as u64;
        let _: () = conn
            .set_ex(Self::key(email), code, seconds)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn get(&self, email: &str) -> AppResult<Option<String>> {
        let mut conn = self.redis.conn.clone();
        conn.get(Self::key(email)).await.map_err(redis_error)
    }

    async fn take(&self, email: &str, code: &str) -> AppResult<bool> {
        let mut conn = self.redis.conn.clone();
        let removed: i64 = redis::Script::new(TAKE_IF_EQUAL)
            .key(Self::key(email))
            .arg(code)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(removed == 1)
    }

    async fn sweep(&self) -> AppResult<usize> {
        // Redis сам удаляет ключи по TTL
        Ok(0)
    }
}

/// Периодическая очистка просроченных кодов.
pub fn spawn_sweeper(store: Arc<dyn OtpStore>, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "OTP sweeper started");
        let mut ticker = tokio::time::interval(interval);
        // первый тик срабатывает сразу
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Expired OTP codes removed"),
                Err(e) => error!("OTP sweep failed: {:?}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn code_is_returned_until_it_expires() {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", "123456", Duration::minutes(5)).await.unwrap();
        assert_eq!(store.get("a@example.com").await.unwrap().as_deref(), Some("123456"));

        store.put("b@example.com", "654321", Duration::seconds(-1)).await.unwrap();
        assert_eq!(store.get("b@example.com").await.unwrap(), None);
        // ленивое истечение не удаляет запись
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn new_code_replaces_previous_one() {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", "111111", Duration::minutes(5)).await.unwrap();
        store.put("a@example.com", "222222", Duration::minutes(5)).await.unwrap();
        assert_eq!(store.get("a@example.com").await.unwrap().as_deref(), Some("222222"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let store = MemoryOtpStore::new();
        store.put("live@example.com", "1", Duration::minutes(5)).await.unwrap();
        store.put("old1@example.com", "2", Duration::seconds(-10)).await.unwrap();
        store.put("old2@example.com", "3", Duration::seconds(-1)).await.unwrap();

        assert_eq!(store.sweep().await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("live@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn take_consumes_only_a_matching_live_code() {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", "123456", Duration::minutes(5)).await.unwrap();

        assert!(!store.take("a@example.com", "000000").await.unwrap());
        // неверный код не сжигает верный
        assert!(store.take("a@example.com", "123456").await.unwrap());
        assert!(!store.take("a@example.com", "123456").await.unwrap());

        store.put("b@example.com", "654321", Duration::seconds(-1)).await.unwrap();
        assert!(!store.take("b@example.com", "654321").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_runs_on_interval() {
        let store = Arc::new(MemoryOtpStore::new());
        store.put("old@example.com", "1", Duration::seconds(-1)).await.unwrap();

        let handle = spawn_sweeper(store.clone(), std::time::Duration::from_secs(60));
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(store.is_empty());
        handle.abort();
    }
}
