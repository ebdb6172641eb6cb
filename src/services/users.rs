//! users.rs
//!
//! Регистрация, вход, сброс пароля через OTP и справочник пользователей.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use super::auth::{hash_password, verify_password, TokenService};
use super::mailer::Mailer;
use super::otp::OtpStore;
use crate::error::{AppError, AppResult};
use crate::ids::{validate_id, IdKind};
use crate::models::{Role, User};
use crate::store::{NewUser, Store, UserChanges};

#[derive(Debug, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Некорректный email"))]
    pub email: String,
    #[validate(length(min = 6, max = 72, message = "Пароль должен быть от 6 до 72 символов"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(email(message = "Некорректный email"))]
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub email: String,
    pub token: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    otp: Arc<dyn OtpStore>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenService,
    bcrypt_cost: u32,
    otp_ttl: chrono::Duration,
}

fn new_otp_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

impl UserService {
    pub fn new(
        store: Arc<dyn Store>,
        otp: Arc<dyn OtpStore>,
        mailer: Arc<dyn Mailer>,
        tokens: TokenService,
        bcrypt_cost: u32,
        otp_ttl: chrono::Duration,
    ) -> Self {
        Self { store, otp, mailer, tokens, bcrypt_cost, otp_ttl }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn create_user(&self, credentials: Credentials, role: Role) -> AppResult<User> {
        credentials.validate()?;
        if self.store.find_user_by_email(&credentials.email).await?.is_some() {
            return Err(AppError::Conflict("Email уже используется".to_string()));
        }

        let password_hash = hash_password(credentials.password, self.bcrypt_cost).await?;
        let user = self
            .store
            .insert_user(NewUser {
                email: credentials.email,
                password_hash,
                role,
            })
            .await?;
        info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    pub async fn register(&self, credentials: Credentials) -> AppResult<AuthResponse> {
        let user = self.create_user(credentials, Role::User).await?;
        let token = self.tokens.issue(&user)?;
        Ok(AuthResponse { email: user.email, token, role: user.role })
    }

    pub async fn authenticate(&self, credentials: Credentials) -> AppResult<AuthResponse> {
        let invalid = || AppError::Unauthorized("Неверный email или пароль".to_string());

        let user = self
            .store
            .find_user_by_email(&credentials.email)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(credentials.password, user.password_hash.clone()).await? {
            warn!(email = %user.email, "Login failed");
            return Err(invalid());
        }

        let token = self.tokens.issue(&user)?;
        info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(AuthResponse { email: user.email, token, role: user.role })
    }

    /// Создаёт администратора при старте, если такого email ещё нет.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> AppResult<()> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Ok(());
        }
        let admin = self
            .create_user(
                Credentials { email: email.to_string(), password: password.to_string() },
                Role::Admin,
            )
            .await?;
        info!(user_id = %admin.id, "Admin account bootstrapped");
        Ok(())
    }

    pub async fn user_id_by_email(&self, email: &str) -> AppResult<String> {
        self.store
            .find_user_by_email(email)
            .await?
            .map(|user| user.id)
            .ok_or_else(|| AppError::not_found("user", email))
    }

    // --- OTP ---

    pub async fn send_otp(&self, email: &str) -> AppResult<()> {
        if self.store.find_user_by_email(email).await?.is_none() {
            return Err(AppError::not_found("user", email));
        }

        let code = new_otp_code();
        self.otp.put(email, &code, self.otp_ttl).await?;

        let body = format!(
            "Your OTP for password reset is: {}\n\nThis OTP will expire in {} minutes.",
            code,
            self.otp_ttl.num_minutes()
        );
        self.mailer.send(email, "Password Reset OTP", &body).await?;
        info!(%email, "OTP issued");
        Ok(())
    }

    /// Проверка кода без его погашения: он ещё нужен для сброса пароля.
    pub async fn verify_otp(&self, email: &str, code: &str) -> AppResult<bool> {
        Ok(self.otp.get(email).await?.is_some_and(|stored| stored == code))
    }

    pub async fn reset_password(&self, email: &str, code: &str, new_password: &str) -> AppResult<()> {
        let credentials = Credentials { email: email.to_string(), password: new_password.to_string() };
        credentials.validate()?;

        // код гасится атомарно, второй параллельный сброс с ним же не пройдёт
        if !self.otp.take(email, code).await? {
            return Err(AppError::Unauthorized("Неверный OTP или email".to_string()));
        }

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found("user", email))?;

        let password_hash = hash_password(credentials.password, self.bcrypt_cost).await?;
        if !self.store.set_password_hash(&user.id, &password_hash).await? {
            return Err(AppError::not_found("user", user.id));
        }

        info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    // --- справочник ---

    pub async fn get(&self, id: &str) -> AppResult<User> {
        validate_id(IdKind::User, id)?;
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn update(&self, id: &str, update: UserUpdate) -> AppResult<User> {
        validate_id(IdKind::User, id)?;
        update.validate()?;
        self.store
            .update_user(id, UserChanges { email: update.email, role: update.role })
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        validate_id(IdKind::User, id)?;
        self.store.delete_user(id).await?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::services::otp::MemoryOtpStore;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl Mailer for Outbox {
        async fn send(&self, to: &str, _subject: &str, body: &str) -> AppResult<()> {
            self.0.lock().unwrap().push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    impl Outbox {
        fn last_code(&self) -> String {
            let (_, body) = self.0.lock().unwrap().last().cloned().unwrap();
            body.split_whitespace()
                .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
                .unwrap()
                .to_string()
        }
    }

    fn service(ttl: chrono::Duration) -> (UserService, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::default());
        let service = UserService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryOtpStore::new()),
            outbox.clone(),
            TokenService::new(&JwtConfig { secret: "s".into(), expires_in_hours: 1 }),
            4,
            ttl,
        );
        (service, outbox)
    }

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials { email: email.into(), password: password.into() }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let (users, _) = service(chrono::Duration::minutes(5));
        let registered = users.register(creds("kamal@example.com", "secret1")).await.unwrap();
        assert_eq!(registered.role, Role::User);
        assert_eq!(users.tokens().verify(&registered.token).unwrap().uid, "U00-001");

        let login = users.authenticate(creds("kamal@example.com", "secret1")).await.unwrap();
        assert_eq!(login.email, "kamal@example.com");

        let err = users.authenticate(creds("kamal@example.com", "wrong-pw")).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        let err = users.authenticate(creds("nobody@example.com", "secret1")).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn duplicate_or_invalid_registration_is_rejected() {
        let (users, _) = service(chrono::Duration::minutes(5));
        users.register(creds("a@example.com", "secret1")).await.unwrap();
        assert_eq!(users.register(creds("a@example.com", "secret2")).await.unwrap_err().code(), "CONFLICT");
        assert_eq!(users.register(creds("not-an-email", "secret1")).await.unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(users.register(creds("b@example.com", "123")).await.unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn otp_reset_flow() {
        let (users, outbox) = service(chrono::Duration::minutes(5));
        users.register(creds("a@example.com", "old-password")).await.unwrap();

        users.send_otp("a@example.com").await.unwrap();
        let code = outbox.last_code();
        assert!(users.verify_otp("a@example.com", &code).await.unwrap());
        // проверка не гасит код
        assert!(users.verify_otp("a@example.com", &code).await.unwrap());
        assert!(!users.verify_otp("a@example.com", "000000x").await.unwrap());

        users.reset_password("a@example.com", &code, "new-password").await.unwrap();
        assert!(users.authenticate(creds("a@example.com", "new-password")).await.is_ok());
        assert!(users.authenticate(creds("a@example.com", "old-password")).await.is_err());

        // код одноразовый
        let err = users.reset_password("a@example.com", &code, "third-password").await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_code_resets_the_password_once() {
        let (users, outbox) = service(chrono::Duration::minutes(5));
        users.register(creds("a@example.com", "old-password")).await.unwrap();
        users.send_otp("a@example.com").await.unwrap();
        let code = outbox.last_code();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let (users, code) = (users.clone(), code.clone());
                tokio::spawn(async move {
                    users.reset_password("a@example.com", &code, &format!("password-{i}")).await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => succeeded += 1,
                Err(e) => assert_eq!(e.code(), "UNAUTHORIZED"),
            }
        }
        assert_eq!(succeeded, 1);
    }

    #[tokio::test]
    async fn invalid_new_password_keeps_the_code() {
        let (users, outbox) = service(chrono::Duration::minutes(5));
        users.register(creds("a@example.com", "old-password")).await.unwrap();
        users.send_otp("a@example.com").await.unwrap();
        let code = outbox.last_code();

        let err = users.reset_password("a@example.com", &code, "123").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert!(users.verify_otp("a@example.com", &code).await.unwrap());
    }

    #[tokio::test]
    async fn expired_otp_is_rejected() {
        let (users, outbox) = service(chrono::Duration::seconds(-1));
        users.register(creds("a@example.com", "old-password")).await.unwrap();
        users.send_otp("a@example.com").await.unwrap();
        let code = outbox.last_code();
        assert!(!users.verify_otp("a@example.com", &code).await.unwrap());
    }

    #[tokio::test]
    async fn otp_for_unknown_email_is_not_found() {
        let (users, outbox) = service(chrono::Duration::minutes(5));
        assert_eq!(users.send_otp("ghost@example.com").await.unwrap_err().code(), "NOT_FOUND");
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_bootstrap_is_idempotent() {
        let (users, _) = service(chrono::Duration::minutes(5));
        users.ensure_admin("root@example.com", "rootpass").await.unwrap();
        users.ensure_admin("root@example.com", "rootpass").await.unwrap();
        let all = users.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].role, Role::Admin);
    }

    #[tokio::test]
    async fn directory_update_and_delete() {
        let (users, _) = service(chrono::Duration::minutes(5));
        users.register(creds("a@example.com", "secret1")).await.unwrap();
        let id = users.user_id_by_email("a@example.com").await.unwrap();

        let updated = users
            .update(&id, UserUpdate { email: "b@example.com".into(), role: Role::Admin })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(users.get(&id).await.unwrap().email, "b@example.com");

        users.delete(&id).await.unwrap();
        assert_eq!(users.delete(&id).await.unwrap_err().code(), "NOT_FOUND");
        assert_eq!(users.user_id_by_email("b@example.com").await.unwrap_err().code(), "NOT_FOUND");
    }
}
