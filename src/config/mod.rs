use serde::Deserialize;
use std::env;
use std::str::FromStr;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub otp: OtpConfig,
    pub smtp: Option<SmtpConfig>,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

// Настройки базы данных. Без DATABASE_URL работаем на хранилище в памяти
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

// Настройки Redis (хранилище OTP). Без REDIS_URL коды живут в памяти процесса
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Настройки JWT
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub bcrypt_cost: u32,
    pub cors_allowed_origins: Vec<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
}

// Почта для OTP. Без SMTP_HOST письма только пишутся в лог
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Вне development секрет обязателен
        let secret = match optional("JWT_SECRET") {
            Some(secret) => secret,
            None if environment == "development" => DEV_JWT_SECRET.to_string(),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                port: parsed("SMTP_PORT", "587")?,
                username: optional("SMTP_USERNAME"),
                password: optional("SMTP_PASSWORD"),
                from: env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "Ticket Booking <noreply@ticket-booking.local>".to_string()),
                host,
            }),
            None => None,
        };

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("PORT", "8000")?,
                environment,
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "ticket_booking=debug,tower_http=debug".to_string()),
                log_format,
            },
            database: DatabaseConfig {
                url: optional("DATABASE_URL"),
                pool_size: parsed("DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: optional("REDIS_URL"),
            },
            jwt: JwtConfig {
                secret,
                expires_in_hours: parsed("JWT_EXPIRES_IN_HOURS", "24")?,
            },
            security: SecurityConfig {
                bcrypt_cost: parsed("BCRYPT_COST", "10")?,
                cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect(),
                admin_email: optional("ADMIN_EMAIL"),
                admin_password: optional("ADMIN_PASSWORD"),
            },
            otp: OtpConfig {
                ttl_seconds: parsed("OTP_TTL_SECONDS", "300")?,
                sweep_interval_seconds: parsed("OTP_SWEEP_INTERVAL_SECONDS", "300")?,
            },
            smtp,
        })
    }

    /// Конфигурация для тестов и локального запуска: всё в памяти, дешёвый bcrypt.
    pub fn in_memory() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "ticket_booking=debug".to_string(),
                log_format: LogFormat::Pretty,
            },
            database: DatabaseConfig { url: None, pool_size: 1 },
            redis: RedisConfig { url: None },
            jwt: JwtConfig {
                secret: DEV_JWT_SECRET.to_string(),
                expires_in_hours: 1,
            },
            security: SecurityConfig {
                bcrypt_cost: 4,
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
                admin_email: None,
                admin_password: None,
            },
            otp: OtpConfig {
                ttl_seconds: 300,
                sweep_interval_seconds: 300,
            },
            smtp: None,
        }
    }
}
