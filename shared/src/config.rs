//! Configuration management for the backend and sender services

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub services: ServicesConfig,
    pub uploads: UploadConfig,
    pub worker: WorkerConfig,
    pub vapid: VapidConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub vision_api_url: String,
    pub vision_api_key: String,
    pub vision_timeout_seconds: u64,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_timeout_seconds: u64,
    pub sender_url: String,
    pub sender_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub upload_dir: String,
    pub max_file_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub poll_interval_seconds: u64,
    pub batch_size: i64,
    pub per_ticket_delay_ms: u64,
    pub duplicate_detection_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VapidConfig {
    pub private_key_pem: String,
    pub public_key: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    pub bind_addr: String,
    pub sender_bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost:5432/mercat_db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()?,
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                acquire_timeout_seconds: env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                idle_timeout_seconds: env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()?,
                max_lifetime_seconds: env::var("DATABASE_MAX_LIFETIME_SECONDS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()?,
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "change-me-in-production".to_string()),
                access_token_ttl_seconds: env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
                refresh_token_ttl_seconds: env::var("JWT_REFRESH_TOKEN_TTL_SECONDS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()?,
            },
            services: ServicesConfig {
                vision_api_url: env::var("VISION_API_URL").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
                        .to_string()
                }),
                vision_api_key: env::var("VISION_API_KEY").unwrap_or_default(),
                vision_timeout_seconds: env::var("VISION_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                llm_url: env::var("LLM_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                llm_model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| "qwen2.5:0.5b-instruct".to_string()),
                llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
                sender_url: env::var("NOTIFICATION_SENDER_URL")
                    .unwrap_or_else(|_| "http://localhost:8007".to_string()),
                sender_timeout_seconds: env::var("SENDER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            },
            uploads: UploadConfig {
                upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
                max_file_size_bytes: env::var("MAX_FILE_SIZE_BYTES")
                    .unwrap_or_else(|_| "10485760".to_string())
                    .parse()?,
                allowed_extensions: vec![".jpg".to_string(), ".jpeg".to_string(), ".png".to_string()],
            },
            worker: WorkerConfig {
                poll_interval_seconds: env::var("WORKER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                batch_size: env::var("WORKER_BATCH_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()?,
                per_ticket_delay_ms: env::var("WORKER_PER_TICKET_DELAY_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()?,
                duplicate_detection_enabled: env::var("DUPLICATE_DETECTION_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()?,
            },
            vapid: VapidConfig {
                private_key_pem: env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
                public_key: env::var("VAPID_PUBLIC_KEY").unwrap_or_default(),
                contact_email: env::var("VAPID_EMAIL")
                    .unwrap_or_else(|_| "noreply@mercat.local".to_string()),
            },
            app: AppConfig {
                environment: env::var("ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                bind_addr: env::var("BIND_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
                sender_bind_addr: env::var("SENDER_BIND_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8007".to_string()),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}
