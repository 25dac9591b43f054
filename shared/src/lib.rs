//! Shared library for the loyalty platform services
//!
//! Common functionality used by the backend and the notification sender:
//! - Database pool and models
//! - Authentication and authorization
//! - Configuration
//! - Typed clients for the vision model, the LLM and the sender
//! - Wire types and utilities

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod service_client;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use auth::{AuthService, Claims, TokenPair, UserContext};
pub use config::Config;
pub use database::Database;
pub use error::{AppError, Result};
pub use models::*;
pub use service_client::{SenderClient, ServiceClient, TextGenClient, VisionClient};
pub use types::*;
