//! Notification sender service: channel-agnostic delivery of queued
//! notification records. Runs as its own binary (`mercat_sender`) sharing
//! the database with the backend.

pub mod adapters;
pub mod manager;
pub mod routes;

pub use manager::NotificationManager;
pub use routes::create_sender_router;
