pub mod duplicate;
pub mod service;
pub mod vision;

pub use duplicate::{product_bag_hash, DuplicateDetector};
pub use service::TicketService;
