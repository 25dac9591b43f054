pub mod service;

pub use service::{is_market_store_name, StoreService};
