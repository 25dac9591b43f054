pub mod auth;

pub use auth::{require_admin, require_self_or_admin, require_vendor_or_admin, CurrentUser};
