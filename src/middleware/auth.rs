//! Request-level authentication helpers
//!
//! The shared auth middleware decodes bearer tokens and parks a
//! `UserContext` in the request extensions; the extractors here turn that
//! into typed handler arguments and role guards.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use shared::{AppError, UserContext};

/// Extractor for the authenticated caller. Rejects the request with 401
/// when no valid token was presented.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::authentication("Missing or invalid authorization token"))
    }
}

/// Admin gate in front of CRM mutations, admin user operations and
/// special-reward distribution.
pub fn require_admin(ctx: &UserContext) -> Result<(), AppError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(AppError::authorization("Admin role required"))
    }
}

/// Vendor operations (digital tickets, redemption expiry) also accept admin.
pub fn require_vendor_or_admin(ctx: &UserContext) -> Result<(), AppError> {
    if ctx.is_vendor() || ctx.is_admin() {
        Ok(())
    } else {
        Err(AppError::authorization("Vendor role required"))
    }
}

/// Per-user resources are visible to their owner and to admins.
pub fn require_self_or_admin(ctx: &UserContext, user_id: uuid::Uuid) -> Result<(), AppError> {
    if ctx.is_admin() || ctx.user_id == user_id.to_string() {
        Ok(())
    } else {
        Err(AppError::authorization("Not allowed for this user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: &str) -> UserContext {
        UserContext {
            user_id: "u".to_string(),
            email: "a@b.cat".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn admin_gate() {
        assert!(require_admin(&ctx("admin")).is_ok());
        assert!(require_admin(&ctx("vendor")).is_err());
        assert!(require_admin(&ctx("user")).is_err());
    }

    #[test]
    fn vendor_gate_accepts_admin() {
        assert!(require_vendor_or_admin(&ctx("vendor")).is_ok());
        assert!(require_vendor_or_admin(&ctx("admin")).is_ok());
        assert!(require_vendor_or_admin(&ctx("user")).is_err());
    }

    #[test]
    fn self_gate_matches_subject_or_admin() {
        let user_id = uuid::Uuid::new_v4();

        let mut owner = ctx("user");
        owner.user_id = user_id.to_string();
        assert!(require_self_or_admin(&owner, user_id).is_ok());

        assert!(require_self_or_admin(&ctx("admin"), user_id).is_ok());
        assert!(require_self_or_admin(&ctx("user"), user_id).is_err());
    }
}
