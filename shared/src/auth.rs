//! Bearer tokens and password credentials
//!
//! Tokens are HS256 JWTs carrying the user id as subject plus email and
//! role. Access and refresh tokens share one shape and differ only in
//! lifetime and the `token_type` marker; refresh exchanges a live refresh
//! token for a brand-new pair.

use crate::{config::AuthConfig, error::AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub token_type: TokenKind,
}

/// Pair handed out on register/login/refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Authenticated caller, resolved from a valid access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

/// Roles known to the platform
pub struct Roles;

impl Roles {
    pub const USER: &'static str = "user";
    pub const VENDOR: &'static str = "vendor";
    pub const ADMIN: &'static str = "admin";
}

impl UserContext {
    pub fn is_admin(&self) -> bool {
        self.role == Roles::ADMIN
    }

    pub fn is_vendor(&self) -> bool {
        self.role == Roles::VENDOR
    }
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let secret = config.jwt_secret.as_bytes();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(config.access_token_ttl_seconds as i64),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_seconds as i64),
        })
    }

    fn mint(&self, user_id: &str, email: &str, role: &str, jti: &str, kind: TokenKind) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = Utc::now();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: jti.to_string(),
            token_type: kind,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("token signing failed: {}", e)))
    }

    /// Mint an access/refresh pair for a user. Both tokens share one jti.
    pub fn issue_tokens(&self, user_id: &str, email: &str, role: &str) -> Result<TokenPair> {
        let jti = uuid::Uuid::new_v4().to_string();

        Ok(TokenPair {
            access_token: self.mint(user_id, email, role, &jti, TokenKind::Access)?,
            refresh_token: self.mint(user_id, email, role, &jti, TokenKind::Refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Decode and verify a token of either kind.
    pub fn decode_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &Validation::default());

        decoded.map(|data| data.claims).map_err(|e| {
            // Expiry deserves its own message; every other decode failure
            // collapses into one to avoid oracle-ing token internals.
            if matches!(
                e.kind(),
                jsonwebtoken::errors::ErrorKind::ExpiredSignature
            ) {
                AppError::authentication("token expired")
            } else {
                AppError::authentication("token rejected")
            }
        })
    }

    /// Resolve the caller behind a bearer token.
    pub fn authenticate(&self, token: &str) -> Result<UserContext> {
        let claims = self.decode_token(token)?;

        Ok(UserContext {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Exchange a live refresh token for a fresh pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.decode_token(refresh_token)?;

        if claims.token_type != TokenKind::Refresh {
            return Err(AppError::authentication(
                "access tokens cannot be used to refresh",
            ));
        }

        self.issue_tokens(&claims.sub, &claims.email, &claims.role)
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::internal(format!("bcrypt hash failed: {}", e)))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        bcrypt::verify(password, hash)
            .map_err(|e| AppError::internal(format!("bcrypt verify failed: {}", e)))
    }
}

/// Pull the token out of an `Authorization: Bearer …` header value.
pub fn bearer_token(header: &str) -> Result<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::authentication("expected a bearer token"))
}

/// Request-level integration for axum
pub mod middleware {
    use super::{bearer_token, AuthService};
    use crate::error::AppError;
    use axum::{
        extract::{Request, State},
        middleware::Next,
        response::Response,
    };
    use std::sync::Arc;

    /// Resolves the caller when a bearer token is present and stores the
    /// `UserContext` as a request extension. Anonymous requests pass
    /// through; a presented-but-invalid token is rejected outright.
    pub async fn auth_middleware(
        State(auth): State<Arc<AuthService>>,
        mut request: Request,
        next: Next,
    ) -> std::result::Result<Response, AppError> {
        let header = request
            .headers()
            .get("authorization")
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| AppError::authentication("authorization header is not text"))
            })
            .transpose()?;

        if let Some(header) = header {
            let context = auth.authenticate(bearer_token(header)?)?;
            request.extensions_mut().insert(context);
        }

        Ok(next.run(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(&crate::config::AuthConfig {
            jwt_secret: "unit-test-secret".to_string(),
            access_token_ttl_seconds: 3600,
            refresh_token_ttl_seconds: 604800,
        })
        .unwrap()
    }

    #[test]
    fn issued_tokens_authenticate_back() {
        let auth = service();
        let pair = auth
            .issue_tokens("b49d5c1e-0000-0000-0000-000000000001", "a@b.cat", "admin")
            .unwrap();

        let ctx = auth.authenticate(&pair.access_token).unwrap();
        assert_eq!(ctx.user_id, "b49d5c1e-0000-0000-0000-000000000001");
        assert_eq!(ctx.role, "admin");
        assert!(ctx.is_admin());
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn refresh_only_accepts_refresh_tokens() {
        let auth = service();
        let pair = auth.issue_tokens("u1", "a@b.cat", "user").unwrap();

        assert!(auth.refresh(&pair.access_token).is_err());
        assert!(auth.refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let auth = service();
        let pair = auth.issue_tokens("u1", "a@b.cat", "user").unwrap();

        let mut forged = pair.access_token.clone();
        forged.pop();
        assert!(auth.authenticate(&forged).is_err());
        assert!(auth.authenticate("not-a-jwt").is_err());
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token("Bearer tok").unwrap(), "tok");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("Bearer ").is_err());
        assert!(bearer_token("tok").is_err());
    }

    #[test]
    fn password_round_trip() {
        let auth = service();
        let hash = auth.hash_password("s3cret").unwrap();
        assert!(auth.verify_password("s3cret", &hash).unwrap());
        assert!(!auth.verify_password("other", &hash).unwrap());
    }
}
