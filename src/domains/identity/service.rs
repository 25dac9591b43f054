//! Users, credentials and admin aggregates

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    auth::Roles, utils::is_valid_email, AppError, AuthService, Result, TokenPair, User,
    UserResponse,
};
use sqlx::{error::DatabaseError as _, PgPool};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: TokenPair,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub total_users: i64,
    pub total_vendors: i64,
    pub total_admins: i64,
    pub active_users: i64,
    pub total_purchases: i64,
    pub total_spent: f64,
    pub average_purchase_amount: f64,
}

#[derive(Clone)]
pub struct IdentityService {
    db: PgPool,
    auth: Arc<AuthService>,
}

impl IdentityService {
    pub fn new(db: PgPool, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse> {
        request
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let email = request.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email address"));
        }

        let role = match request.role.as_deref() {
            None | Some("") | Some(Roles::USER) => Roles::USER,
            Some(Roles::VENDOR) => Roles::VENDOR,
            Some(Roles::ADMIN) => Roles::ADMIN,
            Some(other) => {
                return Err(AppError::validation(format!("Unknown role: {}", other)));
            }
        };

        let password_hash = self.auth.hash_password(&request.password)?;

        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, role, preferences, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, '{}', TRUE, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await;

        let user = match result {
            Ok(user) => user,
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                return Err(AppError::conflict("Email already registered"));
            }
            Err(e) => return Err(e.into()),
        };

        let token = self
            .auth
            .issue_tokens(&user.id.to_string(), &user.email, &user.role)?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");

        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let email = request.email.trim().to_lowercase();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::authentication("Invalid credentials"))?;

        if !user.is_active {
            return Err(AppError::authentication("Account is deactivated"));
        }

        if !self
            .auth
            .verify_password(&request.password, &user.password_hash)?
        {
            return Err(AppError::authentication("Invalid credentials"));
        }

        let token = self
            .auth
            .issue_tokens(&user.id.to_string(), &user.email, &user.role)?;

        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    /// Resolve a bearer token to the user id it was minted for.
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let ctx = self.auth.authenticate(token)?;
        ctx.user_id
            .parse::<Uuid>()
            .map_err(|_| AppError::authentication("Malformed token subject"))
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.auth.refresh(refresh_token)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserResponse>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    pub async fn promote(&self, user_id: Uuid, role: &str) -> Result<UserResponse> {
        if role != Roles::VENDOR && role != Roles::ADMIN {
            return Err(AppError::validation(format!("Cannot promote to role: {}", role)));
        }

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(role)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

        tracing::info!(user_id = %user_id, role = %role, "User promoted");
        Ok(user.into())
    }

    pub async fn get_preferences(&self, user_id: Uuid) -> Result<Value> {
        let user = self.get_user(user_id).await?;
        Ok(user.preferences)
    }

    pub async fn set_preferences(&self, user_id: Uuid, preferences: &Value) -> Result<()> {
        sqlx::query("UPDATE users SET preferences = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(preferences)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn admin_overview(&self) -> Result<AdminOverview> {
        let (total_users, total_vendors, total_admins, active_users): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE role = 'user'),
                    COUNT(*) FILTER (WHERE role = 'vendor'),
                    COUNT(*) FILTER (WHERE role = 'admin'),
                    COUNT(*) FILTER (WHERE is_active)
                FROM users
                "#,
            )
            .fetch_one(&self.db)
            .await?;

        let (total_purchases, total_spent, average): (i64, Option<f64>, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(id), SUM(total_amount), AVG(total_amount) FROM purchase_history",
            )
            .fetch_one(&self.db)
            .await?;

        Ok(AdminOverview {
            total_users,
            total_vendors,
            total_admins,
            active_users,
            total_purchases,
            total_spent: total_spent.unwrap_or(0.0),
            average_purchase_amount: average.unwrap_or(0.0),
        })
    }

    pub async fn preferences_summary(&self) -> Result<Value> {
        let users: Vec<(Value,)> = sqlx::query_as("SELECT preferences FROM users")
            .fetch_all(&self.db)
            .await?;

        let mut with_preferences = 0i64;
        let mut without_preferences = 0i64;
        let mut distribution: std::collections::HashMap<String, std::collections::HashMap<String, i64>> =
            std::collections::HashMap::new();

        for (preferences,) in &users {
            match preferences.as_object().filter(|m| !m.is_empty()) {
                Some(map) => {
                    with_preferences += 1;
                    for (key, value) in map {
                        let value_text = shared::scalar_to_text(value);
                        *distribution
                            .entry(key.clone())
                            .or_default()
                            .entry(value_text)
                            .or_default() += 1;
                    }
                }
                None => without_preferences += 1,
            }
        }

        let top_preferences: std::collections::HashMap<String, Vec<(String, i64)>> = distribution
            .iter()
            .map(|(key, values)| {
                let mut sorted: Vec<(String, i64)> =
                    values.iter().map(|(v, c)| (v.clone(), *c)).collect();
                sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                sorted.truncate(5);
                (key.clone(), sorted)
            })
            .collect();

        Ok(json!({
            "total_users": users.len(),
            "users_with_preferences": with_preferences,
            "users_without_preferences": without_preferences,
            "preferences_distribution": distribution,
            "top_preferences": top_preferences,
        }))
    }
}
