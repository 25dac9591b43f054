//! Reward catalogue and the redemption lifecycle

use super::engine::GamificationEngine;
use chrono::{Duration, Utc};
use serde::Serialize;
use shared::{
    utils::{generate_redemption_code, normalize_code},
    AppError, RedemptionWithReward, Result, Reward, RewardRedemption,
};
use sqlx::{error::DatabaseError as _, PgPool};
use uuid::Uuid;

const REDEMPTION_VALIDITY_DAYS: i64 = 30;
const CODE_RETRY_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    pub message: String,
    pub redemption_code: String,
    pub reward_name: String,
    pub points_spent: i32,
    pub remaining_points: i32,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeValidation {
    pub valid: bool,
    pub message: String,
    pub redemption_code: String,
    pub is_used: bool,
    pub is_expired: bool,
    pub reward_name: Option<String>,
    pub reward_description: Option<String>,
    pub reward_type: Option<String>,
    pub reward_value: Option<String>,
    pub used_at: Option<chrono::DateTime<Utc>>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Clone)]
pub struct RewardService {
    db: PgPool,
}

impl RewardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_active(&self) -> Result<Vec<Reward>> {
        let rewards =
            sqlx::query_as::<_, Reward>("SELECT * FROM rewards WHERE is_active = TRUE ORDER BY points_cost")
                .fetch_all(&self.db)
                .await?;

        Ok(rewards)
    }

    pub async fn get(&self, reward_id: Uuid) -> Result<Reward> {
        sqlx::query_as::<_, Reward>("SELECT * FROM rewards WHERE id = $1")
            .bind(reward_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("reward"))
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        points_cost: i32,
        reward_type: &str,
        reward_value: Option<&str>,
        max_redemptions: Option<i32>,
    ) -> Result<Reward> {
        if points_cost < 0 {
            return Err(AppError::validation("points_cost must be >= 0"));
        }

        let reward = sqlx::query_as::<_, Reward>(
            r#"
            INSERT INTO rewards
                (id, name, description, points_cost, reward_type, reward_value,
                 is_active, max_redemptions, current_redemptions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, 0, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(points_cost)
        .bind(reward_type)
        .bind(reward_value)
        .bind(max_redemptions)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(reward)
    }

    /// Redeem a reward for points. Capacity, balance and the new redemption
    /// row move inside a single transaction; the reward row is locked so the
    /// contended `current_redemptions` counter cannot overshoot.
    pub async fn redeem(&self, user_id: Uuid, reward_id: Uuid) -> Result<RedemptionReceipt> {
        // The code carries a unique index; collisions are vanishingly rare
        // but retried anyway.
        for attempt in 0..CODE_RETRY_ATTEMPTS {
            let code = generate_redemption_code();

            let mut tx = self.db.begin().await?;

            let reward = sqlx::query_as::<_, Reward>("SELECT * FROM rewards WHERE id = $1 FOR UPDATE")
                .bind(reward_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::not_found("reward"))?;

            if !reward.is_active {
                return Err(AppError::bad_request("Reward is not available"));
            }

            if let Some(max) = reward.max_redemptions {
                if reward.current_redemptions >= max {
                    return Err(AppError::bad_request("Reward is sold out"));
                }
            }

            let remaining_points =
                GamificationEngine::spend_experience_tx(&mut tx, user_id, reward.points_cost)
                    .await?;

            let expires_at = Utc::now() + Duration::days(REDEMPTION_VALIDITY_DAYS);

            let inserted = sqlx::query(
                r#"
                INSERT INTO reward_redemptions
                    (id, user_id, reward_id, points_spent, redemption_code,
                     is_used, used_at, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5, FALSE, NULL, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(reward_id)
            .bind(reward.points_cost)
            .bind(&code)
            .bind(expires_at)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                    tracing::warn!(attempt, "Redemption code collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            sqlx::query(
                "UPDATE rewards SET current_redemptions = current_redemptions + 1 WHERE id = $1",
            )
            .bind(reward_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            tracing::info!(
                user_id = %user_id,
                reward_id = %reward_id,
                points_spent = reward.points_cost,
                redemption_code = %code,
                "Reward redeemed"
            );

            return Ok(RedemptionReceipt {
                message: "Reward redeemed successfully".to_string(),
                redemption_code: code,
                reward_name: reward.name,
                points_spent: reward.points_cost,
                remaining_points,
                expires_at,
            });
        }

        Err(AppError::internal("Could not allocate a unique redemption code"))
    }

    /// Redemptions of a user, optionally filtered by lifecycle state.
    pub async fn user_redemptions(
        &self,
        user_id: Uuid,
        status_filter: Option<&str>,
    ) -> Result<Vec<RedemptionWithReward>> {
        let base = r#"
            SELECT rr.id, rr.user_id, rr.reward_id, rr.points_spent,
                   rr.redemption_code, rr.is_used, rr.used_at, rr.expires_at,
                   rr.created_at,
                   r.name AS reward_name, r.description AS reward_description,
                   r.reward_type, r.reward_value
            FROM reward_redemptions rr
            JOIN rewards r ON r.id = rr.reward_id
            WHERE rr.user_id = $1
        "#;

        let clause = match status_filter {
            Some("available") => {
                " AND rr.is_used = FALSE AND (rr.expires_at IS NULL OR rr.expires_at > NOW())"
            }
            Some("used") => " AND rr.is_used = TRUE",
            Some("expired") => {
                " AND rr.is_used = FALSE AND rr.expires_at IS NOT NULL AND rr.expires_at <= NOW()"
            }
            Some(other) => {
                return Err(AppError::validation(format!(
                    "Unknown status filter: {}",
                    other
                )))
            }
            None => "",
        };

        let query = format!("{}{} ORDER BY rr.created_at DESC", base, clause);

        let redemptions = sqlx::query_as::<_, RedemptionWithReward>(&query)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;

        Ok(redemptions)
    }

    async fn find_by_code(&self, code: &str) -> Result<RewardRedemption> {
        let normalized = normalize_code(code);

        sqlx::query_as::<_, RewardRedemption>(
            "SELECT * FROM reward_redemptions WHERE UPPER(redemption_code) = $1",
        )
        .bind(&normalized)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("redemption code"))
    }

    /// Inspect a code without mutating it.
    pub async fn validate_code(&self, code: &str) -> Result<CodeValidation> {
        let redemption = self.find_by_code(code).await?;
        let reward = sqlx::query_as::<_, Reward>("SELECT * FROM rewards WHERE id = $1")
            .bind(redemption.reward_id)
            .fetch_optional(&self.db)
            .await?;

        let is_expired = redemption
            .expires_at
            .map(|e| e < Utc::now())
            .unwrap_or(false);
        let valid = !redemption.is_used && !is_expired;

        let message = if valid {
            "Reward valid and available"
        } else if redemption.is_used {
            "Reward already used"
        } else {
            "Reward expired"
        };

        Ok(CodeValidation {
            valid,
            message: message.to_string(),
            redemption_code: normalize_code(code),
            is_used: redemption.is_used,
            is_expired,
            reward_name: reward.as_ref().map(|r| r.name.clone()),
            reward_description: reward.as_ref().and_then(|r| r.description.clone()),
            reward_type: reward.as_ref().map(|r| r.reward_type.clone()),
            reward_value: reward.as_ref().and_then(|r| r.reward_value.clone()),
            used_at: redemption.used_at,
            expires_at: redemption.expires_at,
        })
    }

    /// Burn a code at point of use. Fails on used or expired codes.
    pub async fn use_code(&self, code: &str) -> Result<RewardRedemption> {
        let normalized = normalize_code(code);

        let mut tx = self.db.begin().await?;

        let redemption = sqlx::query_as::<_, RewardRedemption>(
            "SELECT * FROM reward_redemptions WHERE UPPER(redemption_code) = $1 FOR UPDATE",
        )
        .bind(&normalized)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("redemption code"))?;

        if redemption.is_used {
            return Err(AppError::bad_request("Reward already used"));
        }

        if let Some(expires_at) = redemption.expires_at {
            if expires_at < Utc::now() {
                return Err(AppError::bad_request("Reward expired"));
            }
        }

        let updated = sqlx::query_as::<_, RewardRedemption>(
            r#"
            UPDATE reward_redemptions
            SET is_used = TRUE, used_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(redemption.id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(redemption_code = %normalized, "Redemption code used");
        Ok(updated)
    }

    /// Vendor-side expiry. Used codes cannot expire; expiring an already
    /// expired code is an idempotent no-op.
    pub async fn expire_code(&self, code: &str) -> Result<RewardRedemption> {
        let redemption = self.find_by_code(code).await?;

        if redemption.is_used {
            return Err(AppError::bad_request("Cannot expire a used reward"));
        }

        if let Some(expires_at) = redemption.expires_at {
            if expires_at <= Utc::now() {
                return Ok(redemption);
            }
        }

        let updated = sqlx::query_as::<_, RewardRedemption>(
            "UPDATE reward_redemptions SET expires_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(redemption.id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(redemption_code = %normalize_code(code), "Redemption code expired by vendor");
        Ok(updated)
    }
}
