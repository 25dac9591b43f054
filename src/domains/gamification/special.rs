//! Special rewards: points-free rewards distributed to selected users,
//! single-use on claim.
//!
//! Two-phase lifecycle: distribution creates redemption rows with
//! `is_used = false`; the user-initiated claim writes a used row
//! atomically. A reward counts as redeemed once any of its rows is used.

use super::notifications::NotificationService;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    utils::generate_special_reward_code, AppError, Result, SpecialReward,
    SpecialRewardRedemption,
};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSpecialRewardRequest {
    pub name: String,
    pub description: Option<String>,
    pub reward_type: String,
    pub reward_value: Option<String>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub target_users: Vec<Uuid>,
    #[serde(default)]
    pub target_segments: Vec<String>,
    pub max_redemptions: Option<i32>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecialRewardView {
    pub reward: SpecialReward,
    pub is_redeemed: bool,
    pub is_available: bool,
    pub is_expired: bool,
    pub redemption_count: i64,
    pub last_redemption: Option<SpecialRewardRedemption>,
    pub can_redeem: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionResult {
    pub success: bool,
    pub message: String,
    pub users_affected: i64,
    pub notifications_sent: i64,
}

fn uuid_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Access rule: global rewards reach everyone; otherwise the user must be
/// targeted directly, belong to a targeted segment, or already hold a
/// distribution row.
pub fn can_access(
    reward: &SpecialReward,
    user_id: Uuid,
    user_segments: &[String],
    has_distribution_row: bool,
) -> bool {
    if reward.is_global {
        return true;
    }

    if uuid_list(&reward.target_users).contains(&user_id.to_string()) {
        return true;
    }

    let target_segments = uuid_list(&reward.target_segments);
    if user_segments.iter().any(|s| target_segments.contains(s)) {
        return true;
    }

    has_distribution_row
}

#[derive(Clone)]
pub struct SpecialRewardService {
    db: PgPool,
}

impl SpecialRewardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: CreateSpecialRewardRequest) -> Result<SpecialReward> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("name is required"));
        }

        let reward = sqlx::query_as::<_, SpecialReward>(
            r#"
            INSERT INTO special_rewards
                (id, name, description, reward_type, reward_value, is_global,
                 target_users, target_segments, max_redemptions, expires_at,
                 is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(&request.reward_type)
        .bind(&request.reward_value)
        .bind(request.is_global)
        .bind(serde_json::to_value(
            request.target_users.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
        )?)
        .bind(serde_json::to_value(&request.target_segments)?)
        .bind(request.max_redemptions)
        .bind(request.expires_at)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            reward_id = %reward.id,
            name = %reward.name,
            is_global = reward.is_global,
            "Special reward created"
        );

        Ok(reward)
    }

    pub async fn get(&self, reward_id: Uuid) -> Result<SpecialReward> {
        sqlx::query_as::<_, SpecialReward>("SELECT * FROM special_rewards WHERE id = $1")
            .bind(reward_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("special reward"))
    }

    async fn user_redemptions(
        &self,
        user_id: Uuid,
        reward_id: Uuid,
    ) -> Result<Vec<SpecialRewardRedemption>> {
        let rows = sqlx::query_as::<_, SpecialRewardRedemption>(
            r#"
            SELECT * FROM special_reward_redemptions
            WHERE user_id = $1 AND special_reward_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(reward_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    fn claim_cap(reward: &SpecialReward) -> i64 {
        // Single-use by default; max_redemptions raises the per-user cap.
        i64::from(reward.max_redemptions.unwrap_or(1).max(1))
    }

    /// Every active special reward annotated with the caller's state.
    pub async fn all_for_user(
        &self,
        user_id: Uuid,
        user_segments: &[String],
    ) -> Result<Vec<SpecialRewardView>> {
        let rewards = sqlx::query_as::<_, SpecialReward>(
            "SELECT * FROM special_rewards WHERE is_active = TRUE ORDER BY created_at DESC",
        )
        .fetch_all(&self.db)
        .await?;

        let now = Utc::now();
        let mut views = Vec::with_capacity(rewards.len());

        for reward in rewards {
            let redemptions = self.user_redemptions(user_id, reward.id).await?;
            let used: Vec<&SpecialRewardRedemption> =
                redemptions.iter().filter(|r| r.is_used).collect();

            let access = can_access(&reward, user_id, user_segments, !redemptions.is_empty());
            let is_redeemed = !used.is_empty();
            let is_available = (used.len() as i64) < Self::claim_cap(&reward);
            let is_expired = reward.expires_at.map(|e| e < now).unwrap_or(false);

            views.push(SpecialRewardView {
                can_redeem: access
                    && is_available
                    && !is_expired
                    && !redemptions.is_empty()
                    && !is_redeemed,
                is_redeemed,
                is_available,
                is_expired,
                redemption_count: used.len() as i64,
                last_redemption: used.last().map(|r| (*r).clone()),
                reward,
            });
        }

        Ok(views)
    }

    /// Rewards the user could still claim: accessible, not expired and
    /// under the per-user claim cap.
    pub async fn available_for_user(
        &self,
        user_id: Uuid,
        user_segments: &[String],
    ) -> Result<Vec<SpecialReward>> {
        let now = Utc::now();
        let rewards = sqlx::query_as::<_, SpecialReward>(
            r#"
            SELECT * FROM special_rewards
            WHERE is_active = TRUE
              AND (expires_at IS NULL OR expires_at > $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        let mut available = Vec::new();
        for reward in rewards {
            let redemptions = self.user_redemptions(user_id, reward.id).await?;
            let used_count = redemptions.iter().filter(|r| r.is_used).count() as i64;

            if used_count >= Self::claim_cap(&reward) {
                continue;
            }

            if can_access(&reward, user_id, user_segments, !redemptions.is_empty()) {
                available.push(reward);
            }
        }

        Ok(available)
    }

    /// User-initiated claim: writes a used redemption row in one statement.
    pub async fn redeem(
        &self,
        user_id: Uuid,
        special_reward_id: Uuid,
        user_segments: &[String],
    ) -> Result<SpecialRewardRedemption> {
        let reward = self.get(special_reward_id).await?;

        if !reward.is_active {
            return Err(AppError::bad_request("Special reward is not active"));
        }

        if let Some(expires_at) = reward.expires_at {
            if expires_at < Utc::now() {
                return Err(AppError::bad_request("Special reward has expired"));
            }
        }

        let existing = self.user_redemptions(user_id, special_reward_id).await?;

        if !can_access(&reward, user_id, user_segments, !existing.is_empty()) {
            return Err(AppError::authorization(
                "Special reward is not available for this user",
            ));
        }

        let used_count = existing.iter().filter(|r| r.is_used).count() as i64;
        if used_count >= Self::claim_cap(&reward) {
            return Err(AppError::bad_request(
                "Maximum redemptions reached for this special reward",
            ));
        }

        // If a distribution row is waiting, claim it in place; otherwise
        // mint a fresh, already-used row. Both paths are single statements.
        if let Some(unused) = existing.iter().find(|r| !r.is_used) {
            let claimed = sqlx::query_as::<_, SpecialRewardRedemption>(
                r#"
                UPDATE special_reward_redemptions
                SET is_used = TRUE, used_at = $2
                WHERE id = $1 AND is_used = FALSE
                RETURNING *
                "#,
            )
            .bind(unused.id)
            .bind(Utc::now())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::conflict("Special reward was claimed concurrently"))?;

            tracing::info!(
                user_id = %user_id,
                reward_id = %special_reward_id,
                redemption_code = %claimed.redemption_code,
                "Special reward claimed"
            );
            return Ok(claimed);
        }

        let claimed = sqlx::query_as::<_, SpecialRewardRedemption>(
            r#"
            INSERT INTO special_reward_redemptions
                (id, user_id, special_reward_id, redemption_code, is_used, used_at, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(special_reward_id)
        .bind(generate_special_reward_code())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            user_id = %user_id,
            reward_id = %special_reward_id,
            redemption_code = %claimed.redemption_code,
            "Special reward claimed"
        );

        Ok(claimed)
    }

    /// Admin distribution: one unused row per target user, capped per user,
    /// optionally announced through an in-app notification.
    pub async fn distribute(
        &self,
        special_reward_id: Uuid,
        target_users: &[Uuid],
        send_notifications: bool,
        notifications: &NotificationService,
    ) -> Result<DistributionResult> {
        let reward = self.get(special_reward_id).await?;

        let mut users_affected = 0i64;
        let mut notifications_sent = 0i64;

        for &user_id in target_users {
            let existing = self.user_redemptions(user_id, special_reward_id).await?;
            let used_count = existing.iter().filter(|r| r.is_used).count() as i64;

            if used_count >= Self::claim_cap(&reward) {
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO special_reward_redemptions
                    (id, user_id, special_reward_id, redemption_code, is_used, created_at)
                VALUES ($1, $2, $3, $4, FALSE, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(special_reward_id)
            .bind(generate_special_reward_code())
            .bind(Utc::now())
            .execute(&self.db)
            .await;

            if let Err(e) = inserted {
                tracing::error!(
                    user_id = %user_id,
                    reward_id = %special_reward_id,
                    error = %e,
                    "Error distributing special reward"
                );
                continue;
            }

            users_affected += 1;

            if send_notifications {
                let created = notifications
                    .create(
                        user_id,
                        "Nova recompensa especial!",
                        &format!("Has rebut una recompensa especial: {}", reward.name),
                        "special_reward",
                        Some(special_reward_id),
                    )
                    .await;

                match created {
                    Ok(_) => notifications_sent += 1,
                    Err(e) => {
                        tracing::error!(user_id = %user_id, error = %e, "Error creating notification")
                    }
                }
            }
        }

        Ok(DistributionResult {
            success: true,
            message: format!("Recompensa distribuïda a {} usuaris", users_affected),
            users_affected,
            notifications_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reward(is_global: bool, users: Vec<&str>, segments: Vec<&str>) -> SpecialReward {
        SpecialReward {
            id: Uuid::new_v4(),
            name: "Tast de vins".to_string(),
            description: None,
            reward_type: "event".to_string(),
            reward_value: None,
            is_global,
            target_users: json!(users),
            target_segments: json!(segments),
            max_redemptions: None,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn global_rewards_reach_everyone() {
        let r = reward(true, vec![], vec![]);
        assert!(can_access(&r, Uuid::new_v4(), &[], false));
    }

    #[test]
    fn targeted_users_have_access() {
        let user = Uuid::new_v4();
        let user_str = user.to_string();
        let r = reward(false, vec![user_str.as_str()], vec![]);

        assert!(can_access(&r, user, &[], false));
        assert!(!can_access(&r, Uuid::new_v4(), &[], false));
    }

    #[test]
    fn segment_intersection_grants_access() {
        let r = reward(false, vec![], vec!["vip", "wine-lovers"]);

        assert!(can_access(
            &r,
            Uuid::new_v4(),
            &["wine-lovers".to_string()],
            false
        ));
        assert!(!can_access(&r, Uuid::new_v4(), &["other".to_string()], false));
    }

    #[test]
    fn distribution_row_grants_access() {
        let r = reward(false, vec![], vec![]);
        assert!(can_access(&r, Uuid::new_v4(), &[], true));
        assert!(!can_access(&r, Uuid::new_v4(), &[], false));
    }
}
