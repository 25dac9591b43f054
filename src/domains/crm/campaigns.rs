//! Campaigns: creation, segment fan-out and channel delivery

use super::segments::{SegmentFilters, SegmentService};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    AppError, Campaign, CampaignNotification, ChannelType, NotificationSendRequest,
    NotificationStatus, Result, SenderClient, TextGenClient,
};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

/// Deterministic copy used whenever the LLM cannot draft one
pub const FALLBACK_CAMPAIGN_MESSAGE: &str =
    "Descubre nuestras ofertas especiales esta semana en el mercat!";

const COPYWRITER_SYSTEM: &str = "Eres un copywriter para un mercado local. Escribe un mensaje corto (máx 200 caracteres), \
cálido y claro, sin emojis, basado en preferencias sugeridas.";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub description: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub segment_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub message: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
    pub segment_ids: Vec<Uuid>,
}

#[derive(Clone)]
pub struct CampaignService {
    db: PgPool,
    textgen: TextGenClient,
    segments: SegmentService,
    sender: SenderClient,
}

impl CampaignService {
    pub fn new(
        db: PgPool,
        textgen: TextGenClient,
        segments: SegmentService,
        sender: SenderClient,
    ) -> Self {
        Self {
            db,
            textgen,
            segments,
            sender,
        }
    }

    /// Create a campaign. Without an explicit message, the aggregated
    /// `preferences_contains` of the linked segments feed the LLM; failures
    /// fall back to a fixed string so creation never depends on the model.
    pub async fn create(&self, request: CreateCampaignRequest) -> Result<CampaignResponse> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("Campaign name is required"));
        }

        let message = match request.message.filter(|m| !m.trim().is_empty()) {
            Some(message) => message,
            None => self.draft_message(&request.segment_ids).await,
        };

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (id, name, description, message, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(&message)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        for segment_id in &request.segment_ids {
            sqlx::query(
                "INSERT INTO campaign_segments (id, campaign_id, segment_id) VALUES ($1, $2, $3)",
            )
            .bind(Uuid::new_v4())
            .bind(campaign.id)
            .bind(segment_id)
            .execute(&self.db)
            .await?;
        }

        tracing::info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");

        Ok(CampaignResponse {
            id: campaign.id,
            name: campaign.name,
            description: campaign.description,
            message: campaign.message,
            is_active: campaign.is_active,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
            segment_ids: request.segment_ids,
        })
    }

    async fn draft_message(&self, segment_ids: &[Uuid]) -> String {
        let mut preference_sets: Vec<Value> = Vec::new();

        for segment_id in segment_ids {
            if let Ok(segment) = self.segments.get(*segment_id).await {
                let filters = SegmentFilters::from_value(&segment.filters);
                if let Some(prefs) = filters.preferences_contains {
                    preference_sets.push(Value::Object(prefs));
                }
            }
        }

        let prompt = format!(
            "Preferencias agregadas: {}. Genera un copy promocional único con CTA suave.",
            serde_json::to_string(&preference_sets).unwrap_or_else(|_| "[]".to_string())
        );

        match self
            .textgen
            .generate(&prompt, Some(COPYWRITER_SYSTEM), 0.6, 120)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) | Err(_) => {
                tracing::warn!("LLM copy generation failed, using fallback message");
                FALLBACK_CAMPAIGN_MESSAGE.to_string()
            }
        }
    }

    pub async fn get(&self, campaign_id: Uuid) -> Result<CampaignResponse> {
        let campaign = self.get_campaign_row(campaign_id).await?;
        let segment_ids = self.linked_segment_ids(campaign_id).await?;

        Ok(CampaignResponse {
            id: campaign.id,
            name: campaign.name,
            description: campaign.description,
            message: campaign.message,
            is_active: campaign.is_active,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
            segment_ids,
        })
    }

    async fn get_campaign_row(&self, campaign_id: Uuid) -> Result<Campaign> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(campaign_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("campaign"))
    }

    async fn linked_segment_ids(&self, campaign_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT segment_id FROM campaign_segments WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_all(&self.db)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn list(&self) -> Result<Vec<CampaignResponse>> {
        let campaigns =
            sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns ORDER BY created_at DESC")
                .fetch_all(&self.db)
                .await?;

        let mut responses = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            let segment_ids = self.linked_segment_ids(campaign.id).await?;
            responses.push(CampaignResponse {
                id: campaign.id,
                name: campaign.name,
                description: campaign.description,
                message: campaign.message,
                is_active: campaign.is_active,
                created_at: campaign.created_at,
                updated_at: campaign.updated_at,
                segment_ids,
            });
        }

        Ok(responses)
    }

    /// Target user set: union of the compiled filters of every linked
    /// active segment.
    pub async fn target_users(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>> {
        let segment_ids = self.linked_segment_ids(campaign_id).await?;
        let mut users = HashSet::new();

        for segment_id in segment_ids {
            let segment = match self.segments.get(segment_id).await {
                Ok(segment) => segment,
                Err(AppError::Missing(_)) => continue,
                Err(e) => return Err(e),
            };

            if !segment.is_active {
                continue;
            }

            let filters = SegmentFilters::from_value(&segment.filters);
            users.extend(self.segments.compile(&filters).await?);
        }

        Ok(users)
    }

    pub async fn preview_users(&self, campaign_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        self.get_campaign_row(campaign_id).await?;

        let mut users: Vec<Uuid> = self.target_users(campaign_id).await?.into_iter().collect();
        users.sort();
        users.truncate(limit);
        Ok(users)
    }

    /// Expand the campaign into queued notification records, one per
    /// target user. Creation happens before any delivery attempt.
    pub async fn dispatch(&self, campaign_id: Uuid) -> Result<Vec<CampaignNotification>> {
        let campaign = self.get_campaign_row(campaign_id).await?;
        if !campaign.is_active {
            return Err(AppError::bad_request("Campaign is inactive"));
        }

        let users = self.target_users(campaign_id).await?;
        if users.is_empty() {
            return Ok(vec![]);
        }

        let mut notifications = Vec::with_capacity(users.len());
        for user_id in users {
            let notification = sqlx::query_as::<_, CampaignNotification>(
                r#"
                INSERT INTO campaign_notifications
                    (id, user_id, campaign_id, message, status, meta, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, '{}', $6, $6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(campaign_id)
            .bind(&campaign.message)
            .bind(NotificationStatus::QUEUED)
            .bind(Utc::now())
            .fetch_one(&self.db)
            .await?;

            notifications.push(notification);
        }

        tracing::info!(
            campaign_id = %campaign_id,
            count = notifications.len(),
            "Campaign dispatched"
        );

        Ok(notifications)
    }

    /// Push the campaign to its audience through the sender service. When
    /// the sender is unreachable the queued records stay in place and the
    /// response carries a warning.
    pub async fn send_notifications(
        &self,
        campaign_id: Uuid,
        channel: ChannelType,
    ) -> Result<Value> {
        let campaign = self.get_campaign_row(campaign_id).await?;
        if !campaign.is_active {
            return Err(AppError::bad_request("Campaign is inactive"));
        }

        let users = self.target_users(campaign_id).await?;
        if users.is_empty() {
            return Ok(json!({
                "message": "No users to notify",
                "sent_count": 0,
            }));
        }

        let requests: Vec<NotificationSendRequest> = users
            .iter()
            .map(|user_id| NotificationSendRequest {
                user_id: *user_id,
                message: campaign.message.clone(),
                title: campaign.name.clone(),
                channel,
                data: Some(json!({
                    "campaign_id": campaign_id,
                    "campaign_name": campaign.name,
                })),
            })
            .collect();

        match self.sender.send_batch(requests).await {
            Ok(result) => Ok(json!({
                "message": "Notifications handed to the sender",
                "campaign_id": campaign_id,
                "total_users": users.len(),
                "sender_response": result,
            })),
            Err(e) => {
                tracing::warn!(error = %e, "Notification sender not available, notifications queued only");
                Ok(json!({
                    "message": "Notification sender unavailable, notifications remain queued",
                    "campaign_id": campaign_id,
                    "total_users": users.len(),
                    "warning": "Notification records exist in the database but were not delivered",
                }))
            }
        }
    }

    pub async fn list_notifications(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<CampaignNotification>> {
        let notifications = if let Some(status) = status {
            sqlx::query_as::<_, CampaignNotification>(
                "SELECT * FROM campaign_notifications WHERE status = $1 ORDER BY created_at DESC",
            )
            .bind(status)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query_as::<_, CampaignNotification>(
                "SELECT * FROM campaign_notifications ORDER BY created_at DESC",
            )
            .fetch_all(&self.db)
            .await?
        };

        Ok(notifications)
    }

    pub async fn mark_notification_sent(
        &self,
        notification_id: Uuid,
        delivery_info: Option<Value>,
    ) -> Result<CampaignNotification> {
        let notification = sqlx::query_as::<_, CampaignNotification>(
            "SELECT * FROM campaign_notifications WHERE id = $1",
        )
        .bind(notification_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("notification"))?;

        let mut meta = notification.meta.clone();
        if let (Some(meta_map), Some(Value::Object(info))) = (meta.as_object_mut(), delivery_info) {
            for (key, value) in info {
                meta_map.insert(key, value);
            }
        }

        let updated = sqlx::query_as::<_, CampaignNotification>(
            r#"
            UPDATE campaign_notifications
            SET status = $2, meta = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .bind(NotificationStatus::SENT)
        .bind(&meta)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(updated)
    }
}
