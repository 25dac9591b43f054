//! Database models and DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Platform user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub preferences: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Curated market store
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MarketStore {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Uploaded or digital ticket
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub status: String,
    pub metadata: Value,
    pub processing_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ticket lifecycle states. Exactly one terminal state per ticket.
pub struct TicketStatus;

impl TicketStatus {
    pub const PENDING: &'static str = "pending";
    pub const DONE_APPROVED: &'static str = "done_approved";
    pub const DONE_REJECTED: &'static str = "done_rejected";
    pub const DUPLICATE: &'static str = "duplicate";
    pub const FAILED: &'static str = "failed";

    pub const TERMINAL: [&'static str; 4] = [
        Self::DONE_APPROVED,
        Self::DONE_REJECTED,
        Self::DUPLICATE,
        Self::FAILED,
    ];
}

/// Append-only purchase record, at most one per ticket
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub store_name: String,
    pub total_amount: f64,
    pub products: Value,
    pub num_products: i32,
    pub ticket_type: Option<String>,
    pub is_market_store: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user gamification profile
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GamificationProfile {
    pub user_id: Uuid,
    pub level: i32,
    pub experience: i32,
    pub total_tickets: i32,
    pub valid_tickets: i32,
    pub total_spent: f64,
    pub streak_days: i32,
    pub last_scan_date: Option<DateTime<Utc>>,
    pub badges_earned: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBadge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_type: String,
    pub badge_name: String,
    pub badge_description: String,
    pub earned_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Append-only experience log entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExperienceEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub experience_gained: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub points_cost: i32,
    pub reward_type: String,
    pub reward_value: Option<String>,
    pub is_active: bool,
    pub max_redemptions: Option<i32>,
    pub current_redemptions: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardRedemption {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_id: Uuid,
    pub points_spent: i32,
    pub redemption_code: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SpecialReward {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub reward_type: String,
    pub reward_value: Option<String>,
    pub is_global: bool,
    pub target_users: Value,
    pub target_segments: Value,
    pub max_redemptions: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Two-phase row: distributed (`is_used=false`) then claimed (`is_used=true`)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SpecialRewardRedemption {
    pub id: Uuid,
    pub user_id: Uuid,
    pub special_reward_id: Uuid,
    pub redemption_code: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// In-app notification shown inside the user's feed
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub filters: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub message: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outbound notification record managed by the dispatcher and the sender
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CampaignNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub message: String,
    pub status: String,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NotificationStatus;

impl NotificationStatus {
    pub const QUEUED: &'static str = "queued";
    pub const SENT: &'static str = "sent";
    pub const FAILED: &'static str = "failed";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: String,
    pub subscription_data: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTOs for API requests/responses

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub preferences: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            preferences: user.preferences,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub status: String,
    pub metadata: Value,
    pub processing_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Ticket> for TicketResponse {
    fn from(t: Ticket) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            original_filename: t.original_filename,
            file_size: t.file_size,
            mime_type: t.mime_type,
            status: t.status,
            metadata: t.metadata,
            processing_result: t.processing_result,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

/// Pending ticket as handed to processing workers, image included
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_filename: String,
    pub image_base64: String,
    pub created_at: DateTime<Utc>,
}

/// Redemption joined with its reward for user-facing listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RedemptionWithReward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_id: Uuid,
    pub points_spent: i32,
    pub redemption_code: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reward_name: String,
    pub reward_description: Option<String>,
    pub reward_type: String,
    pub reward_value: Option<String>,
}
