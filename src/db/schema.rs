//! Idempotent schema bootstrap executed at service startup

use shared::Result;
use sqlx::PgPool;
use tracing::info;

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email VARCHAR(255) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        role VARCHAR(20) NOT NULL DEFAULT 'user',
        preferences JSONB NOT NULL DEFAULT '{}',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS market_stores (
        id UUID PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        description TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        filename VARCHAR(255) NOT NULL,
        original_filename VARCHAR(255) NOT NULL,
        file_path VARCHAR(500) NOT NULL,
        file_size BIGINT NOT NULL DEFAULT 0,
        mime_type VARCHAR(100) NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        metadata JSONB NOT NULL DEFAULT '{}',
        processing_result JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tickets_user_id ON tickets (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status_created ON tickets (status, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS purchase_history (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        ticket_id UUID NOT NULL UNIQUE,
        purchase_date TIMESTAMPTZ NOT NULL,
        store_name VARCHAR(255) NOT NULL,
        total_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        products JSONB NOT NULL DEFAULT '[]',
        num_products INTEGER NOT NULL DEFAULT 0,
        ticket_type VARCHAR(100),
        is_market_store BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_purchase_history_user_date ON purchase_history (user_id, purchase_date DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS user_gamification (
        user_id UUID PRIMARY KEY,
        level INTEGER NOT NULL DEFAULT 1,
        experience INTEGER NOT NULL DEFAULT 0,
        total_tickets INTEGER NOT NULL DEFAULT 0,
        valid_tickets INTEGER NOT NULL DEFAULT 0,
        total_spent DOUBLE PRECISION NOT NULL DEFAULT 0,
        streak_days INTEGER NOT NULL DEFAULT 0,
        last_scan_date TIMESTAMPTZ,
        badges_earned INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_badges (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        badge_type VARCHAR(50) NOT NULL,
        badge_name VARCHAR(150) NOT NULL,
        badge_description TEXT NOT NULL,
        earned_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_badges_user_type ON user_badges (user_id, badge_type)",
    r#"
    CREATE TABLE IF NOT EXISTS experience_log (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        ticket_id UUID,
        experience_gained INTEGER NOT NULL,
        reason TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_experience_log_user_created ON experience_log (user_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS rewards (
        id UUID PRIMARY KEY,
        name VARCHAR(150) NOT NULL,
        description TEXT,
        points_cost INTEGER NOT NULL CHECK (points_cost >= 0),
        reward_type VARCHAR(50) NOT NULL,
        reward_value VARCHAR(255),
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        max_redemptions INTEGER,
        current_redemptions INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reward_redemptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        reward_id UUID NOT NULL,
        points_spent INTEGER NOT NULL,
        redemption_code VARCHAR(20) NOT NULL UNIQUE,
        is_used BOOLEAN NOT NULL DEFAULT FALSE,
        used_at TIMESTAMPTZ,
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_reward_redemptions_user ON reward_redemptions (user_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS special_rewards (
        id UUID PRIMARY KEY,
        name VARCHAR(150) NOT NULL,
        description TEXT,
        reward_type VARCHAR(50) NOT NULL,
        reward_value VARCHAR(255),
        is_global BOOLEAN NOT NULL DEFAULT FALSE,
        target_users JSONB NOT NULL DEFAULT '[]',
        target_segments JSONB NOT NULL DEFAULT '[]',
        max_redemptions INTEGER,
        expires_at TIMESTAMPTZ,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS special_reward_redemptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        special_reward_id UUID NOT NULL,
        redemption_code VARCHAR(20) NOT NULL UNIQUE,
        is_used BOOLEAN NOT NULL DEFAULT FALSE,
        used_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_special_redemptions_user_reward ON special_reward_redemptions (user_id, special_reward_id)",
    r#"
    CREATE TABLE IF NOT EXISTS user_notifications (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        title VARCHAR(255) NOT NULL,
        message TEXT NOT NULL,
        notification_type VARCHAR(50) NOT NULL,
        related_id UUID,
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        read_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_notifications_user_created ON user_notifications (user_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS segments (
        id UUID PRIMARY KEY,
        name VARCHAR(150) NOT NULL,
        description TEXT,
        filters JSONB NOT NULL DEFAULT '{}',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS campaigns (
        id UUID PRIMARY KEY,
        name VARCHAR(150) NOT NULL,
        description TEXT,
        message TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS campaign_segments (
        id UUID PRIMARY KEY,
        campaign_id UUID NOT NULL,
        segment_id UUID NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_campaign_segments_campaign ON campaign_segments (campaign_id)",
    r#"
    CREATE TABLE IF NOT EXISTS campaign_notifications (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        campaign_id UUID,
        message TEXT NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'queued',
        meta JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_campaign_notifications_status ON campaign_notifications (status)",
    "CREATE INDEX IF NOT EXISTS idx_campaign_notifications_user ON campaign_notifications (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS user_subscriptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        channel VARCHAR(20) NOT NULL,
        subscription_data JSONB NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_subscriptions_user_channel ON user_subscriptions (user_id, channel)",
];

/// Create every table the services expect. Safe to run on every boot.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database schema verified ({} statements)", DDL.len());
    Ok(())
}
