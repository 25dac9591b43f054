//! Levels, experience, streaks and badges

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use shared::{
    AppError, ExperienceEntry, GamificationProfile, Result, TicketProcessedEvent, UserBadge,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Experience thresholds per level. Past the table, every extra level
/// costs another 100 XP.
pub const LEVEL_EXPERIENCE: [(i32, i32); 10] = [
    (1, 0),
    (2, 100),
    (3, 250),
    (4, 450),
    (5, 700),
    (6, 1000),
    (7, 1350),
    (8, 1750),
    (9, 2200),
    (10, 2700),
];

pub const VALID_TICKET_XP: i32 = 50;
const BONUS_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LevelInfo {
    pub level: i32,
    pub next_level_experience: i32,
    pub experience_to_next_level: i32,
    pub progress_percentage: f64,
}

/// `level(xp)` is the highest level whose threshold is <= xp.
pub fn calculate_level(experience: i32) -> LevelInfo {
    let mut level = 1;
    let mut next_level_experience = 100;

    for (candidate, required) in LEVEL_EXPERIENCE {
        if experience >= required {
            level = candidate;
            next_level_experience = LEVEL_EXPERIENCE
                .iter()
                .find(|(l, _)| *l == candidate + 1)
                .map(|(_, req)| *req)
                .unwrap_or(required + 100);
        }
    }

    let progress_percentage = if next_level_experience > 0 {
        (f64::from(experience) / f64::from(next_level_experience) * 100.0).min(100.0)
    } else {
        100.0
    };

    LevelInfo {
        level,
        next_level_experience,
        experience_to_next_level: next_level_experience - experience,
        progress_percentage,
    }
}

/// Streak law over calendar days (UTC): same day keeps the streak,
/// the next day extends it, anything else resets to one.
pub fn streak_transition(last_scan: Option<NaiveDate>, today: NaiveDate, streak: i32) -> i32 {
    match last_scan {
        None => 1,
        Some(last) if last == today => streak,
        Some(last) if last.succ_opt() == Some(today) => streak + 1,
        Some(_) => 1,
    }
}

/// XP awarded for a processed ticket plus the human-readable reason.
/// Invalid tickets earn nothing.
pub fn xp_for_ticket(
    is_valid: bool,
    total_amount: Option<f64>,
    store_name: Option<&str>,
) -> (i32, String) {
    if !is_valid {
        return (0, "Ticket invàlid escanejat (sense punts)".to_string());
    }

    let mut xp = VALID_TICKET_XP;
    let mut reason = format!(
        "Ticket vàlid escanejat: {}",
        store_name.unwrap_or("Tenda desconeguda")
    );

    if let Some(total) = total_amount {
        if total > BONUS_THRESHOLD {
            let bonus = (total / 10.0).floor() as i32;
            xp += bonus;
            reason.push_str(&format!(" + {} XP bonus per compra alta", bonus));
        }
    }

    (xp, reason)
}

#[derive(Debug, Clone, Copy)]
pub struct BadgeStats {
    pub total_tickets: i32,
    pub valid_tickets: i32,
    pub total_spent: f64,
    pub streak_days: i32,
    pub level: i32,
}

pub struct BadgeDef {
    pub badge_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub condition: fn(&BadgeStats) -> bool,
}

pub const BADGES: [BadgeDef; 9] = [
    BadgeDef {
        badge_type: "first_scan",
        name: "Primer Escaneig",
        description: "Has escanejat el teu primer tiquet",
        condition: |s| s.total_tickets >= 1,
    },
    BadgeDef {
        badge_type: "first_valid",
        name: "Primera Compra Vàlida",
        description: "Has escanejat el teu primer tiquet vàlid",
        condition: |s| s.valid_tickets >= 1,
    },
    BadgeDef {
        badge_type: "ticket_collector",
        name: "Col·leccionista de Tiquets",
        description: "Has escanejat 10 tiquets",
        condition: |s| s.total_tickets >= 10,
    },
    BadgeDef {
        badge_type: "valid_collector",
        name: "Col·leccionista Vàlid",
        description: "Has escanejat 10 tiquets vàlids",
        condition: |s| s.valid_tickets >= 10,
    },
    BadgeDef {
        badge_type: "big_spender",
        name: "Gran Comprador",
        description: "Has gastat més de 100€ en tiquets vàlids",
        condition: |s| s.total_spent >= 100.0,
    },
    BadgeDef {
        badge_type: "streak_3",
        name: "Ratxa de 3 Dies",
        description: "Has escanejat tiquets durant 3 dies consecutius",
        condition: |s| s.streak_days >= 3,
    },
    BadgeDef {
        badge_type: "streak_7",
        name: "Ratxa de 7 Dies",
        description: "Has escanejat tiquets durant 7 dies consecutius",
        condition: |s| s.streak_days >= 7,
    },
    BadgeDef {
        badge_type: "level_5",
        name: "Nivell 5",
        description: "Has arribat al nivell 5",
        condition: |s| s.level >= 5,
    },
    BadgeDef {
        badge_type: "level_10",
        name: "Nivell 10",
        description: "Has arribat al nivell 10",
        condition: |s| s.level >= 10,
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub level: i32,
    pub experience: i32,
    pub next_level_experience: i32,
    pub experience_to_next_level: i32,
    pub progress_percentage: f64,
    pub total_tickets: i32,
    pub valid_tickets: i32,
    pub total_spent: f64,
    pub streak_days: i32,
    pub badges_earned: i32,
    pub recent_badges: Vec<UserBadge>,
}

#[derive(Clone)]
pub struct GamificationEngine {
    db: PgPool,
}

impl GamificationEngine {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_or_create_profile(&self, user_id: Uuid) -> Result<GamificationProfile> {
        let existing = sqlx::query_as::<_, GamificationProfile>(
            "SELECT * FROM user_gamification WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(profile) = existing {
            return Ok(profile);
        }

        // Concurrent first scans may race here; the conflict clause keeps
        // the insert idempotent.
        let profile = sqlx::query_as::<_, GamificationProfile>(
            r#"
            INSERT INTO user_gamification (user_id, created_at, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = user_gamification.updated_at
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(user_id = %user_id, "Gamification profile created");
        Ok(profile)
    }

    /// Apply one processed-ticket event: counters, streak, XP, level and
    /// badges, all inside one transaction. The caller serializes per user.
    pub async fn process_ticket_event(
        &self,
        event: &TicketProcessedEvent,
    ) -> Result<(GamificationProfile, Vec<UserBadge>)> {
        self.get_or_create_profile(event.user_id).await?;

        let mut tx = self.db.begin().await?;

        let mut profile = sqlx::query_as::<_, GamificationProfile>(
            "SELECT * FROM user_gamification WHERE user_id = $1 FOR UPDATE",
        )
        .bind(event.user_id)
        .fetch_one(&mut *tx)
        .await?;

        profile.total_tickets += 1;
        if event.is_valid {
            profile.valid_tickets += 1;
            profile.total_spent += event.total_amount.unwrap_or(0.0);
        }

        let today = event.processing_date.date_naive();
        profile.streak_days = streak_transition(
            profile.last_scan_date.map(|d| d.date_naive()),
            today,
            profile.streak_days,
        );
        profile.last_scan_date = Some(event.processing_date);

        let (experience_gained, reason) = xp_for_ticket(
            event.is_valid,
            event.total_amount,
            event.store_name.as_deref(),
        );

        if experience_gained > 0 {
            profile.experience += experience_gained;

            sqlx::query(
                r#"
                INSERT INTO experience_log (id, user_id, ticket_id, experience_gained, reason, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(event.user_id)
            .bind(event.ticket_id)
            .bind(experience_gained)
            .bind(&reason)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        profile.level = calculate_level(profile.experience).level;

        let new_badges = self.award_badges_tx(&mut tx, &profile).await?;
        profile.badges_earned += new_badges.len() as i32;

        sqlx::query(
            r#"
            UPDATE user_gamification
            SET level = $2, experience = $3, total_tickets = $4, valid_tickets = $5,
                total_spent = $6, streak_days = $7, last_scan_date = $8,
                badges_earned = $9, updated_at = $10
            WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.level)
        .bind(profile.experience)
        .bind(profile.total_tickets)
        .bind(profile.valid_tickets)
        .bind(profile.total_spent)
        .bind(profile.streak_days)
        .bind(profile.last_scan_date)
        .bind(profile.badges_earned)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %event.user_id,
            ticket_id = %event.ticket_id,
            is_valid = event.is_valid,
            experience_gained,
            new_badges = new_badges.len(),
            "Ticket event processed"
        );

        Ok((profile, new_badges))
    }

    async fn award_badges_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        profile: &GamificationProfile,
    ) -> Result<Vec<UserBadge>> {
        let stats = BadgeStats {
            total_tickets: profile.total_tickets,
            valid_tickets: profile.valid_tickets,
            total_spent: profile.total_spent,
            streak_days: profile.streak_days,
            level: profile.level,
        };

        let mut new_badges = Vec::new();

        for badge in &BADGES {
            if !(badge.condition)(&stats) {
                continue;
            }

            let existing: Option<(Uuid,)> = sqlx::query_as(
                r#"
                SELECT id FROM user_badges
                WHERE user_id = $1 AND badge_type = $2 AND is_active = TRUE
                "#,
            )
            .bind(profile.user_id)
            .bind(badge.badge_type)
            .fetch_optional(&mut **tx)
            .await?;

            if existing.is_some() {
                continue;
            }

            let awarded = sqlx::query_as::<_, UserBadge>(
                r#"
                INSERT INTO user_badges (id, user_id, badge_type, badge_name, badge_description, earned_at, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, TRUE)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(profile.user_id)
            .bind(badge.badge_type)
            .bind(badge.name)
            .bind(badge.description)
            .bind(Utc::now())
            .fetch_one(&mut **tx)
            .await?;

            tracing::info!(
                user_id = %profile.user_id,
                badge_type = badge.badge_type,
                "Badge awarded"
            );
            new_badges.push(awarded);
        }

        Ok(new_badges)
    }

    /// Manual XP grant (admin tooling); keeps the level invariant and the
    /// append-only log.
    pub async fn add_experience(
        &self,
        user_id: Uuid,
        experience_gained: i32,
        reason: &str,
        ticket_id: Option<Uuid>,
    ) -> Result<GamificationProfile> {
        self.get_or_create_profile(user_id).await?;

        let mut tx = self.db.begin().await?;

        let mut profile = sqlx::query_as::<_, GamificationProfile>(
            "SELECT * FROM user_gamification WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        profile.experience += experience_gained;
        profile.level = calculate_level(profile.experience).level;

        sqlx::query(
            r#"
            INSERT INTO experience_log (id, user_id, ticket_id, experience_gained, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(ticket_id)
        .bind(experience_gained)
        .bind(reason)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE user_gamification SET experience = $2, level = $3, updated_at = $4 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(profile.experience)
        .bind(profile.level)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(profile)
    }

    /// Spend XP during a reward redemption. Runs inside the caller's
    /// transaction so capacity and balance move together.
    pub async fn spend_experience_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        points: i32,
    ) -> Result<i32> {
        let profile: Option<(i32,)> = sqlx::query_as(
            "SELECT experience FROM user_gamification WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        let experience = profile
            .map(|(e,)| e)
            .ok_or_else(|| AppError::not_found("gamification profile"))?;

        if experience < points {
            return Err(AppError::bad_request(format!(
                "Not enough points: need {}, have {}",
                points, experience
            )));
        }

        let remaining = experience - points;
        let level = calculate_level(remaining).level;

        sqlx::query(
            "UPDATE user_gamification SET experience = $2, level = $3, updated_at = $4 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(remaining)
        .bind(level)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(remaining)
    }

    pub async fn get_user_stats(&self, user_id: Uuid) -> Result<UserStats> {
        let profile = self.get_or_create_profile(user_id).await?;
        let info = calculate_level(profile.experience);

        let recent_badges = sqlx::query_as::<_, UserBadge>(
            r#"
            SELECT * FROM user_badges
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY earned_at DESC
            LIMIT 5
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(UserStats {
            level: info.level,
            experience: profile.experience,
            next_level_experience: info.next_level_experience,
            experience_to_next_level: info.experience_to_next_level,
            progress_percentage: info.progress_percentage,
            total_tickets: profile.total_tickets,
            valid_tickets: profile.valid_tickets,
            total_spent: profile.total_spent,
            streak_days: profile.streak_days,
            badges_earned: profile.badges_earned,
            recent_badges,
        })
    }

    pub async fn get_badges(&self, user_id: Uuid) -> Result<Vec<UserBadge>> {
        let badges = sqlx::query_as::<_, UserBadge>(
            r#"
            SELECT * FROM user_badges
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY earned_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(badges)
    }

    pub async fn get_experience_log(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExperienceEntry>> {
        let entries = sqlx::query_as::<_, ExperienceEntry>(
            r#"
            SELECT * FROM experience_log
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Zero the profile and wipe badges and the XP log.
    pub async fn reset(&self, user_id: Uuid) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE user_gamification
            SET level = 1, experience = 0, total_tickets = 0, valid_tickets = 0,
                total_spent = 0, streak_days = 0, last_scan_date = NULL,
                badges_earned = 0, updated_at = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("gamification profile"));
        }

        sqlx::query("DELETE FROM user_badges WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM experience_log WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Gamification profile reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn level_table_boundaries() {
        assert_eq!(calculate_level(0).level, 1);
        assert_eq!(calculate_level(99).level, 1);
        assert_eq!(calculate_level(100).level, 2);
        assert_eq!(calculate_level(249).level, 2);
        assert_eq!(calculate_level(250).level, 3);
        assert_eq!(calculate_level(2699).level, 9);
        assert_eq!(calculate_level(2700).level, 10);
        assert_eq!(calculate_level(10_000).level, 10);
    }

    #[test]
    fn next_threshold_past_the_table() {
        let info = calculate_level(2700);
        assert_eq!(info.next_level_experience, 2800);
        assert_eq!(info.experience_to_next_level, 100);
    }

    #[test]
    fn progress_caps_at_hundred() {
        let info = calculate_level(3000);
        assert_eq!(info.progress_percentage, 100.0);

        let info = calculate_level(50);
        assert_eq!(info.next_level_experience, 100);
        assert_eq!(info.progress_percentage, 50.0);
    }

    #[test]
    fn streak_rules() {
        let today = date(2025, 3, 15);

        // No prior scan
        assert_eq!(streak_transition(None, today, 0), 1);
        // Same day keeps the streak
        assert_eq!(streak_transition(Some(today), today, 4), 4);
        // Consecutive day extends
        assert_eq!(streak_transition(Some(date(2025, 3, 14)), today, 4), 5);
        // Two-day gap resets
        assert_eq!(streak_transition(Some(date(2025, 3, 13)), today, 4), 1);
        // Scan dated in the future relative to the last one also resets
        assert_eq!(streak_transition(Some(date(2025, 3, 20)), today, 4), 1);
    }

    #[test]
    fn streak_across_month_boundary() {
        assert_eq!(
            streak_transition(Some(date(2025, 3, 31)), date(2025, 4, 1), 2),
            3
        );
    }

    #[test]
    fn xp_for_valid_ticket_with_bonus() {
        let (xp, reason) = xp_for_ticket(true, Some(120.0), Some("Mercadona"));
        assert_eq!(xp, 50 + 12);
        assert!(reason.contains("Mercadona"));
        assert!(reason.contains("12 XP"));
    }

    #[test]
    fn xp_bonus_requires_strictly_more_than_fifty() {
        let (xp, _) = xp_for_ticket(true, Some(50.0), None);
        assert_eq!(xp, 50);

        let (xp, _) = xp_for_ticket(true, Some(50.01), None);
        assert_eq!(xp, 55);
    }

    #[test]
    fn invalid_tickets_earn_nothing() {
        let (xp, _) = xp_for_ticket(false, Some(500.0), Some("Mercadona"));
        assert_eq!(xp, 0);
    }

    #[test]
    fn badge_thresholds() {
        let base = BadgeStats {
            total_tickets: 1,
            valid_tickets: 1,
            total_spent: 10.0,
            streak_days: 1,
            level: 1,
        };

        let qualifying: Vec<&str> = BADGES
            .iter()
            .filter(|b| (b.condition)(&base))
            .map(|b| b.badge_type)
            .collect();
        assert_eq!(qualifying, vec!["first_scan", "first_valid"]);

        let veteran = BadgeStats {
            total_tickets: 10,
            valid_tickets: 10,
            total_spent: 150.0,
            streak_days: 7,
            level: 5,
        };
        let qualifying: Vec<&str> = BADGES
            .iter()
            .filter(|b| (b.condition)(&veteran))
            .map(|b| b.badge_type)
            .collect();
        assert!(qualifying.contains(&"ticket_collector"));
        assert!(qualifying.contains(&"valid_collector"));
        assert!(qualifying.contains(&"big_spender"));
        assert!(qualifying.contains(&"streak_3"));
        assert!(qualifying.contains(&"streak_7"));
        assert!(qualifying.contains(&"level_5"));
        assert!(!qualifying.contains(&"level_10"));
    }
}
