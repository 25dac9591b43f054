//! Segment filters and the filter-spec compiler
//!
//! A segment's `filters` map stays schema-less at the edge and is
//! normalized into `SegmentFilters` before compilation. Unknown keys are
//! ignored; store-based filters are ignored by design.

use super::preferences::{strip_markdown_fences, PreferenceService};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use shared::{AppError, Result, Segment, TextGenClient};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

const SEGMENT_PROMPT_SYSTEM: &str = "Eres un generador de preferencias estandarizadas. Convierte descripciones \
a preferencias usando SIEMPRE estas claves exactas: diet, store_preference, \
language, organic, budget_level, product_category. \
Valores posibles: diet (vegetariano, vegano, omnivoro), \
store_preference (mercadona, carrefour, lidl, dia), \
language (catalan, spanish, english), \
organic (true, false), \
budget_level (low, medium, high), \
product_category (fruits, vegetables, dairy, meat, bread, beverages, snacks, organic, gourmet, baby). \
Responde solo JSON.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentFilters {
    pub last_days: Option<i64>,
    pub min_total_spent: Option<f64>,
    pub min_num_purchases: Option<i64>,
    pub preferences_contains: Option<Map<String, Value>>,
}

impl SegmentFilters {
    /// Normalize a raw filter map. Unrecognized keys (including store
    /// filters) are dropped.
    pub fn from_value(filters: &Value) -> Self {
        let Some(map) = filters.as_object() else {
            return Self::default();
        };

        Self {
            last_days: map.get("last_days").and_then(|v| v.as_i64()).filter(|d| *d > 0),
            min_total_spent: map.get("min_total_spent").and_then(|v| v.as_f64()),
            min_num_purchases: map.get("min_num_purchases").and_then(|v| v.as_i64()),
            preferences_contains: map
                .get("preferences_contains")
                .and_then(|v| v.as_object())
                .filter(|m| !m.is_empty())
                .cloned(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(days) = self.last_days {
            map.insert("last_days".to_string(), days.into());
        }
        if let Some(spent) = self.min_total_spent {
            map.insert("min_total_spent".to_string(), spent.into());
        }
        if let Some(count) = self.min_num_purchases {
            map.insert("min_num_purchases".to_string(), count.into());
        }
        if let Some(prefs) = &self.preferences_contains {
            map.insert(
                "preferences_contains".to_string(),
                Value::Object(prefs.clone()),
            );
        }
        Value::Object(map)
    }

    fn has_aggregate_clauses(&self) -> bool {
        self.last_days.is_some()
            || self.min_total_spent.is_some()
            || self.min_num_purchases.is_some()
    }
}

/// Superset check: the user matches when every required key is present
/// with an equal value.
pub fn preferences_match(user_preferences: &Map<String, Value>, required: &Map<String, Value>) -> bool {
    required
        .iter()
        .all(|(key, value)| user_preferences.get(key) == Some(value))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSegmentRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Value,
    /// Free-text description the LLM standardizes into
    /// `preferences_contains`; ignored when it fails.
    pub prompt: Option<String>,
}

#[derive(Clone)]
pub struct SegmentService {
    db: PgPool,
    textgen: TextGenClient,
    preferences: PreferenceService,
}

impl SegmentService {
    pub fn new(db: PgPool, textgen: TextGenClient, preferences: PreferenceService) -> Self {
        Self {
            db,
            textgen,
            preferences,
        }
    }

    pub async fn create(&self, request: CreateSegmentRequest) -> Result<Segment> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("Segment name is required"));
        }

        let mut filters = SegmentFilters::from_value(&request.filters);

        if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            match self
                .textgen
                .generate(
                    &format!(
                        "Convierte a JSON estandarizado usando las claves exactas: {}. \
                         Usa solo las claves y valores especificados arriba.",
                        prompt
                    ),
                    Some(SEGMENT_PROMPT_SYSTEM),
                    0.2,
                    120,
                )
                .await
            {
                Ok(response) => {
                    let cleaned = strip_markdown_fences(&response);
                    if let Ok(Value::Object(prefs)) = serde_json::from_str::<Value>(&cleaned) {
                        if !prefs.is_empty() {
                            filters.preferences_contains = Some(prefs);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "LLM unavailable for segment prompt, keeping base filters");
                }
            }
        }

        let segment = sqlx::query_as::<_, Segment>(
            r#"
            INSERT INTO segments (id, name, description, filters, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(filters.to_value())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(segment_id = %segment.id, name = %segment.name, "Segment created");
        Ok(segment)
    }

    pub async fn list(&self) -> Result<Vec<Segment>> {
        let segments =
            sqlx::query_as::<_, Segment>("SELECT * FROM segments ORDER BY created_at DESC")
                .fetch_all(&self.db)
                .await?;

        Ok(segments)
    }

    pub async fn get(&self, segment_id: Uuid) -> Result<Segment> {
        sqlx::query_as::<_, Segment>("SELECT * FROM segments WHERE id = $1")
            .bind(segment_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("segment"))
    }

    /// Compile a filter spec into the set of matching user ids.
    ///
    /// Aggregate clauses (window, spend, count) intersect into a base set;
    /// a preference clause then filters the candidates, lazily inferring
    /// preferences for users that have none. Inference failures skip the
    /// user and the compilation continues.
    pub async fn compile(&self, filters: &SegmentFilters) -> Result<HashSet<Uuid>> {
        let base: HashSet<Uuid> = if filters.has_aggregate_clauses() {
            self.compile_aggregate_clauses(filters).await?
        } else {
            // No aggregate clauses: the candidate universe is every user
            // with any purchase history.
            let rows: Vec<(Uuid,)> =
                sqlx::query_as("SELECT DISTINCT user_id FROM purchase_history")
                    .fetch_all(&self.db)
                    .await?;
            rows.into_iter().map(|(id,)| id).collect()
        };

        let Some(required) = &filters.preferences_contains else {
            return Ok(base);
        };

        let mut matched = HashSet::new();
        for user_id in base {
            match self.preferences.get_with_inference(user_id).await {
                Ok(preferences) => {
                    if preferences_match(&preferences, required) {
                        matched.insert(user_id);
                    }
                }
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Error checking user preferences");
                    continue;
                }
            }
        }

        Ok(matched)
    }

    async fn compile_aggregate_clauses(&self, filters: &SegmentFilters) -> Result<HashSet<Uuid>> {
        let threshold = filters.last_days.map(|days| Utc::now() - Duration::days(days));

        let mut running: Option<HashSet<Uuid>> = None;

        let intersect = |set: HashSet<Uuid>, running: &mut Option<HashSet<Uuid>>| {
            *running = Some(match running.take() {
                Some(current) => current.intersection(&set).copied().collect(),
                None => set,
            });
        };

        if threshold.is_some() {
            let rows: Vec<(Uuid,)> = sqlx::query_as(
                "SELECT DISTINCT user_id FROM purchase_history WHERE purchase_date >= $1",
            )
            .bind(threshold)
            .fetch_all(&self.db)
            .await?;
            intersect(rows.into_iter().map(|(id,)| id).collect(), &mut running);
        }

        if let Some(min_total) = filters.min_total_spent {
            let rows: Vec<(Uuid,)> = if let Some(threshold) = threshold {
                sqlx::query_as(
                    r#"
                    SELECT user_id FROM purchase_history
                    WHERE purchase_date >= $1
                    GROUP BY user_id
                    HAVING SUM(total_amount) >= $2
                    "#,
                )
                .bind(threshold)
                .bind(min_total)
                .fetch_all(&self.db)
                .await?
            } else {
                sqlx::query_as(
                    r#"
                    SELECT user_id FROM purchase_history
                    GROUP BY user_id
                    HAVING SUM(total_amount) >= $1
                    "#,
                )
                .bind(min_total)
                .fetch_all(&self.db)
                .await?
            };
            intersect(rows.into_iter().map(|(id,)| id).collect(), &mut running);
        }

        if let Some(min_count) = filters.min_num_purchases {
            let rows: Vec<(Uuid,)> = if let Some(threshold) = threshold {
                sqlx::query_as(
                    r#"
                    SELECT user_id FROM purchase_history
                    WHERE purchase_date >= $1
                    GROUP BY user_id
                    HAVING COUNT(id) >= $2
                    "#,
                )
                .bind(threshold)
                .bind(min_count)
                .fetch_all(&self.db)
                .await?
            } else {
                sqlx::query_as(
                    r#"
                    SELECT user_id FROM purchase_history
                    GROUP BY user_id
                    HAVING COUNT(id) >= $1
                    "#,
                )
                .bind(min_count)
                .fetch_all(&self.db)
                .await?
            };
            intersect(rows.into_iter().map(|(id,)| id).collect(), &mut running);
        }

        Ok(running.unwrap_or_default())
    }

    pub async fn preview_users(&self, segment_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let segment = self.get(segment_id).await?;
        let filters = SegmentFilters::from_value(&segment.filters);

        let mut users: Vec<Uuid> = self.compile(&filters).await?.into_iter().collect();
        users.sort();
        users.truncate(limit);
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_and_store_keys_are_ignored() {
        let filters = SegmentFilters::from_value(&json!({
            "last_days": 30,
            "min_total_spent": 100.5,
            "stores_in": ["Mercadona"],
            "is_market_store": true,
            "nonsense": 1
        }));

        assert_eq!(filters.last_days, Some(30));
        assert_eq!(filters.min_total_spent, Some(100.5));
        assert_eq!(filters.min_num_purchases, None);
        assert_eq!(filters.preferences_contains, None);

        let round_trip = filters.to_value();
        assert!(round_trip.get("stores_in").is_none());
        assert!(round_trip.get("nonsense").is_none());
    }

    #[test]
    fn non_object_filters_normalize_to_default() {
        assert_eq!(SegmentFilters::from_value(&json!([1, 2])), SegmentFilters::default());
        assert_eq!(SegmentFilters::from_value(&Value::Null), SegmentFilters::default());
    }

    #[test]
    fn empty_preferences_clause_is_dropped() {
        let filters = SegmentFilters::from_value(&json!({"preferences_contains": {}}));
        assert_eq!(filters.preferences_contains, None);
    }

    #[test]
    fn preference_matching_requires_superset_equality() {
        let user = json!({"diet": "vegetariano", "organic": true, "budget_level": "medium"});
        let user = user.as_object().unwrap();

        let required = json!({"diet": "vegetariano"});
        assert!(preferences_match(user, required.as_object().unwrap()));

        let required = json!({"diet": "vegetariano", "organic": true});
        assert!(preferences_match(user, required.as_object().unwrap()));

        let required = json!({"diet": "omnivoro"});
        assert!(!preferences_match(user, required.as_object().unwrap()));

        let required = json!({"wine_preference": "red"});
        assert!(!preferences_match(user, required.as_object().unwrap()));
    }

    #[test]
    fn non_positive_windows_are_dropped() {
        let filters = SegmentFilters::from_value(&json!({"last_days": 0}));
        assert_eq!(filters.last_days, None);

        let filters = SegmentFilters::from_value(&json!({"last_days": -5}));
        assert_eq!(filters.last_days, None);
    }
}
