//! Preference inference from purchase history
//!
//! The LLM is best-effort: every failure path degrades to an empty map so
//! segmentation keeps working without it.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use shared::{Result, TextGenClient};
use sqlx::PgPool;
use uuid::Uuid;

const HISTORY_SAMPLE: i64 = 20;

pub const PREFERENCE_SYSTEM_PROMPT: &str = "Eres un analista de comportamiento de compra. Analiza el historial de compras \
y extrae preferencias del usuario en formato JSON simple. Responde solo JSON válido \
con 2-4 preferencias clave. Ejemplos de preferencias: diet (vegetariano, vegano, etc.), \
organic (true/false), wine_preference (red, white, etc.), language (catalan, spanish, etc.), \
budget_level (low, medium, high), store_preference (mercadona, carrefour, etc.).";

/// Strip optional markdown fences (```json ... ```) around a model answer.
pub fn strip_markdown_fences(text: &str) -> String {
    let mut cleaned = text.trim();

    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }

    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }

    cleaned.trim().to_string()
}

/// Parse a model answer into a preference map; anything that is not a JSON
/// object collapses to an empty map.
pub fn parse_preference_response(text: &str) -> Map<String, Value> {
    let cleaned = strip_markdown_fences(text);

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[derive(Clone)]
pub struct PreferenceService {
    db: PgPool,
    textgen: TextGenClient,
}

impl PreferenceService {
    pub fn new(db: PgPool, textgen: TextGenClient) -> Self {
        Self { db, textgen }
    }

    /// Infer a preference map from the user's latest purchases. Empty
    /// history or any model failure returns an empty map.
    pub async fn infer_from_purchases(&self, user_id: Uuid) -> Result<Map<String, Value>> {
        let purchases: Vec<(String, f64, Value, chrono::DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT store_name, total_amount, products, purchase_date
            FROM purchase_history
            WHERE user_id = $1
            ORDER BY purchase_date DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(HISTORY_SAMPLE)
        .fetch_all(&self.db)
        .await?;

        if purchases.is_empty() {
            return Ok(Map::new());
        }

        let purchase_data: Vec<Value> = purchases
            .iter()
            .map(|(store, total, products, date)| {
                let products_text = products
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|p| p.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();

                json!({
                    "store": store,
                    "total": total,
                    "products": products_text,
                    "date": date.to_rfc3339(),
                })
            })
            .collect();

        let prompt = format!(
            "Analiza este historial de compras y extrae preferencias del usuario:\n\n{}\n\n\
             Responde solo con JSON válido de preferencias, ejemplo:\n\
             {{\"diet\": \"vegetariano\", \"organic\": true, \"budget_level\": \"medium\"}}",
            serde_json::to_string_pretty(&purchase_data)?
        );

        match self
            .textgen
            .generate(&prompt, Some(PREFERENCE_SYSTEM_PROMPT), 0.3, 200)
            .await
        {
            Ok(response) => Ok(parse_preference_response(&response)),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Error inferring user preferences");
                Ok(Map::new())
            }
        }
    }

    /// Infer and persist. Non-empty inference overwrites the stored map.
    pub async fn update_automatically(&self, user_id: Uuid) -> Result<Map<String, Value>> {
        let inferred = self.infer_from_purchases(user_id).await?;

        if !inferred.is_empty() {
            sqlx::query("UPDATE users SET preferences = $2, updated_at = $3 WHERE id = $1")
                .bind(user_id)
                .bind(Value::Object(inferred.clone()))
                .bind(Utc::now())
                .execute(&self.db)
                .await?;

            tracing::info!(user_id = %user_id, "User preferences updated automatically");
        }

        Ok(inferred)
    }

    /// Stored preferences, inferred in place iff the stored map is empty.
    pub async fn get_with_inference(&self, user_id: Uuid) -> Result<Map<String, Value>> {
        let stored: Option<(Value,)> =
            sqlx::query_as("SELECT preferences FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        let Some((preferences,)) = stored else {
            return Ok(Map::new());
        };

        match preferences.as_object() {
            Some(map) if !map.is_empty() => Ok(map.clone()),
            _ => self.update_automatically(user_id).await,
        }
    }

    /// Sweep every user that has purchase history.
    pub async fn infer_all(&self) -> Result<Vec<Value>> {
        let user_ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT DISTINCT user_id FROM purchase_history")
                .fetch_all(&self.db)
                .await?;

        let mut results = Vec::with_capacity(user_ids.len());
        for (user_id,) in user_ids {
            match self.update_automatically(user_id).await {
                Ok(preferences) => results.push(json!({
                    "user_id": user_id,
                    "preferences": preferences,
                    "status": "success",
                })),
                Err(e) => results.push(json!({
                    "user_id": user_id,
                    "preferences": {},
                    "status": "error",
                    "error": e.to_string(),
                })),
            }
        }

        Ok(results)
    }

    /// Sweep users with recent purchases, skipping anyone that already has
    /// stored preferences.
    pub async fn infer_new(&self, days_back: i64) -> Result<Vec<Value>> {
        let days_back = days_back.clamp(1, 365);
        let threshold = Utc::now() - Duration::days(days_back);

        let user_ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT user_id FROM purchase_history WHERE purchase_date >= $1",
        )
        .bind(threshold)
        .fetch_all(&self.db)
        .await?;

        let mut results = Vec::with_capacity(user_ids.len());
        for (user_id,) in user_ids {
            let stored: Option<(Value,)> =
                sqlx::query_as("SELECT preferences FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&self.db)
                    .await?;

            let has_preferences = stored
                .as_ref()
                .and_then(|(p,)| p.as_object())
                .map(|m| !m.is_empty())
                .unwrap_or(false);

            if has_preferences {
                results.push(json!({
                    "user_id": user_id,
                    "preferences": stored.map(|(p,)| p).unwrap_or(json!({})),
                    "status": "already_has_preferences",
                }));
                continue;
            }

            match self.update_automatically(user_id).await {
                Ok(preferences) => {
                    let status = if preferences.is_empty() {
                        "no_preferences_found"
                    } else {
                        "updated"
                    };
                    results.push(json!({
                        "user_id": user_id,
                        "preferences": preferences,
                        "status": status,
                    }));
                }
                Err(e) => results.push(json!({
                    "user_id": user_id,
                    "preferences": {},
                    "status": "error",
                    "error": e.to_string(),
                })),
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        let fenced = "```json\n{\"diet\": \"vegetariano\"}\n```";
        assert_eq!(strip_markdown_fences(fenced), "{\"diet\": \"vegetariano\"}");

        let bare_fence = "```\n{}\n```";
        assert_eq!(strip_markdown_fences(bare_fence), "{}");

        let plain = "{\"organic\": true}";
        assert_eq!(strip_markdown_fences(plain), plain);
    }

    #[test]
    fn parses_valid_objects() {
        let map = parse_preference_response("```json\n{\"diet\": \"vegano\", \"organic\": true}\n```");
        assert_eq!(map.get("diet"), Some(&Value::String("vegano".to_string())));
        assert_eq!(map.get("organic"), Some(&Value::Bool(true)));
    }

    #[test]
    fn non_objects_collapse_to_empty() {
        assert!(parse_preference_response("[1, 2, 3]").is_empty());
        assert!(parse_preference_response("no puc ajudar-te").is_empty());
        assert!(parse_preference_response("").is_empty());
        assert!(parse_preference_response("\"diet\"").is_empty());
    }
}
