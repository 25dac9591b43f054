//! Curated market-store registry

use chrono::Utc;
use serde::Deserialize;
use shared::{AppError, MarketStore, Result};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStoreRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Membership test used by the processing pipeline: a candidate merchant
/// belongs to the market iff any active store name is a case-insensitive
/// substring of it ("Mercadona 123" matches "Mercadona").
pub fn is_market_store_name(candidate: &str, active_store_names: &[String]) -> bool {
    if candidate.trim().is_empty() {
        return false;
    }

    let candidate = candidate.to_lowercase();
    active_store_names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .any(|name| candidate.contains(&name.to_lowercase()))
}

#[derive(Clone)]
pub struct StoreService {
    db: PgPool,
}

impl StoreService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: CreateStoreRequest) -> Result<MarketStore> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("Store name is required"));
        }

        let store = sqlx::query_as::<_, MarketStore>(
            r#"
            INSERT INTO market_stores (id, name, description, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(store_id = %store.id, name = %store.name, "Market store created");
        Ok(store)
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<MarketStore>> {
        let stores = if include_inactive {
            sqlx::query_as::<_, MarketStore>("SELECT * FROM market_stores ORDER BY name")
                .fetch_all(&self.db)
                .await?
        } else {
            sqlx::query_as::<_, MarketStore>(
                "SELECT * FROM market_stores WHERE is_active = TRUE ORDER BY name",
            )
            .fetch_all(&self.db)
            .await?
        };

        Ok(stores)
    }

    pub async fn get(&self, store_id: Uuid) -> Result<MarketStore> {
        sqlx::query_as::<_, MarketStore>("SELECT * FROM market_stores WHERE id = $1")
            .bind(store_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("market store"))
    }

    pub async fn update(&self, store_id: Uuid, request: UpdateStoreRequest) -> Result<MarketStore> {
        let current = self.get(store_id).await?;

        let store = sqlx::query_as::<_, MarketStore>(
            r#"
            UPDATE market_stores
            SET name = $2, description = $3, is_active = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(store_id)
        .bind(request.name.unwrap_or(current.name))
        .bind(request.description.or(current.description))
        .bind(request.is_active.unwrap_or(current.is_active))
        .fetch_one(&self.db)
        .await?;

        Ok(store)
    }

    /// Soft delete: the store stays addressable but stops matching tickets.
    pub async fn deactivate(&self, store_id: Uuid) -> Result<MarketStore> {
        let store = sqlx::query_as::<_, MarketStore>(
            "UPDATE market_stores SET is_active = FALSE WHERE id = $1 RETURNING *",
        )
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("market store"))?;

        tracing::info!(store_id = %store_id, "Market store deactivated");
        Ok(store)
    }

    pub async fn list_names(&self) -> Result<Vec<String>> {
        let names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM market_stores WHERE is_active = TRUE")
                .fetch_all(&self.db)
                .await?;

        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    pub async fn is_market_store(&self, candidate: &str) -> Result<bool> {
        let names = self.list_names().await?;
        Ok(is_market_store_name(candidate, &names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let stores = names(&["Mercadona", "Carrefour"]);
        assert!(is_market_store_name("MERCADONA 123", &stores));
        assert!(is_market_store_name("Supermercado carrefour exprés", &stores));
        assert!(!is_market_store_name("Unknown Shop", &stores));
    }

    #[test]
    fn empty_inputs_never_match() {
        assert!(!is_market_store_name("", &names(&["Mercadona"])));
        assert!(!is_market_store_name("  ", &names(&["Mercadona"])));
        assert!(!is_market_store_name("Mercadona", &[]));
        // A blank store name must not match every candidate
        assert!(!is_market_store_name("Anything", &names(&[""])));
    }
}
