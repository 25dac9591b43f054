//! Append-only purchase history with per-user aggregate queries

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{scalar_to_f64, scalar_to_text, AppError, PurchaseRecord, Result};
use sqlx::{error::DatabaseError as _, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePurchaseRequest {
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub store_name: String,
    pub total_amount: f64,
    #[serde(default)]
    pub products: Value,
    #[serde(default)]
    pub num_products: i32,
    pub ticket_type: Option<String>,
    #[serde(default)]
    pub is_market_store: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductAggregate {
    pub name: String,
    pub count: i64,
    pub total_spent: f64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseSummary {
    pub total_purchases: i64,
    pub total_spent: f64,
    pub favorite_store: Option<String>,
    pub most_purchased_products: Vec<ProductAggregate>,
    pub last_purchase_date: Option<DateTime<Utc>>,
    pub average_purchase_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingPeriodEntry {
    pub date: DateTime<Utc>,
    pub store: String,
    pub amount: f64,
    pub products_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendingPeriod {
    pub period_days: i64,
    pub total_spent: f64,
    pub num_purchases: i64,
    pub average_per_purchase: f64,
    pub purchases: Vec<SpendingPeriodEntry>,
}

/// Fold product line items (`{nombre, cantidad, precio}` objects) into
/// per-name aggregates ordered by purchase count.
pub fn aggregate_products(product_lists: &[Value], limit: usize) -> Vec<ProductAggregate> {
    let mut counts: HashMap<String, (i64, f64)> = HashMap::new();

    for products in product_lists {
        let Some(items) = products.as_array() else {
            continue;
        };
        for item in items {
            let name = item
                .get("nombre")
                .map(scalar_to_text)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Producto desconocido".to_string());
            let price = item.get("precio").and_then(scalar_to_f64).unwrap_or(0.0);

            let entry = counts.entry(name).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += price;
        }
    }

    let mut aggregates: Vec<ProductAggregate> = counts
        .into_iter()
        .map(|(name, (count, total_spent))| ProductAggregate {
            name,
            count,
            total_spent,
            avg_price: if count > 0 {
                total_spent / count as f64
            } else {
                0.0
            },
        })
        .collect();

    aggregates.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    aggregates.truncate(limit);
    aggregates
}

#[derive(Clone)]
pub struct HistoryService {
    db: PgPool,
}

impl HistoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append one purchase record. The unique index on `ticket_id` makes
    /// the write idempotent; a second write for the same ticket returns a
    /// Conflict the callers decide how to treat.
    pub async fn create_purchase_record(
        &self,
        request: CreatePurchaseRequest,
    ) -> Result<PurchaseRecord> {
        if request.total_amount < 0.0 {
            return Err(AppError::validation("total_amount must be >= 0"));
        }

        let result = sqlx::query_as::<_, PurchaseRecord>(
            r#"
            INSERT INTO purchase_history
                (id, user_id, ticket_id, purchase_date, store_name, total_amount,
                 products, num_products, ticket_type, is_market_store, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.ticket_id)
        .bind(request.purchase_date)
        .bind(&request.store_name)
        .bind(request.total_amount)
        .bind(&request.products)
        .bind(request.num_products)
        .bind(&request.ticket_type)
        .bind(request.is_market_store)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(record) => {
                tracing::info!(
                    user_id = %request.user_id,
                    ticket_id = %request.ticket_id,
                    store = %request.store_name,
                    total = request.total_amount,
                    "Purchase record created"
                );
                Ok(record)
            }
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => Err(
                AppError::conflict(format!("Purchase for ticket {} already recorded", request.ticket_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user_purchase_history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchaseRecord>> {
        let purchases = sqlx::query_as::<_, PurchaseRecord>(
            r#"
            SELECT * FROM purchase_history
            WHERE user_id = $1
            ORDER BY purchase_date DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(purchases)
    }

    pub async fn get_user_purchase_summary(&self, user_id: Uuid) -> Result<PurchaseSummary> {
        let stats: Option<(i64, Option<f64>, Option<f64>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                r#"
                SELECT COUNT(id), SUM(total_amount), AVG(total_amount), MAX(purchase_date)
                FROM purchase_history
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;

        let (total_purchases, total_spent, average, last_purchase) =
            stats.unwrap_or((0, None, None, None));

        if total_purchases == 0 {
            return Ok(PurchaseSummary {
                total_purchases: 0,
                total_spent: 0.0,
                favorite_store: None,
                most_purchased_products: vec![],
                last_purchase_date: None,
                average_purchase_amount: 0.0,
            });
        }

        let favorite_store: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT store_name
            FROM purchase_history
            WHERE user_id = $1
            GROUP BY store_name
            ORDER BY COUNT(id) DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let product_lists: Vec<(Value,)> =
            sqlx::query_as("SELECT products FROM purchase_history WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;
        let product_lists: Vec<Value> = product_lists.into_iter().map(|(p,)| p).collect();

        Ok(PurchaseSummary {
            total_purchases,
            total_spent: total_spent.unwrap_or(0.0),
            favorite_store: favorite_store.map(|(name,)| name),
            most_purchased_products: aggregate_products(&product_lists, 10),
            last_purchase_date: last_purchase,
            average_purchase_amount: average.unwrap_or(0.0),
        })
    }

    /// Trailing-window spend with a per-purchase rollup
    pub async fn get_user_spending_by_period(
        &self,
        user_id: Uuid,
        days: i64,
    ) -> Result<SpendingPeriod> {
        let start_date = Utc::now() - Duration::days(days);

        let purchases = sqlx::query_as::<_, PurchaseRecord>(
            r#"
            SELECT * FROM purchase_history
            WHERE user_id = $1 AND purchase_date >= $2
            ORDER BY purchase_date
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .fetch_all(&self.db)
        .await?;

        let total_spent: f64 = purchases.iter().map(|p| p.total_amount).sum();
        let num_purchases = purchases.len() as i64;

        Ok(SpendingPeriod {
            period_days: days,
            total_spent,
            num_purchases,
            average_per_purchase: if num_purchases > 0 {
                total_spent / num_purchases as f64
            } else {
                0.0
            },
            purchases: purchases
                .into_iter()
                .map(|p| SpendingPeriodEntry {
                    date: p.purchase_date,
                    store: p.store_name,
                    amount: p.total_amount,
                    products_count: p.num_products,
                })
                .collect(),
        })
    }

    pub async fn get_purchase_by_ticket_id(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<PurchaseRecord>> {
        let purchase = sqlx::query_as::<_, PurchaseRecord>(
            "SELECT * FROM purchase_history WHERE ticket_id = $1",
        )
        .bind(ticket_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(purchase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_aggregation_orders_by_count() {
        let lists = vec![
            json!([
                {"nombre": "pan", "cantidad": "1", "precio": "2.00"},
                {"nombre": "vino", "cantidad": "1", "precio": "8.50"}
            ]),
            json!([{"nombre": "pan", "cantidad": "2", "precio": "2.00"}]),
        ];

        let aggregates = aggregate_products(&lists, 10);
        assert_eq!(aggregates[0].name, "pan");
        assert_eq!(aggregates[0].count, 2);
        assert_eq!(aggregates[0].total_spent, 4.0);
        assert_eq!(aggregates[0].avg_price, 2.0);
        assert_eq!(aggregates[1].name, "vino");
    }

    #[test]
    fn product_aggregation_tolerates_malformed_rows() {
        let lists = vec![
            json!("not-a-list"),
            json!([{"cantidad": "1"}, {"nombre": "", "precio": "1.0"}]),
        ];

        let aggregates = aggregate_products(&lists, 10);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].name, "Producto desconocido");
        assert_eq!(aggregates[0].count, 2);
    }

    #[test]
    fn limit_is_applied_after_sorting() {
        let lists = vec![json!([
            {"nombre": "a", "precio": "1"},
            {"nombre": "b", "precio": "1"},
            {"nombre": "b", "precio": "1"}
        ])];

        let aggregates = aggregate_products(&lists, 1);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].name, "b");
    }
}
