//! Duplicate detection over date-windowed product bags
//!
//! A ticket is a duplicate of a prior one when their timestamps fall within
//! five minutes of each other and their product bags are equal as
//! multisets. Bags are compared through a hash of the sorted, trimmed
//! `(nombre, cantidad, precio)` triples.

use serde_json::Value;
use shared::{scalar_to_text, utils::parse_ticket_datetime, ExtractedProduct};
use sha2::{Digest, Sha256};

const WINDOW_MINUTES: i64 = 5;

/// Multiset fingerprint of the product lines. Whitespace is trimmed per
/// field; ordering of lines does not matter.
pub fn product_bag_hash(products: &[ExtractedProduct]) -> String {
    let mut triples: Vec<String> = products
        .iter()
        .map(|p| {
            format!(
                "{}|{}|{}",
                scalar_to_text(&p.nombre),
                scalar_to_text(&p.cantidad),
                scalar_to_text(&p.precio)
            )
        })
        .collect();
    triples.sort();

    let mut hasher = Sha256::new();
    for triple in &triples {
        hasher.update(triple.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn products_from_result(result: &Value) -> Vec<ExtractedProduct> {
    match result.get("productos") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| ExtractedProduct {
                cantidad: item.get("cantidad").cloned().unwrap_or(Value::Null),
                nombre: item.get("nombre").cloned().unwrap_or(Value::Null),
                precio: item.get("precio").cloned().unwrap_or(Value::Null),
            })
            .collect(),
        _ => vec![],
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    enabled: bool,
}

impl DuplicateDetector {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Compare the current extraction against the `processing_result`
    /// payloads of the user's prior terminal tickets.
    ///
    /// An unparsable date on the current ticket means "not duplicate";
    /// unparsable prior tickets are skipped.
    pub fn is_duplicate(
        &self,
        fecha: Option<&str>,
        hora: Option<&str>,
        products: &[ExtractedProduct],
        prior_results: &[Value],
    ) -> bool {
        if !self.enabled {
            return false;
        }

        let Some(current_dt) = fecha.and_then(|f| parse_ticket_datetime(f, hora)) else {
            return false;
        };

        let current_bag = product_bag_hash(products);

        prior_results.iter().any(|prior| {
            let prior_fecha = prior.get("fecha").and_then(|f| f.as_str());
            let prior_hora = prior.get("hora").and_then(|h| h.as_str());

            let Some(prior_dt) = prior_fecha.and_then(|f| parse_ticket_datetime(f, prior_hora))
            else {
                return false;
            };

            let delta = (current_dt - prior_dt).num_minutes().abs();
            if delta > WINDOW_MINUTES {
                return false;
            }

            product_bag_hash(&products_from_result(prior)) == current_bag
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::ExtractedProduct;

    fn product(nombre: &str, cantidad: &str, precio: &str) -> ExtractedProduct {
        ExtractedProduct {
            cantidad: json!(cantidad),
            nombre: json!(nombre),
            precio: json!(precio),
        }
    }

    fn prior(fecha: &str, hora: Option<&str>, productos: Value) -> Value {
        match hora {
            Some(h) => json!({"fecha": fecha, "hora": h, "productos": productos}),
            None => json!({"fecha": fecha, "productos": productos}),
        }
    }

    #[test]
    fn bag_hash_is_order_independent() {
        let a = product_bag_hash(&[product("pan", "1", "2.00"), product("vino", "1", "8.50")]);
        let b = product_bag_hash(&[product("vino", "1", "8.50"), product("pan", "1", "2.00")]);
        assert_eq!(a, b);
    }

    #[test]
    fn bag_hash_trims_whitespace() {
        let a = product_bag_hash(&[product(" pan ", "1", "2.00")]);
        let b = product_bag_hash(&[product("pan", "1", "2.00")]);
        assert_eq!(a, b);
    }

    #[test]
    fn bag_hash_respects_multiplicity() {
        let a = product_bag_hash(&[product("pan", "1", "2.00"), product("pan", "1", "2.00")]);
        let b = product_bag_hash(&[product("pan", "1", "2.00")]);
        assert_ne!(a, b);
    }

    #[test]
    fn duplicate_within_window_same_bag() {
        let detector = DuplicateDetector::new(true);
        let products = vec![product("pan", "1", "2.00")];
        let priors = vec![prior(
            "15/03/2025",
            Some("18:40"),
            json!([{"nombre": "pan", "cantidad": "1", "precio": "2.00"}]),
        )];

        assert!(detector.is_duplicate(Some("15/03/2025"), Some("18:42"), &products, &priors));
        // Just outside the five-minute window
        assert!(!detector.is_duplicate(Some("15/03/2025"), Some("18:46"), &products, &priors));
    }

    #[test]
    fn different_bag_is_not_duplicate() {
        let detector = DuplicateDetector::new(true);
        let products = vec![product("vino", "1", "8.50")];
        let priors = vec![prior(
            "15/03/2025",
            Some("18:40"),
            json!([{"nombre": "pan", "cantidad": "1", "precio": "2.00"}]),
        )];

        assert!(!detector.is_duplicate(Some("15/03/2025"), Some("18:42"), &products, &priors));
    }

    #[test]
    fn unparsable_current_date_is_not_duplicate() {
        let detector = DuplicateDetector::new(true);
        let products = vec![product("pan", "1", "2.00")];
        let priors = vec![prior("15/03/2025", None, json!([]))];

        assert!(!detector.is_duplicate(Some("soon"), None, &products, &priors));
        assert!(!detector.is_duplicate(None, None, &products, &priors));
    }

    #[test]
    fn disabled_detector_never_reports_duplicates() {
        let detector = DuplicateDetector::new(false);
        let products = vec![product("pan", "1", "2.00")];
        let priors = vec![prior(
            "15/03/2025",
            Some("18:42"),
            json!([{"nombre": "pan", "cantidad": "1", "precio": "2.00"}]),
        )];

        assert!(!detector.is_duplicate(Some("15/03/2025"), Some("18:42"), &products, &priors));
    }

    #[test]
    fn date_only_tickets_compare_at_midnight() {
        let detector = DuplicateDetector::new(true);
        let products = vec![product("pan", "1", "2.00")];
        let priors = vec![prior(
            "15/03/2025",
            None,
            json!([{"nombre": "pan", "cantidad": "1", "precio": "2.00"}]),
        )];

        assert!(detector.is_duplicate(Some("15/03/2025"), None, &products, &priors));
        assert!(!detector.is_duplicate(Some("16/03/2025"), None, &products, &priors));
    }
}
