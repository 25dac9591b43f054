//! Normalization of the vision model's free-text answer into a structured
//! extraction.

use serde_json::Value;
use shared::{AppError, ExtractedProduct, ExtractedTicket, Result};

/// Locate the first balanced `{…}` block in the model response and parse
/// it. Models wrap the JSON in prose or markdown fences often enough that
/// taking the span from the first `{` to the last `}` is the reliable path.
pub fn extract_json_block(text: &str) -> Result<Value> {
    let text = text.trim();

    let start = text
        .find('{')
        .ok_or_else(|| AppError::processing("No JSON object found in model response"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| AppError::processing("No JSON object found in model response"))?;

    if end < start {
        return Err(AppError::processing("No JSON object found in model response"));
    }

    serde_json::from_str(&text[start..=end])
        .map_err(|e| AppError::processing(format!("Malformed JSON in model response: {}", e)))
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a parsed object into an `ExtractedTicket`: missing fields
/// become null, `productos` is coerced to a list.
pub fn normalize_extraction(parsed: &Value) -> ExtractedTicket {
    let productos = match parsed.get("productos") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| ExtractedProduct {
                cantidad: item.get("cantidad").cloned().unwrap_or(Value::Null),
                nombre: item.get("nombre").cloned().unwrap_or(Value::Null),
                precio: item.get("precio").cloned().unwrap_or(Value::Null),
            })
            .collect(),
        _ => vec![],
    };

    ExtractedTicket {
        fecha: optional_text(parsed.get("fecha")),
        hora: optional_text(parsed.get("hora")),
        tienda: optional_text(parsed.get("tienda")),
        total: parsed.get("total").cloned().unwrap_or(Value::Null),
        tipo_ticket: optional_text(parsed.get("tipo_ticket")),
        productos,
    }
}

/// Full parse path: model text -> structured extraction.
pub fn parse_model_response(text: &str) -> Result<ExtractedTicket> {
    let parsed = extract_json_block(text)?;
    Ok(normalize_extraction(&parsed))
}

/// True when the extraction carries the structural fields the duplicate
/// check and the history write need.
pub fn has_structural_fields(extracted: &ExtractedTicket) -> bool {
    extracted.fecha.is_some() && !extracted.productos.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let response = r#"Claro, aquí está el resultado:
```json
{"fecha": "15/03/2025", "hora": "18:42", "tienda": "Mercadona 123",
 "total": "50.00", "tipo_ticket": "supermercado",
 "productos": [{"cantidad": "1", "nombre": "pan", "precio": "2.00"}]}
```
Espero que sirva."#;

        let extracted = parse_model_response(response).unwrap();
        assert_eq!(extracted.fecha.as_deref(), Some("15/03/2025"));
        assert_eq!(extracted.tienda.as_deref(), Some("Mercadona 123"));
        assert_eq!(extracted.productos.len(), 1);
        assert_eq!(extracted.total_amount(), Some(50.0));
    }

    #[test]
    fn missing_fields_become_null() {
        let extracted = parse_model_response(r#"{"tienda": "Bar Paco"}"#).unwrap();
        assert_eq!(extracted.fecha, None);
        assert_eq!(extracted.hora, None);
        assert!(extracted.productos.is_empty());
        assert_eq!(extracted.total_amount(), None);
    }

    #[test]
    fn productos_coerced_to_list() {
        let extracted =
            parse_model_response(r#"{"productos": "no lo sé", "tienda": "X"}"#).unwrap();
        assert!(extracted.productos.is_empty());

        let extracted = parse_model_response(
            r#"{"productos": [{"nombre": "vino"}, {}]}"#,
        )
        .unwrap();
        assert_eq!(extracted.productos.len(), 2);
        assert_eq!(extracted.productos[0].nombre, json!("vino"));
        assert_eq!(extracted.productos[1].nombre, serde_json::Value::Null);
    }

    #[test]
    fn rejects_responses_without_json() {
        assert!(parse_model_response("lo siento, no puedo leer la imagen").is_err());
        assert!(parse_model_response("").is_err());
        assert!(parse_model_response("}{").is_err());
    }

    #[test]
    fn structural_fields_gate() {
        let good = parse_model_response(
            r#"{"fecha": "01/01/2025", "productos": [{"nombre": "pan"}]}"#,
        )
        .unwrap();
        assert!(has_structural_fields(&good));

        let no_fecha =
            parse_model_response(r#"{"productos": [{"nombre": "pan"}]}"#).unwrap();
        assert!(!has_structural_fields(&no_fecha));
    }
}
