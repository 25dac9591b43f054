// Adapter tests against mocked model and sender endpoints

use serde_json::json;
use shared::config::ServicesConfig;
use shared::{AppError, ChannelType, NotificationSendRequest, SenderClient, TextGenClient, VisionClient};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn services_config(vision_url: String, llm_url: String, sender_url: String) -> ServicesConfig {
    ServicesConfig {
        vision_api_url: vision_url,
        vision_api_key: "test-key".to_string(),
        vision_timeout_seconds: 5,
        llm_url,
        llm_model: "test-model".to_string(),
        llm_timeout_seconds: 5,
        sender_url,
        sender_timeout_seconds: 5,
    }
}

fn gemini_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            {"content": {"parts": [{"text": text}]}}
        ]
    })
}

#[tokio::test]
async fn vision_returns_candidate_text() {
    let server = MockServer::start().await;

    let extraction = r#"{"fecha": "15/03/2025", "hora": "18:42", "tienda": "Mercadona 123",
        "total": "50.00", "tipo_ticket": "supermercado",
        "productos": [{"cantidad": "1", "nombre": "pan", "precio": "2.00"}]}"#;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(extraction)))
        .mount(&server)
        .await;

    let config = services_config(
        format!("{}/v1/extract", server.uri()),
        server.uri(),
        server.uri(),
    );
    let client = VisionClient::new(&config).unwrap();

    let text = client
        .extract_ticket_text(b"fake-image-bytes", "image/jpeg")
        .await
        .unwrap();

    assert!(text.contains("Mercadona 123"));

    let extracted = mercat_backend::domains::tickets::vision::parse_model_response(&text).unwrap();
    assert_eq!(extracted.tienda.as_deref(), Some("Mercadona 123"));
    assert_eq!(extracted.total_amount(), Some(50.0));
    assert_eq!(extracted.productos.len(), 1);
}

#[tokio::test]
async fn vision_http_error_is_structured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model exploded"))
        .mount(&server)
        .await;

    let config = services_config(format!("{}/v1/extract", server.uri()), server.uri(), server.uri());
    let client = VisionClient::new(&config).unwrap();

    let err = client
        .extract_ticket_text(b"img", "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upstream { .. }));
}

#[tokio::test]
async fn vision_rejects_unexpected_response_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let config = services_config(format!("{}/v1/extract", server.uri()), server.uri(), server.uri());
    let client = VisionClient::new(&config).unwrap();

    let err = client
        .extract_ticket_text(b"img", "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upstream { .. }));
}

#[tokio::test]
async fn llm_generate_reads_response_field() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "test-model", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "```json\n{\"diet\": \"vegetariano\"}\n```"
        })))
        .mount(&server)
        .await;

    let config = services_config(server.uri(), server.uri(), server.uri());
    let client = TextGenClient::new(&config).unwrap();

    let text = client
        .generate("analiza", Some("eres un analista"), 0.3, 200)
        .await
        .unwrap();

    let preferences =
        mercat_backend::domains::crm::preferences::parse_preference_response(&text);
    assert_eq!(
        preferences.get("diet"),
        Some(&serde_json::Value::String("vegetariano".to_string()))
    );
}

#[tokio::test]
async fn llm_errors_surface_as_external_service() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = services_config(server.uri(), server.uri(), server.uri());
    let client = TextGenClient::new(&config).unwrap();

    let err = client.generate("hola", None, 0.5, 50).await.unwrap_err();
    assert!(matches!(err, AppError::Upstream { .. }));
}

#[tokio::test]
async fn sender_batch_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"notification_id": "0e4f7b66-0000-0000-0000-000000000001", "status": "queued"}
            ]
        })))
        .mount(&server)
        .await;

    let config = services_config(server.uri(), server.uri(), server.uri());
    let client = SenderClient::new(&config).unwrap();

    let result = client
        .send_batch(vec![NotificationSendRequest {
            user_id: uuid::Uuid::new_v4(),
            message: "Ofertes!".to_string(),
            title: "Setmana del mercat".to_string(),
            channel: ChannelType::Webpush,
            data: Some(json!({"campaign_id": "c1"})),
        }])
        .await
        .unwrap();

    assert_eq!(result.results.len(), 1);
}

#[tokio::test]
async fn unreachable_sender_reports_unavailable() {
    // Nothing listens on this port; the dispatcher treats the error as
    // "keep records queued".
    let config = services_config(
        "http://127.0.0.1:9".to_string(),
        "http://127.0.0.1:9".to_string(),
        "http://127.0.0.1:9".to_string(),
    );
    let client = SenderClient::new(&config).unwrap();

    let err = client.send_batch(vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Unavailable(_) | AppError::Upstream { .. } | AppError::TimedOut(_)
    ));
}
