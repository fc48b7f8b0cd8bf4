//! End-to-end tests against a mock Rave gateway.

use armature_rave::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "FLWSECK_TEST-0123456789abcdef-X";

struct NoDelay;

#[async_trait]
impl RequeryDelay for NoDelay {
    async fn wait(&self, _duration: Duration) {}
}

#[derive(Default)]
struct Counter {
    requeries: Mutex<u32>,
    outcome: Mutex<Vec<String>>,
}

impl EventSink for Counter {
    fn on_requery(&self, _reference: &str) {
        *self.requeries.lock().unwrap() += 1;
    }

    fn on_successful(&self, _data: &Value) {
        self.outcome.lock().unwrap().push("successful".into());
    }

    fn on_failure(&self, _data: &Value) {
        self.outcome.lock().unwrap().push("failure".into());
    }

    fn on_timeout(&self, _reference: &str, _raw_body: &str) {
        self.outcome.lock().unwrap().push("timeout".into());
    }

    fn on_requery_error(&self, _raw_body: &str) {
        self.outcome.lock().unwrap().push("requery_error".into());
    }
}

fn config(server: &MockServer) -> RaveConfig {
    RaveConfig::new(SECRET)
        .with_public_key("FLWPUBK_TEST-abc-X")
        .with_base_url(server.uri())
}

#[tokio::test]
async fn test_card_charge_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/charges"))
        .and(query_param("type", "card"))
        .and(header("authorization", format!("Bearer {}", SECRET).as_str()))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Charge initiated",
            "meta": {"authorization": {"mode": "otp", "endpoint": "/v3/validate-charge"}},
            "data": {"id": 288200108, "flw_ref": "FLW-MOCK-1", "status": "pending"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut rave = ChargeOrchestrator::connect(config(&server), ChargeType::Card).unwrap();
    let reference = rave.reference().to_string();

    let outcome = rave
        .charge(
            ChargeRequest::new(Decimal::from(100), "NGN", "user@example.com")
                .card(CardDetails::new("5531886652142950", "564", "09", "32")),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ChargeOutcome::Otp {
            flw_ref: "FLW-MOCK-1".into(),
            id: json!(288200108),
            auth_mode: "otp".into(),
        }
    );

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let client = body["client"].as_str().unwrap();
    let plain = signer::decrypt(client, &signer::derive_key(SECRET)).unwrap();
    let payload: Value = serde_json::from_slice(&plain).unwrap();
    assert_eq!(payload["tx_ref"], reference.as_str());
    assert_eq!(payload["email"], "user@example.com");
}

#[tokio::test]
async fn test_gateway_error_status_code_still_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/charges"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "error",
            "message": "Invalid card number",
            "data": null
        })))
        .mount(&server)
        .await;

    let mut rave = ChargeOrchestrator::connect(config(&server), ChargeType::Card).unwrap();
    let outcome = rave
        .charge(
            ChargeRequest::new(Decimal::from(100), "NGN", "user@example.com")
                .card(CardDetails::new("4111111111111111", "123", "01", "30")),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ChargeOutcome::Error {
            message: "Invalid card number".into()
        }
    );
}

#[tokio::test]
async fn test_requery_times_out_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/transactions/288200108/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "success", "data": {"status": "pending"}})),
        )
        .expect(6)
        .mount(&server)
        .await;

    let sink = Arc::new(Counter::default());
    let mut rave = ChargeOrchestrator::connect(config(&server), ChargeType::Card)
        .unwrap()
        .with_event_sink(sink.clone())
        .with_requery_delay(Arc::new(NoDelay));

    let outcome = rave.requery_transaction("288200108").await;

    assert!(matches!(
        outcome.into_result(),
        Err(RaveError::TimeoutExceeded { attempts: 6, .. })
    ));
    assert_eq!(*sink.requeries.lock().unwrap(), 6);
    assert_eq!(*sink.outcome.lock().unwrap(), vec!["timeout".to_string()]);
}

#[tokio::test]
async fn test_requery_settles_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/transactions/42/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"id": 42, "status": "successful", "amount": 100, "currency": "NGN"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(Counter::default());
    let mut rave = ChargeOrchestrator::connect(config(&server), ChargeType::mpesa())
        .unwrap()
        .with_event_sink(sink.clone())
        .with_requery_delay(Arc::new(NoDelay));

    let (status, data) = rave.requery_transaction("42").await.into_result().unwrap();

    assert_eq!(status, TransactionStatus::Successful);
    assert_eq!(data["amount"], 100);
    assert_eq!(*sink.outcome.lock().unwrap(), vec!["successful".to_string()]);
}

#[tokio::test]
async fn test_requery_unreachable_gateway() {
    let server = MockServer::start().await;
    let config = config(&server).with_base_url("http://127.0.0.1:9");

    let sink = Arc::new(Counter::default());
    let mut rave = ChargeOrchestrator::connect(config, ChargeType::Card)
        .unwrap()
        .with_event_sink(sink.clone());

    let outcome = rave.requery_transaction("1").await;

    assert!(matches!(outcome, RequeryOutcome::Error(RaveError::Transport(_))));
    assert_eq!(*sink.requeries.lock().unwrap(), 1);
    assert_eq!(*sink.outcome.lock().unwrap(), vec!["requery_error".to_string()]);
}

#[tokio::test]
async fn test_validate_charge_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/validate-charge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Charge validated",
            "data": {"id": 288200108, "status": "successful", "flw_ref": "FLW-MOCK-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rave = ChargeOrchestrator::connect(config(&server), ChargeType::Card).unwrap();
    let envelope = rave
        .validate_charge("12345", "FLW-MOCK-1", ValidationType::Card)
        .await
        .unwrap();

    assert_eq!(envelope.data_status(), Some("successful"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, json!({"type": "card", "flw_ref": "FLW-MOCK-1", "otp": "12345"}));
}

#[tokio::test]
async fn test_base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rave/v3/transactions/42/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"id": 42, "status": "failed"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server).with_base_url(format!("{}/rave", server.uri()));
    let mut rave = ChargeOrchestrator::connect(config, ChargeType::Card).unwrap();

    let (status, _) = rave.requery_transaction("42").await.into_result().unwrap();
    assert_eq!(status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_token_charge_and_capture_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/tokenized-charges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"id": 9, "status": "successful", "flw_ref": "FLW-PREAUTH-9"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v3/charges/FLW-PREAUTH-9/capture"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"status": "successful", "amount": 75}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut rave = ChargeOrchestrator::connect(config(&server), ChargeType::Card).unwrap();
    rave.token_charge(TokenChargeRequest::new(
        "flw-t1nf-abc",
        Decimal::from(100),
        "NGN",
        "NG",
        "user@example.com",
    ))
    .await
    .unwrap();

    let flw_ref = rave.flw_ref().unwrap().to_string();
    let envelope = rave
        .capture_funds(&flw_ref, Some(Decimal::from(75)))
        .await
        .unwrap();
    assert_eq!(envelope.data_status(), Some("successful"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(body, json!({"amount": 75.0}));
}
