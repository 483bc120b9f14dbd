//! HTTP contract tests.
//!
//! Each test spins up the full router on a random port with an in-memory
//! store and a stub LLM, then exercises the JSON API with reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use travel_assist::analysis::purchase::READINESS_PROMPT_MARKER;
use travel_assist::api::{AppState, ProviderInfo, api_routes};
use travel_assist::error::LlmError;
use travel_assist::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use travel_assist::pipeline::EmailPipeline;
use travel_assist::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers only the readiness prompt; every other analysis falls back to
/// the heuristics.
struct StubLlm {
    readiness: f64,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let system = request.system_prompt().unwrap_or_default();
        if !system.starts_with(READINESS_PROMPT_MARKER) {
            return Err(LlmError::RequestFailed {
                provider: "stub".into(),
                reason: "not scripted".into(),
            });
        }
        let content = json!({
            "isPurchaseReady": self.readiness > 0.8,
            "readinessScore": self.readiness,
            "readySignals": ["specific dates"],
            "immediateActions": ["Call client directly"],
            "estimatedCloseTime": "24 hours",
            "potentialValue": 18000,
            "nextSteps": ["Send quote"]
        })
        .to_string();
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(readiness: f64) -> Self {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let pipeline = EmailPipeline::new(
            Arc::clone(&store),
            Arc::new(StubLlm { readiness }),
            Duration::from_secs(2),
        );
        let providers = ProviderInfo {
            selection: "auto".into(),
            chain: Vec::new(),
        };
        let app = api_routes(AppState::new(store, Arc::new(pipeline), providers));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(format!("{}{path}", self.base)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .request(method, format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, body).await
    }

    /// POST a raw body, bypassing JSON encoding.
    async fn post_raw(&self, path: &str, body: &str, content_type: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}{path}", self.base)).body(body.to_string());
        if let Some(ct) = content_type {
            req = req.header("content-type", ct);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.delete(format!("{}{path}", self.base)).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

fn email(message_id: &str, content: &str) -> Value {
    json!({
        "messageId": message_id,
        "from": "anna@example.com",
        "to": "biuro@dubaidreams.pl",
        "subject": "Zapytanie o wycieczkę",
        "content": content,
    })
}

// ── Health / status ──────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_service() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (status, body) = server.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "travel-assist");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ai_status_reports_fallback_only() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (status, body) = server.get("/api/ai-status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["fallbackOnly"], true);
        assert_eq!(body["status"]["mailTransport"], false);
        assert!(!body["recommendations"].as_array().unwrap().is_empty());
        assert!(!body.to_string().contains("API_KEY="));
    })
    .await
    .expect("test timed out");
}

// ── Email processing ─────────────────────────────────────────────────

#[tokio::test]
async fn process_is_idempotent_on_message_id() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;

        let (status, first) = server
            .post("/api/email/process", email("msg_001", "Ile kosztuje safari?"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        let email_id = first["emailId"].as_str().unwrap().to_string();
        assert!(first["conversationId"].is_string());
        assert!(first["aiInsights"]["purchasePrediction"]["purchaseProbability"].is_number());

        let (status, second) = server
            .post("/api/email/process", email("msg_001", "Ile kosztuje safari?"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["message"], "Email już przetworzony");
        assert_eq!(second["emailId"], email_id.as_str());

        let (_, list) = server.get("/api/emails").await;
        assert_eq!(list["pagination"]["total"], 1);
        assert_eq!(list["stats"]["total"], 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn process_without_sender_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (status, body) = server
            .post("/api/email/process", json!({"content": "Hello"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("from"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_body_gets_json_error() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;

        let (status, body) = server
            .post_raw("/api/email/process", "{\"from\": ", Some("application/json"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["details"]["reason"].is_string());

        let (status, body) = server
            .post_raw("/api/email/process", r#"{"from":"a@b.com","content":"x"}"#, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["details"]["status"], 415);

        let (status, body) = server
            .post_raw("/api/knowledge", r#"{"title": 5}"#, Some("application/json"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fetch_without_mailbox_is_unavailable() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (status, body) = server.post("/api/email/fetch", json!({})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);

        for path in ["/api/email/test-imap", "/api/email/test-smtp"] {
            let (status, body) = server.get(path).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{path}");
            assert_eq!(body["success"], false);
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn conversation_view_has_both_messages() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (_, processed) = server
            .post("/api/email/process", email("m1", "Ile kosztuje transfer z lotniska?"))
            .await;
        let email_id = processed["emailId"].as_str().unwrap();

        let (status, body) = server.get(&format!("/api/emails/{email_id}/conversation")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analytics"]["messageCount"], 2);
        assert_eq!(body["analytics"]["clientMessages"], 1);
        assert_eq!(body["messages"][0]["sender"], "CLIENT");
        assert_eq!(body["messages"][1]["sender"], "AGENT");
        assert!(body["conversation"]["summary"].as_str().unwrap().starts_with("[PL]"));

        let (status, _) = server.get("/api/emails/nope/conversation").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

// ── Purchase alerts ──────────────────────────────────────────────────

#[tokio::test]
async fn purchase_ready_email_raises_alert_that_can_be_resolved() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.95).await;
        let (_, processed) = server
            .post(
                "/api/email/process",
                email("m1", "PILNE: rezerwacja Sylwester, budżet bez ograniczeń"),
            )
            .await;
        assert_eq!(processed["aiInsights"]["priority"], "URGENT");
        assert_eq!(processed["aiInsights"]["escalated"], true);
        let alert_id = processed["purchaseAlert"].as_str().unwrap().to_string();

        let (status, body) = server.get("/api/purchase-alerts?status=urgent").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(body["stats"]["active"], 1);
        assert_eq!(body["stats"]["totalValue"], 18000.0);

        let (status, body) = server
            .post(
                "/api/purchase-alerts",
                json!({"action": "resolve", "alertId": alert_id, "notes": "Booked"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alert"]["isResolved"], true);
        assert_eq!(body["alert"]["resolvedBy"], "manual");

        let (status, _) = server
            .post(
                "/api/purchase-alerts",
                json!({"action": "snooze", "alertId": alert_id}),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = server.get("/api/purchase-alerts?status=resolved").await;
        assert_eq!(body["alerts"].as_array().unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn closed_sale_makes_client_vip() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.95).await;
        let (_, processed) = server
            .post(
                "/api/email/process",
                email("m1", "PILNE: rezerwacja Sylwester, budżet bez ograniczeń"),
            )
            .await;
        let alert_id = processed["purchaseAlert"].as_str().unwrap().to_string();

        let (status, _) = server
            .post(
                "/api/purchase-alerts",
                json!({"action": "snooze", "alertId": alert_id, "bookingValue": 1000}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .post(
                "/api/purchase-alerts",
                json!({"action": "resolve", "alertId": alert_id, "bookingValue": 62000}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, next) = server
            .post("/api/email/process", email("m2", "Ile kosztuje transfer z lotniska?"))
            .await;
        let reasons: Vec<&str> = next["escalationReasons"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(reasons.contains(&"High-value client (VIP treatment required)"), "{reasons:?}");
        assert_eq!(next["aiInsights"]["priority"], "URGENT");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn alert_actions_validate_input() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (status, _) = server
            .post("/api/purchase-alerts", json!({"action": "archive", "alertId": "a1"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .post("/api/purchase-alerts", json!({"action": "resolve", "alertId": "missing"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn readiness_at_threshold_raises_no_alert() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.80).await;
        let (_, processed) = server
            .post("/api/email/process", email("m1", "Ile kosztuje safari?"))
            .await;
        assert!(processed["purchaseAlert"].is_null());
        let (_, body) = server.get("/api/purchase-alerts?status=all").await;
        assert!(body["alerts"].as_array().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Knowledge + learning ─────────────────────────────────────────────

#[tokio::test]
async fn knowledge_crud() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;

        let (status, created) = server
            .post(
                "/api/knowledge",
                json!({"title": "Burj Khalifa", "content": "Level 124 tickets.", "category": "attractions", "tags": ["burj"]}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, found) = server.get("/api/knowledge?search=burj").await;
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (status, updated) = server
            .put("/api/knowledge", json!({"id": id, "isActive": false}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["isActive"], false);
        let (_, found) = server.get("/api/knowledge").await;
        assert!(found.as_array().unwrap().is_empty());

        let (status, _) = server.delete(&format!("/api/knowledge?id={id}")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = server.delete(&format!("/api/knowledge?id={id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = server.post("/api/knowledge", json!({"title": "No body"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["missing"], json!(["content"]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unanswered_question_flows_into_knowledge_base() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (_, processed) = server
            .post("/api/email/process", email("m1", "Czy hotel Atlantis ma aquapark?"))
            .await;
        assert_eq!(processed["replySource"], "follow_up_promise");
        assert!(processed["learningEntry"].is_string());

        let (_, queue) = server.get("/api/learning?status=pending").await;
        let entries = queue["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(queue["stats"]["pending"], 1);
        let learning_id = entries[0]["id"].as_str().unwrap().to_string();

        let (status, resolved) = server
            .put(
                "/api/learning",
                json!({"learningId": learning_id, "answer": "Tak, Aquaventure.", "addToKnowledgeBase": true}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["addedToKnowledge"], true);
        assert_eq!(resolved["entry"]["status"], "resolved");

        let (_, knowledge) = server.get("/api/knowledge").await;
        let knowledge = knowledge.as_array().unwrap();
        assert_eq!(knowledge.len(), 1);
        assert!(knowledge[0]["title"].as_str().unwrap().starts_with("FAQ: Czy hotel Atlantis"));
        assert_eq!(knowledge[0]["content"], "Tak, Aquaventure.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn learning_submission_sets_priority() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        let (status, body) = server
            .post(
                "/api/learning",
                json!({"customerEmail": "a@b.com", "question": "Jaka jest cena wizy?"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["learningId"].is_string());

        let (_, queue) = server.get("/api/learning").await;
        assert_eq!(queue["entries"][0]["priority"], "high");
    })
    .await
    .expect("test timed out");
}

// ── Settings ─────────────────────────────────────────────────────────

#[tokio::test]
async fn settings_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;

        let (status, defaults) = server.get("/api/settings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(defaults["email"]["autoReply"], false);

        let (status, body) = server.post("/api/settings", json!({"ai": {}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["missing"].as_array().unwrap().len(), 6);

        let mut doc = defaults.clone();
        doc["email"]["signature"] = json!("Zespół Dubai Dreams");
        let (status, _) = server.post("/api/settings", doc).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = server
            .put("/api/settings", json!({"section": "email", "key": "autoReply", "value": true}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, current) = server.get("/api/settings").await;
        assert_eq!(current["email"]["autoReply"], true);
        assert_eq!(current["email"]["signature"], "Zespół Dubai Dreams");

        let (status, _) = server
            .put("/api/settings", json!({"section": "theme", "key": "dark", "value": true}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn dashboard_counts_processed_emails() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start(0.0).await;
        server
            .post("/api/email/process", email("m1", "Ile kosztuje safari?"))
            .await;
        server
            .post("/api/email/process", email("m2", "I want a refund, this is a problem"))
            .await;

        let (status, stats) = server.get("/api/dashboard/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["emails"]["total"], 2);
        assert_eq!(stats["emails"]["escalated"], 1);
        assert_eq!(stats["emails"]["responded"], 1);
        assert_eq!(stats["learning"]["pending"], 2);
    })
    .await
    .expect("test timed out");
}
