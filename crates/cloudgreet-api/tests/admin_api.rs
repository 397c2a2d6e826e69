//! End-to-end tests for the admin API over the in-memory store

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use chrono::Utc;
use cloudgreet_api::auth::hash_api_key;
use cloudgreet_api::{create_router, AppState};
use cloudgreet_core::CredentialCipher;
use cloudgreet_storage::models::ApiKey;
use cloudgreet_storage::Store;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

const API_KEY: &str = "cg_test_0123456789abcdef";

struct Harness {
    server: TestServer,
    store: Store,
    tenant_id: Uuid,
}

async fn harness() -> Harness {
    let store = Store::memory();
    let tenant_id = Uuid::new_v4();
    store
        .api_keys
        .insert(ApiKey {
            id: Uuid::new_v4(),
            tenant_id,
            name: "test".to_string(),
            key_hash: hash_api_key(API_KEY),
            key_prefix: API_KEY[..8].to_string(),
            scopes: vec!["*".to_string()],
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let state = AppState::new(store.clone(), CredentialCipher::generate());
    let server = TestServer::new(create_router(state, &[])).unwrap();
    Harness {
        server,
        store,
        tenant_id,
    }
}

fn authed(request: TestRequest) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-api-key"),
        HeaderValue::from_static(API_KEY),
    )
}

impl Harness {
    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = authed(self.server.get(path)).await;
        (response.status_code(), body(&response.text()))
    }

    async fn post(&self, path: &str, payload: Value) -> (StatusCode, Value) {
        let response = authed(self.server.post(path)).json(&payload).await;
        (response.status_code(), body(&response.text()))
    }

    async fn patch(&self, path: &str, payload: Value) -> (StatusCode, Value) {
        let response = authed(self.server.patch(path)).json(&payload).await;
        (response.status_code(), body(&response.text()))
    }

    async fn put(&self, path: &str, payload: Value) -> (StatusCode, Value) {
        let response = authed(self.server.put(path)).json(&payload).await;
        (response.status_code(), body(&response.text()))
    }

    async fn template(&self, channel: &str) -> Value {
        let (status, template) = self
            .post(
                "/api/admin/outreach/templates",
                json!({
                    "name": format!("{} intro", channel),
                    "channel": channel,
                    "subject": "Missed calls cost you jobs",
                    "body": "Hi {{first_name}}, CloudGreet answers every call for {{company}}.",
                    "complianceFooter": "Reply STOP to opt out"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", template);
        template
    }
}

fn body(text: &str) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).unwrap_or(Value::String(text.to_string()))
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let h = harness().await;
    let response = h.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let detailed = h.server.get("/health/detailed").await;
    let detailed = body(&detailed.text());
    assert_eq!(detailed["checks"]["storage"]["backend"], "memory");
}

#[tokio::test]
async fn test_admin_routes_require_a_valid_key() {
    let h = harness().await;

    let response = h.server.get("/api/admin/outreach/sequences").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(&response.text())["code"], "UNAUTHORIZED");

    let response = h
        .server
        .get("/api/admin/outreach/sequences")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer cg_test_wrong_key"),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = h
        .server
        .get("/api/admin/outreach/sequences")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", API_KEY)).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_sequence_steps_round_trip_in_order() {
    let h = harness().await;
    let email = h.template("email").await;
    let sms = h.template("sms").await;

    let (status, created) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({
                "name": "Roofers follow-up",
                "steps": [
                    {"channel": "email", "waitMinutes": 0, "templateId": email["id"]},
                    {"channel": "sms", "waitMinutes": 1440, "templateId": sms["id"]}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["status"], "draft");

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = h
        .get(&format!("/api/admin/outreach/sequences/{}", id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let steps = fetched["steps"].as_array().unwrap();
    let orders: Vec<i64> = steps.iter().map(|s| s["stepOrder"].as_i64().unwrap()).collect();
    assert_eq!(orders, vec![1, 2]);
    assert_eq!(steps[0]["channel"], "email");
    assert_eq!(steps[0]["templateId"], email["id"]);
    assert_eq!(steps[1]["channel"], "sms");
    assert_eq!(steps[1]["waitMinutes"], 1440);
    assert_eq!(steps[1]["templateId"], sms["id"]);
}

#[tokio::test]
async fn test_create_activate_and_list() {
    let h = harness().await;
    let template = h.template("email").await;

    let (_, created) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({
                "name": "Plumbers",
                "throttlePerDay": 100,
                "steps": [{"channel": "email", "waitMinutes": 0, "templateId": template["id"]}]
            }),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, activated) = h
        .patch(
            &format!("/api/admin/outreach/sequences/{}", id),
            json!({"status": "active"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", activated);

    let (status, list) = h.get("/api/admin/outreach/sequences").await;
    assert_eq!(status, StatusCode::OK);
    let sequences = list["sequences"].as_array().unwrap();
    assert_eq!(sequences.len(), 1);
    assert_eq!(sequences[0]["status"], "active");
    assert_eq!(sequences[0]["throttlePerDay"], 100);
    assert_eq!(sequences[0]["steps"][0]["templateId"], template["id"]);
    assert_eq!(sequences[0]["metrics"]["sent"], 0);
}

#[tokio::test]
async fn test_illegal_transitions_conflict() {
    let h = harness().await;
    let template = h.template("sms").await;
    let (_, created) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({
                "name": "Electricians",
                "steps": [{"channel": "sms", "templateId": template["id"]}]
            }),
        )
        .await;
    let path = format!("/api/admin/outreach/sequences/{}", created["id"].as_str().unwrap());

    let (status, err) = h.patch(&path, json!({"status": "paused"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "INVALID_TRANSITION");
    assert_eq!(err["error"], "Cannot change status from draft to paused");

    assert_eq!(h.patch(&path, json!({"status": "active"})).await.0, StatusCode::OK);
    assert_eq!(h.patch(&path, json!({"status": "paused"})).await.0, StatusCode::OK);
    assert_eq!(h.patch(&path, json!({"status": "active"})).await.0, StatusCode::OK);

    let (status, _) = h.patch(&path, json!({"status": "draft"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_sequences_are_rejected_before_saving() {
    let h = harness().await;

    let (status, err) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({"name": "No template", "steps": [{"channel": "email", "waitMinutes": 0}]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "VALIDATION_ERROR");

    let (status, _) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({"name": "Empty", "steps": []}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({
                "name": "Overnight",
                "sendWindowStart": "20:00",
                "sendWindowEnd": "08:00",
                "steps": [{"channel": "call"}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, list) = h.get("/api/admin/outreach/sequences").await;
    assert_eq!(list["sequences"], json!([]));
}

#[tokio::test]
async fn test_call_only_sequence_needs_no_template() {
    let h = harness().await;
    let (status, created) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({"name": "Call blitz", "steps": [{"channel": "call", "waitMinutes": 30}]}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["steps"][0]["templateId"], Value::Null);
}

#[tokio::test]
async fn test_delete_removes_sequence() {
    let h = harness().await;
    let (_, created) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({"name": "Temporary", "steps": [{"channel": "call"}]}),
        )
        .await;
    let path = format!("/api/admin/outreach/sequences/{}", created["id"].as_str().unwrap());

    let response = authed(h.server.delete(&path)).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let (status, err) = h.get(&path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "NOT_FOUND");

    let response = authed(h.server.delete(&path)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_enroll_and_reply_pauses_only_that_contact() {
    let h = harness().await;
    let template = h.template("email").await;
    let (_, created) = h
        .post(
            "/api/admin/outreach/sequences",
            json!({
                "name": "HVAC",
                "steps": [{"channel": "email", "waitMinutes": 60, "templateId": template["id"]}]
            }),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    let enroll_path = format!("/api/admin/outreach/sequences/{}/enrollments", id);

    for contact in ["lead-1", "lead-2"] {
        let (status, enrollment) = h
            .post(
                &enroll_path,
                json!({"contactId": contact, "email": format!("{}@example.com", contact)}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", enrollment);
        assert_eq!(enrollment["nextStepOrder"], 1);
    }

    let (status, _) = h
        .post(&enroll_path, json!({"contactId": "lead-1", "email": "lead-1@example.com"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, outcome) = h
        .post("/api/admin/outreach/replies", json!({"contactId": "lead-1"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["pausedEnrollments"].as_array().unwrap().len(), 1);

    let (_, list) = h.get(&enroll_path).await;
    let statuses: Vec<(String, String)> = list["enrollments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["contactId"].as_str().unwrap().to_string(),
                e["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert!(statuses.contains(&("lead-1".to_string(), "paused".to_string())));
    assert!(statuses.contains(&("lead-2".to_string(), "active".to_string())));
}

#[tokio::test]
async fn test_opt_outs_are_normalized_and_listed() {
    let h = harness().await;
    let (status, opt_out) = h
        .post(
            "/api/admin/outreach/opt-outs",
            json!({"channel": "email", "address": " Owner@Example.COM ", "reason": "asked"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", opt_out);
    assert_eq!(opt_out["address"], "owner@example.com");

    let (status, _) = h
        .post(
            "/api/admin/outreach/opt-outs",
            json!({"channel": "sms", "address": "not a phone"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, list) = h.get("/api/admin/outreach/opt-outs").await;
    assert_eq!(list["optOuts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delivery_for_unknown_send_is_not_found() {
    let h = harness().await;
    let (status, err) = h
        .post(
            &format!("/api/admin/outreach/sends/{}/delivery", Uuid::new_v4()),
            json!({"status": "delivered"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_stats_are_zero_safe() {
    let h = harness().await;

    let (status, stats) = h.get("/api/admin/outreach/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["range"], "7d");
    assert_eq!(stats["totalSent"], 0);
    assert_eq!(stats["replyRate"], 0.0);
    assert_eq!(stats["deliveryRate"], 0.0);
    assert_eq!(stats["byChannel"].as_array().unwrap().len(), 3);

    let (status, stats) = h.get("/api/admin/outreach/stats?range=90d").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["range"], "90d");

    let (status, err) = h.get("/api/admin/outreach/stats?range=1y").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_ai_settings_default_then_update() {
    let h = harness().await;

    let (status, settings) = h.get("/api/admin/ai-settings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["tone"], "professional");
    assert_eq!(settings["updatedAt"], Value::Null);

    let (status, saved) = h
        .put(
            "/api/admin/ai-settings",
            json!({"tone": "friendly", "maxCallMinutes": 15}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", saved);
    assert_eq!(saved["tone"], "friendly");
    assert_eq!(saved["maxCallMinutes"], 15);

    let (status, _) = h
        .put("/api/admin/ai-settings", json!({"escalationThreshold": 2.0}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_prospect_sync_requires_saved_filters() {
    let h = harness().await;

    let (status, filters) = h.get("/api/admin/prospecting/filters").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filters["filters"], Value::Null);

    let (status, _) = h.post("/api/admin/prospecting/sync", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, saved) = h
        .post(
            "/api/admin/prospecting/filters",
            json!({"source": "apollo", "industries": ["Roofing"], "locations": ["Denver, CO"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", saved);

    let (status, run) = h.post("/api/admin/prospecting/sync", json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{}", run);
    assert_eq!(run["status"], "queued");

    let (_, runs) = h.get("/api/admin/prospecting/sync").await;
    assert_eq!(runs["runs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_integration_secrets_are_masked() {
    let h = harness().await;
    let secret = "KEY_live_9f8e7d6c5b4a";

    let (status, view) = h
        .post(
            "/api/admin/integrations",
            json!({"provider": "telnyx", "fields": {"apiKey": secret}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", view);
    assert_eq!(view["fields"]["apiKey"], "••••5b4a");

    let (_, list) = h.get("/api/admin/integrations").await;
    assert!(!list.to_string().contains(secret));
    let telnyx = list["integrations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["provider"] == "telnyx")
        .unwrap()
        .clone();
    assert_eq!(telnyx["configured"], true);

    let stored = h
        .store
        .settings
        .list_integrations(h.tenant_id)
        .await
        .unwrap();
    assert!(!stored[0].fields["apiKey"].contains(secret));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let h = harness().await;
    let response = h.server.get("/openapi.json").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let spec = body(&response.text());
    assert_eq!(spec["info"]["title"], "CloudGreet Admin API");
}
