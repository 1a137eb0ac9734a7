//! REST API against a fully wired hub

use std::net::SocketAddr;

use chrono::{TimeDelta, Utc};
use lifeguard::{
    actors::{LifecycleHandle, MonitorHandle},
    api::{ApiState, spawn_api_server},
    config::ApiConfig,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{Harness, LOCAL, fast_settings};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    client: reqwest::Client,
    harness: Harness,
}

impl TestApi {
    async fn spawn() -> Self {
        let harness = Harness::new(fast_settings()).await;
        harness.fetcher.respond(LOCAL, 200);

        let monitor = MonitorHandle::spawn(harness.monitor.clone(), None);
        let lifecycle = LifecycleHandle::spawn(harness.scheduler.clone(), harness.settings.clone());
        let state = ApiState::new(
            monitor,
            lifecycle,
            harness.storage.backend.clone(),
            harness.storage.history.clone(),
        );

        let config = ApiConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            token: Some(TOKEN.to_string()),
            cors: true,
        };
        let addr = spawn_api_server(config, state).await.unwrap();

        Self {
            addr,
            client: reqwest::Client::new(),
            harness,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{path}", self.addr)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> reqwest::Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_requests_need_the_token() {
    let api = TestApi::spawn().await;

    let anonymous = api.client.get(api.url("/health")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = api
        .client
        .get(api.url("/health"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let ok = api.get("/health").await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage_healthy"], true);
    assert!(body["storage_stats"].is_string());
}

#[tokio::test]
async fn test_settings_update_then_reload() {
    let api = TestApi::spawn().await;

    let rejected = api
        .send_json(
            reqwest::Method::PUT,
            "/settings",
            json!({ "disk_threshold_percent": 0.0 }),
        )
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let saved: Value = api
        .send_json(
            reqwest::Method::PUT,
            "/settings",
            json!({ "check_interval_secs": 20, "max_runtime_secs": null }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(saved["check_interval_secs"], 20);
    assert_eq!(saved["max_runtime_secs"], Value::Null);

    let view: Value = api.get("/settings").await.json().await.unwrap();
    assert_eq!(view["persisted"]["check_interval_secs"], 20);

    let reload: Value = api.post("/settings/reload").await.json().await.unwrap();
    assert_eq!(reload["version"], saved["version"]);

    let view: Value = api.get("/settings").await.json().await.unwrap();
    assert_eq!(view["in_effect"]["check_interval_secs"], 20);
    assert_eq!(view["reload_error"], Value::Null);
}

#[tokio::test]
async fn test_manual_cycle_and_status() {
    let api = TestApi::spawn().await;

    let outcome: Value = api.post("/monitor/run").await.json().await.unwrap();
    assert!(outcome["outcome"].is_string());

    let status: Value = api.get("/status").await.json().await.unwrap();
    assert_eq!(status["monitor"]["last_report"]["status"], "healthy");
    assert!(status["monitor"]["counters"]["completed"].as_u64().unwrap() >= 1);
    assert!(status["active_alerts"].as_array().unwrap().is_empty());

    let reports: Value = api.get("/reports?limit=1").await.json().await.unwrap();
    assert_eq!(reports["count"], 1);
}

#[tokio::test]
async fn test_lifecycle_endpoints() {
    let api = TestApi::spawn().await;
    let expires_at = Utc::now() + TimeDelta::days(2);

    let registered = api
        .send_json(
            reqwest::Method::PUT,
            "/lifecycle/sub-1",
            json!({ "label": "Acme", "recipient": "ops@acme.test", "expires_at": expires_at }),
        )
        .await;
    assert_eq!(registered.status(), StatusCode::OK);

    let scan: Value = api.post("/lifecycle/scan").await.json().await.unwrap();
    assert!(scan["scanned"].as_u64().is_some());

    let summary: Value = api.get("/lifecycle").await.json().await.unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["expiring"], 1);
    assert_eq!(summary["due_soon"][0]["id"], "sub-1");

    for horizon in ["-1", "9223372036854775807"] {
        let rejected = api
            .get(&format!("/lifecycle?horizon_hours={horizon}"))
            .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }
    let wide = api.get("/lifecycle?horizon_hours=87600").await;
    assert_eq!(wide.status(), StatusCode::OK);

    let past = api
        .send_json(
            reqwest::Method::POST,
            "/lifecycle/sub-1/renew",
            json!({ "expires_at": Utc::now() - TimeDelta::days(1) }),
        )
        .await;
    assert_eq!(past.status(), StatusCode::BAD_REQUEST);

    let unknown = api
        .send_json(
            reqwest::Method::POST,
            "/lifecycle/nope/renew",
            json!({ "expires_at": Utc::now() + TimeDelta::days(1) }),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let renewed: Value = api
        .send_json(
            reqwest::Method::POST,
            "/lifecycle/sub-1/renew",
            json!({ "expires_at": Utc::now() + TimeDelta::days(90) }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(renewed["status"], "active");
    assert_eq!(renewed["warning_7d_sent_at"], Value::Null);

    // the seven-day notice went out exactly once before the renewal
    let seven_day = api
        .harness
        .admin
        .subjects()
        .into_iter()
        .filter(|s| s.contains("expires in"))
        .count();
    assert_eq!(seven_day, 1);
}
