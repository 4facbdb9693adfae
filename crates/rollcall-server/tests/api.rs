//! End-to-end tests over HTTP against an in-process server backed by the
//! in-memory store and cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rollcall_notifications::{NotificationError, SendResult, SmsAdapter};
use rollcall_server::{AppConfig, AppState, CacheError, KvCache, MemoryKv, serve_with_shutdown};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    fn phones(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl SmsAdapter for RecordingSms {
    async fn send(&self, phone: &str, message: &str) -> Result<SendResult, NotificationError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(SendResult::delivered(None))
    }

    fn provider(&self) -> &'static str {
        "recording"
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    sms: Arc<RecordingSms>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start(config: AppConfig) -> Self {
        Self::start_with_kv(config, Arc::new(MemoryKv::new())).await
    }

    async fn start_with_kv(config: AppConfig, kv: Arc<dyn KvCache>) -> Self {
        let sms = Arc::new(RecordingSms::default());
        let state = AppState::new(
            config,
            rollcall_db_memory::create_memory_store(),
            kv,
            sms.clone(),
        );

        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = serve_with_shutdown(listener, state, async move {
                let _ = rx.await;
            })
            .await;
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            base: format!("http://{addr}"),
            client,
            sms,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let res = self.get(path).await;
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send_json(reqwest::Method::POST, path, body).await
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn student(code: &str, first: &str, last: &str) -> Value {
    json!({
        "first_name": first,
        "last_name": last,
        "student_code": code,
        "grade_level": "7",
        "phone": "+15550100",
        "class_name": "7B"
    })
}

fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config
}

/// Usage is recorded after the response is sent; poll until it shows up.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn student_crud_round_trip() {
    let server = TestServer::start(quiet_config()).await;

    let (status, body) = server.post_json("/students", student(" s001 ", "Ada", "Lovelace")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["student_code"], "S001");
    assert_eq!(body["_id"], "S001");

    let (status, body) = server.post_json("/students", student("S001", "Other", "Person")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Student with code S001 already exists");

    let (status, body) = server.get_json("/students/s001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Ada");

    let (status, body) = server
        .send_json(reqwest::Method::PUT, "/students/S001", json!({"class_name": "8A"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["class_name"], "8A");
    assert_eq!(body["first_name"], "Ada");

    let res = server
        .client
        .delete(server.url("/students/S001"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = server.get_json("/students/S001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Student not found");

    let res = server
        .client
        .delete(server.url("/students/S001"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn invalid_student_payload_is_unprocessable() {
    let server = TestServer::start(quiet_config()).await;

    let (status, body) = server
        .post_json("/students", json!({"first_name": "Ada", "last_name": "L", "student_code": ""}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());

    let (status, _) = server.post_json("/students", json!({"first_name": "Ada"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut bad_email = student("S9", "Ada", "L");
    bad_email["email"] = json!("not-an-email");
    let (status, _) = server.post_json("/students", bad_email).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    server.stop().await;
}

#[tokio::test]
async fn reads_after_writes_are_never_stale() {
    let server = TestServer::start(quiet_config()).await;
    server.post_json("/students", student("S1", "Ada", "Zed")).await;

    // Warm both the entity and the list entries.
    let (_, one) = server.get_json("/students/S1").await;
    let (_, list) = server.get_json("/students").await;
    assert_eq!(one["last_name"], "Zed");
    assert_eq!(list.as_array().unwrap().len(), 1);

    server
        .send_json(reqwest::Method::PUT, "/students/S1", json!({"last_name": "Byron"}))
        .await;
    let (_, one) = server.get_json("/students/S1").await;
    let (_, list) = server.get_json("/students").await;
    assert_eq!(one["last_name"], "Byron");
    assert_eq!(list[0]["last_name"], "Byron");

    server.post_json("/students", student("S2", "Bob", "Adams")).await;
    let (_, list) = server.get_json("/students").await;
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["last_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Adams", "Byron"]);

    server.stop().await;
}

#[tokio::test]
async fn marking_twice_keeps_one_record_per_day() {
    let server = TestServer::start(quiet_config()).await;
    server.post_json("/students", student("S1", "Ada", "Lovelace")).await;

    // Warm the filtered list so the second mark has something to invalidate.
    server.post_json("/attendance/mark", json!({"student_code": "S1", "date": "2024-03-04", "status": "present"})).await;
    let (_, list) = server.get_json("/attendance?student_code=S1").await;
    assert_eq!(list[0]["status"], "present");

    let (status, body) = server
        .post_json(
            "/attendance/mark",
            json!({"student_id": "s1", "date": "2024-03-04", "status": "absent", "note": "flu"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "absent");

    let (status, list) = server.get_json("/attendance?student_code=S1").await;
    assert_eq!(status, StatusCode::OK);
    let records = list.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "absent");
    assert_eq!(records[0]["note"], "flu");

    let (_, by_date) = server.get_json("/attendance?date=2024-03-04").await;
    assert_eq!(by_date.as_array().unwrap().len(), 1);

    let sms = server.sms.clone();
    eventually(|| {
        let sms = sms.clone();
        async move { !sms.phones().is_empty() }
    })
    .await;
    assert_eq!(server.sms.phones(), vec!["+15550100".to_string()]);

    server.stop().await;
}

#[tokio::test]
async fn mark_without_student_code_is_bad_request() {
    let server = TestServer::start(quiet_config()).await;

    let (status, body) = server
        .post_json("/attendance/mark", json!({"date": "2024-03-04", "status": "present"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("student"));

    let (status, _) = server
        .post_json(
            "/attendance/mark",
            json!({"student_code": "S1", "date": "04/03/2024", "status": "present"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = server
        .post_json(
            "/attendance/mark",
            json!({"student_code": "S1", "date": "2024-03-04", "status": "sleeping"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    server.stop().await;
}

#[tokio::test]
async fn attendance_filters_combine() {
    let server = TestServer::start(quiet_config()).await;
    for (code, date, status) in [
        ("S1", "2024-03-04", "present"),
        ("S1", "2024-03-05", "late"),
        ("S2", "2024-03-04", "absent"),
    ] {
        let (s, _) = server
            .post_json("/attendance/mark", json!({"student_code": code, "date": date, "status": status}))
            .await;
        assert_eq!(s, StatusCode::CREATED);
    }

    let (_, all) = server.get_json("/attendance").await;
    let dates: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates.len(), 3);
    assert!(dates.windows(2).all(|w| w[0] <= w[1]));

    let (_, s1) = server.get_json("/attendance?student_code=S1").await;
    assert_eq!(s1.as_array().unwrap().len(), 2);

    let (_, both) = server.get_json("/attendance?student_code=S1&date=2024-03-05").await;
    assert_eq!(both.as_array().unwrap().len(), 1);
    assert_eq!(both[0]["status"], "late");

    let (_, none) = server.get_json("/attendance?date=2024-01-01").await;
    assert_eq!(none.as_array().unwrap().len(), 0);

    server.stop().await;
}

#[tokio::test]
async fn rate_limit_rejects_with_retry_after() {
    let mut config = AppConfig::default();
    config.rate_limit.per_minute = 3;
    let server = TestServer::start(config).await;

    // A minute boundary can reset the window once; two rounds always suffice.
    let mut limited = None;
    for _ in 0..8 {
        let res = server.get("/students").await;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            limited = Some(res);
            break;
        }
    }
    let res = limited.expect("expected a 429");
    assert_eq!(res.headers()["retry-after"], "60");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Rate limit exceeded: too many requests per minute");

    // Exempt paths are never limited.
    assert_eq!(server.get("/health").await.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn usage_statistics_reflect_traffic() {
    let mut config = quiet_config();
    config.usage.max_recent_requests = 3;
    let server = TestServer::start(config).await;

    server.post_json("/students", student("S1", "Ada", "Lovelace")).await;
    for _ in 0..4 {
        server.get("/students").await;
    }
    server.get("/students/NOPE").await;
    // Exempt paths are not counted.
    server.get("/health").await;

    let srv = &server;
    eventually(|| async move {
        let (_, today) = srv.get_json("/stats/today").await;
        today["total_requests"].as_i64().unwrap_or(0) >= 6
    })
    .await;

    let (status, today) = server.get_json("/stats/today").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(today["unique_visitors"], 1);
    assert!(today["status_codes"]["404"].as_i64().unwrap() >= 1);
    assert!(
        today["top_endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["endpoint"] == "GET /students" && e["count"] == 4)
    );

    let (_, recent) = server.get_json("/stats/recent?limit=50").await;
    let recent = recent["recent_requests"].as_array().unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent.iter().all(|r| r["path"] != "/health"));

    let (_, slowest) = server.get_json("/stats/slowest?limit=2").await;
    assert!(slowest["slowest_endpoints"].as_array().unwrap().len() <= 2);

    let day = today["date"].as_str().unwrap().to_string();
    let (status, breakdown) = server.get_json(&format!("/stats/endpoints/{day}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(breakdown["endpoints"]["POST /students"], 1);
    assert_eq!(breakdown["endpoints"]["GET /students"], 4);
    assert!(breakdown["endpoints"].get("GET /health").is_none());

    let (status, _) = server.get_json("/stats/endpoints/yesterday").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    server.stop().await;
}

#[tokio::test]
async fn admin_pages_require_login() {
    let server = TestServer::start(quiet_config()).await;

    let res = server.get("/admin").await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()["location"], "/admin/login");

    let res = server
        .client
        .post(server.url("/admin/login"))
        .form(&[("api_key", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.text().await.unwrap().contains("Invalid API key"));

    let res = server
        .client
        .post(server.url("/admin/login"))
        .form(&[("api_key", "change-me")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()["location"], "/admin");
    let cookie = res.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("admin_api_key=change-me"));
    assert!(cookie.contains("HttpOnly"));

    let res = server
        .client
        .get(server.url("/admin"))
        .header("cookie", "admin_api_key=change-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().contains("Dashboard"));

    let res = server
        .client
        .get(server.url("/admin/students"))
        .header("x-admin-key", "change-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn admin_bulk_mark_saves_rows() {
    let server = TestServer::start(quiet_config()).await;
    server.post_json("/students", student("S1", "Ada", "Lovelace")).await;
    server.post_json("/students", student("S2", "Bob", "Adams")).await;

    let res = server
        .client
        .post(server.url("/admin/attendance/mark"))
        .header("x-admin-key", "change-me")
        .form(&[
            ("date", "2024-03-04"),
            ("status_S1", "present"),
            ("status_S2", "late"),
            ("status_S3", "bogus"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()["location"], "/admin/attendance?success=true");

    let (_, list) = server.get_json("/attendance?date=2024-03-04").await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let server = TestServer::start(quiet_config()).await;

    let res = server.get("/health").await;
    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["content-security-policy"], "default-src 'self'");
    assert!(headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("x-request-id"));

    let res = server
        .client
        .get(server.url("/"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");

    let (status, ready) = server.get_json("/readiness").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready, json!({"ready": true, "db": true, "cache": true}));

    server.stop().await;
}

/// A cache whose every call fails.
struct DownKv;

fn down<T>() -> Result<T, CacheError> {
    Err(CacheError::Unavailable("connection refused".into()))
}

#[async_trait]
impl KvCache for DownKv {
    async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
        down()
    }
    async fn set_with_ttl(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        down()
    }
    async fn delete(&self, _: &[String]) -> Result<u64, CacheError> {
        down()
    }
    async fn scan(&self, _: u64, _: &str, _: usize) -> Result<(u64, Vec<String>), CacheError> {
        down()
    }
    async fn increment(&self, _: &str, _: i64) -> Result<i64, CacheError> {
        down()
    }
    async fn expire(&self, _: &str, _: Duration) -> Result<bool, CacheError> {
        down()
    }
    async fn hash_increment(&self, _: &str, _: &str, _: i64) -> Result<i64, CacheError> {
        down()
    }
    async fn hash_get_all(&self, _: &str) -> Result<HashMap<String, i64>, CacheError> {
        down()
    }
    async fn sorted_set_add(&self, _: &str, _: &str, _: f64) -> Result<(), CacheError> {
        down()
    }
    async fn sorted_set_range(
        &self,
        _: &str,
        _: isize,
        _: isize,
        _: bool,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        down()
    }
    async fn sorted_set_trim_by_rank(&self, _: &str, _: isize, _: isize) -> Result<u64, CacheError> {
        down()
    }
    async fn set_add(&self, _: &str, _: &str) -> Result<bool, CacheError> {
        down()
    }
    async fn set_cardinality(&self, _: &str) -> Result<u64, CacheError> {
        down()
    }
    async fn ping(&self) -> Result<(), CacheError> {
        down()
    }
    fn backend_name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn cache_outage_degrades_gracefully() {
    // Rate limiting stays on: it must fail open.
    let server = TestServer::start_with_kv(AppConfig::default(), Arc::new(DownKv)).await;

    let (status, _) = server.post_json("/students", student("S1", "Ada", "Lovelace")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = server.get_json("/students/S1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Ada");
    let (status, _) = server
        .post_json("/attendance/mark", json!({"student_code": "S1", "date": "2024-03-04", "status": "present"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server.get_json("/stats/today").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().starts_with("Usage statistics unavailable"));

    let (status, ready) = server.get_json("/readiness").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["cache"], false);

    server.stop().await;
}
