use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use marketplace::application::filter::FilterRegistry;
use marketplace::application::repos::{RepoError, StatementExecutor};
use marketplace::application::resources::ResourceService;
use marketplace::application::statement::{
    Operator, PagedStatementBuilder, QueryStatement, SqlValue, StatementBuilder,
};
use marketplace::cache::{CacheRegistry, CachingService};
use marketplace::domain::entities::{ErrorReportRecord, InstallMetricsRecord};
use marketplace::domain::types::EntityType;
use marketplace::infra::error::InfraError;
use marketplace::infra::http::{
    AdminState, HealthProbe, HttpState, build_admin_router, build_router,
};

const REPORT_A: &str = "0b5c7b1e-2f7a-4e43-9a53-4ad4b0c0d6f1";
const REPORT_B: &str = "5d9a3f44-77c1-4b55-8f3e-0e7a1f1f0c2a";
const LISTING: &str = "3f1e0a4c-6b5d-4c8e-9a7f-2d1b0c9e8f7a";

fn uuid(value: &str) -> Uuid {
    Uuid::parse_str(value).expect("fixture uuid")
}

fn report(id: &str, read: bool, features: &[&str]) -> ErrorReportRecord {
    ErrorReportRecord {
        id: uuid(id),
        listing_id: uuid(LISTING),
        title: format!("report {id}"),
        body: "stack trace".to_string(),
        status_code: 500,
        status_message: "Internal Server Error".to_string(),
        detailed_message: None,
        feature_ids: features.iter().map(|f| f.to_string()).collect(),
        read,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Applies statement clauses to a fixed set of error reports.
#[derive(Default)]
struct InMemoryReports {
    rows: Vec<ErrorReportRecord>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

fn matches_report(row: &ErrorReportRecord, statement: &QueryStatement) -> bool {
    statement.clauses().iter().all(|clause| {
        match (clause.column().name, clause.op(), clause.value()) {
            ("id", Operator::Eq, SqlValue::Uuid(id)) => row.id == *id,
            ("id", Operator::AnyOf, SqlValue::UuidArray(ids)) => ids.contains(&row.id),
            ("listing_id", Operator::Eq, SqlValue::Uuid(id)) => row.listing_id == *id,
            ("is_read", Operator::Eq, SqlValue::Bool(read)) => row.read == *read,
            ("feature_ids", Operator::Contains, SqlValue::Text(feature)) => {
                row.feature_ids.contains(feature)
            }
            _ => false,
        }
    })
}

#[async_trait]
impl StatementExecutor<ErrorReportRecord> for InMemoryReports {
    async fn execute(&self, statement: &QueryStatement) -> Result<Vec<ErrorReportRecord>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self
            .rows
            .iter()
            .filter(|row| matches_report(row, statement))
            .cloned()
            .collect())
    }
}

struct InMemoryMetrics {
    rows: Vec<InstallMetricsRecord>,
}

#[async_trait]
impl StatementExecutor<InstallMetricsRecord> for InMemoryMetrics {
    async fn execute(
        &self,
        statement: &QueryStatement,
    ) -> Result<Vec<InstallMetricsRecord>, RepoError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                statement.clauses().iter().all(|clause| match clause.value() {
                    SqlValue::Uuid(id) => row.listing_id == *id,
                    SqlValue::UuidArray(ids) => ids.contains(&row.listing_id),
                    _ => false,
                })
            })
            .cloned()
            .collect())
    }
}

struct StaticProbe {
    healthy: bool,
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn check(&self) -> Result<(), InfraError> {
        if self.healthy {
            Ok(())
        } else {
            Err(InfraError::database("connection refused"))
        }
    }
}

struct TestApp {
    public: Router,
    admin: Router,
    reports: Arc<InMemoryReports>,
}

fn build_app(healthy: bool) -> TestApp {
    let registry = Arc::new(FilterRegistry::standard());
    let builder: Arc<dyn StatementBuilder> = Arc::new(PagedStatementBuilder::new(100, 1000));

    let reports = Arc::new(InMemoryReports {
        rows: vec![
            report(REPORT_A, false, &["jdt", "pde"]),
            report(REPORT_B, true, &["egit"]),
        ],
        ..Default::default()
    });
    let report_executor: Arc<dyn StatementExecutor<ErrorReportRecord>> = reports.clone();
    let error_reports = ResourceService::new(
        EntityType::ErrorReport,
        Arc::clone(&registry),
        Arc::clone(&builder),
        report_executor,
        CachingService::new(EntityType::ErrorReport.endpoint(), Duration::from_secs(60)),
    );

    let metrics_executor: Arc<dyn StatementExecutor<InstallMetricsRecord>> =
        Arc::new(InMemoryMetrics {
            rows: vec![InstallMetricsRecord {
                listing_id: uuid(LISTING),
                total: 1200,
                last_30_days: 42,
                updated_at: OffsetDateTime::now_utc(),
            }],
        });
    let install_metrics = ResourceService::new(
        EntityType::InstallMetrics,
        registry,
        builder,
        metrics_executor,
        CachingService::new(EntityType::InstallMetrics.endpoint(), Duration::from_secs(30)),
    );

    let caches = CacheRegistry::new()
        .with(Arc::new(error_reports.cache().clone()))
        .with(Arc::new(install_metrics.cache().clone()));
    let health: Arc<dyn HealthProbe> = Arc::new(StaticProbe { healthy });

    TestApp {
        public: build_router(HttpState {
            error_reports,
            install_metrics,
            health: Arc::clone(&health),
        }),
        admin: build_admin_router(AdminState { caches, health }),
        reports,
    }
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec();
    (status, headers, body)
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn list_returns_records_with_cache_headers() {
    let app = build_app(true);

    let (status, headers, body) = send(&app.public, Method::GET, "/error_reports").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().map(Vec::len), Some(2));

    let cache_control = headers
        .get(header::CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .expect("cache-control header");
    assert!(cache_control.starts_with("public, max-age="));
    assert!(headers.contains_key(header::EXPIRES));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn filters_narrow_the_collection() {
    let app = build_app(true);

    let (status, _, body) = send(&app.public, Method::GET, "/error_reports?read=true").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json(&body);
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["id"], REPORT_B);

    let (status, _, body) = send(&app.public, Method::GET, "/error_reports?feature_id=pde").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)[0]["id"], REPORT_A);

    let uri = format!("/error_reports?ids={REPORT_A}&ids={REPORT_B}&read=false");
    let (status, _, body) = send(&app.public, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn repeated_requests_are_served_from_cache() {
    let app = build_app(true);

    for _ in 0..3 {
        let (status, _, _) = send(&app.public, Method::GET, "/error_reports?read=false").await;
        assert_eq!(status, StatusCode::OK);
    }
    // unrecognized parameters do not change the cache key
    let (status, _, _) =
        send(&app.public, Method::GET, "/error_reports?read=false&utm_source=mail").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.reports.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_record_lookup() {
    let app = build_app(true);

    let (status, _, body) =
        send(&app.public, Method::GET, &format!("/error_reports/{REPORT_A}")).await;
    assert_eq!(status, StatusCode::OK);
    let record = json(&body);
    assert_eq!(record["id"], REPORT_A);
    assert_eq!(record["read"], false);

    let (status, _, body) =
        send(&app.public, Method::GET, &format!("/install_metrics/{LISTING}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["total"], 1200);
}

#[tokio::test]
async fn path_id_wins_over_query_id() {
    let app = build_app(true);
    let uri = format!("/install_metrics/{LISTING}?id={REPORT_A}");

    let (status, _, body) = send(&app.public, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["listing_id"], LISTING);

    let (_, _, body) = send(&app.admin, Method::GET, "/cache/keys").await;
    let keys: Vec<String> = serde_json::from_slice(&body).expect("key list");
    assert_eq!(keys, [format!("[install_metrics]id:{LISTING}|id={LISTING}")]);
}

#[tokio::test]
async fn unknown_record_is_not_found() {
    let app = build_app(true);
    let missing = Uuid::new_v4();

    let (status, _, _) = send(&app.public, Method::GET, &format!("/error_reports/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_parameters_are_rejected() {
    let app = build_app(true);

    let (status, headers, body) =
        send(&app.public, Method::GET, "/error_reports?read=maybe").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("read"));
    assert!(!headers.contains_key(header::CACHE_CONTROL));

    let (status, _, _) = send(&app.public, Method::GET, "/error_reports/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app.public, Method::GET, "/error_reports?sort=body").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.reports.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_lookup_is_server_error_and_not_cached() {
    let app = build_app(true);
    app.reports.fail.store(true, Ordering::SeqCst);

    let (status, _, _) = send(&app.public, Method::GET, "/error_reports").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    app.reports.fail.store(false, Ordering::SeqCst);
    let (status, _, _) = send(&app.public, Method::GET, "/error_reports").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.reports.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn health_reflects_probe() {
    let healthy = build_app(true);
    let (status, _, _) = send(&healthy.public, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&healthy.admin, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let unhealthy = build_app(false);
    let (status, _, _) = send(&unhealthy.public, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_lists_and_invalidates_cache_keys() {
    let app = build_app(true);
    send(&app.public, Method::GET, "/error_reports").await;
    send(&app.public, Method::GET, &format!("/install_metrics/{LISTING}")).await;

    let (status, _, body) = send(&app.admin, Method::GET, "/cache/keys").await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<String> = serde_json::from_slice(&body).expect("key list");
    assert_eq!(
        keys,
        [
            "[error_reports]id:all".to_string(),
            format!("[install_metrics]id:{LISTING}|id={LISTING}"),
        ]
    );

    let (status, _, _) = send(
        &app.admin,
        Method::DELETE,
        "/cache/keys?key=%5Berror_reports%5Did%3Aall",
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, body) = send(&app.admin, Method::GET, "/cache/keys").await;
    let keys: Vec<String> = serde_json::from_slice(&body).expect("key list");
    assert_eq!(keys.len(), 1);

    send(&app.public, Method::GET, "/error_reports").await;
    assert_eq!(app.reports.calls.load(Ordering::SeqCst), 2);

    let (status, _, _) = send(&app.admin, Method::DELETE, "/cache").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, body) = send(&app.admin, Method::GET, "/cache/keys").await;
    assert_eq!(json(&body), Value::Array(Vec::new()));
}

#[tokio::test]
async fn admin_rejects_missing_key() {
    let app = build_app(true);

    let (status, _, _) = send(&app.admin, Method::DELETE, "/cache/keys").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app.admin, Method::DELETE, "/cache/keys?key=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app.admin, Method::DELETE, "/cache/keys?key=unknown").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_reports_max_age_per_cache() {
    let app = build_app(true);

    let (status, _, body) = send(&app.admin, Method::GET, "/cache/max_age").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({ "error_reports": 60, "install_metrics": 30 })
    );
}
