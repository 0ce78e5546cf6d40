//! JSON HTTP API.
//!
//! Routes:
//!
//! ```text
//! GET  /health
//! GET  /api/sites                      POST /api/sites
//! POST /api/sites/bulk
//! GET  /api/sites/{id}/competitors     POST /api/sites/{id}/competitors
//! GET  /api/competitors?domain=
//! GET  /api/topics?kind=&site_id=&domain=&visible=&limit=&offset=
//! GET  /api/stats
//! POST /api/scan
//! POST /api/scan/competitors?site_id=  | ?domain=
//! POST /api/seed
//! ```
//!
//! Scan endpoints answer `202 Accepted` straight away; the scan itself runs
//! on the scheduler's runtime.

use crate::fetch::PageFetcher;
use crate::models::{NewSite, RegisterSummary, Site, Stats, TopicFilter, TopicView};
use crate::scheduler::Scheduler;
use crate::seed;
use crate::store::{Store, StoreError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct AppState<F> {
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler<F>>,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Cross-origin policy for browser clients such as the topic-bar extension.
/// No configured origins means any origin is allowed.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring unparsable allowed origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub fn build_router<F>(state: AppState<F>, allowed_origins: &[String]) -> Router
where
    F: PageFetcher + 'static,
{
    Router::new()
        .route("/health", get(health))
        // Sites
        .route("/api/sites", get(list_sites).post(create_site))
        .route("/api/sites/bulk", post(create_sites_bulk))
        .route(
            "/api/sites/{id}/competitors",
            get(list_competitors).post(link_competitor),
        )
        .route("/api/competitors", get(competitors_for_domain))
        // Topics
        .route("/api/topics", get(list_topics))
        .route("/api/stats", get(stats))
        // Scans
        .route("/api/scan", post(trigger_scan::<F>))
        .route("/api/scan/competitors", post(trigger_competitor_scan::<F>))
        .route("/api/seed", post(seed_sites))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

// Handlers that never touch the scheduler only need the store.
impl<F> axum::extract::FromRef<AppState<F>> for Arc<Store> {
    fn from_ref(state: &AppState<F>) -> Self {
        state.store.clone()
    }
}

async fn health(State(store): State<Arc<Store>>) -> ApiResult<Json<Value>> {
    let stats = store.stats()?;
    Ok(Json(json!({
        "status": "ok",
        "sites": stats.sites.total,
        "topics": stats.topics,
    })))
}

async fn list_sites(State(store): State<Arc<Store>>) -> ApiResult<Json<Vec<Site>>> {
    Ok(Json(store.list_sites()?))
}

async fn create_site(
    State(store): State<Arc<Store>>,
    body: Result<Json<NewSite>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(site) = body?;
    let site = store.add_site(&site)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": site.id }))))
}

#[derive(Debug, Deserialize)]
struct BulkSites {
    sites: Vec<Value>,
}

async fn create_sites_bulk(
    State(store): State<Arc<Store>>,
    body: Result<Json<BulkSites>, JsonRejection>,
) -> ApiResult<Json<RegisterSummary>> {
    let Json(bulk) = body?;
    let total = bulk.sites.len();
    let sites: Vec<NewSite> = bulk
        .sites
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if sites.len() < total {
        warn!(skipped = total - sites.len(), "Skipping malformed bulk entries");
    }
    Ok(Json(seed::register_many(&store, &sites)?))
}

#[derive(Debug, Deserialize)]
struct LinkRequest {
    competitor_id: i64,
}

async fn link_competitor(
    State(store): State<Arc<Store>>,
    Path(id): Path<i64>,
    body: Result<Json<LinkRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(req) = body?;
    store.link_competitor(id, req.competitor_id)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "parent_id": id, "competitor_id": req.competitor_id })),
    ))
}

async fn list_competitors(
    State(store): State<Arc<Store>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Site>>> {
    if store.get_site(id)?.is_none() {
        return Err(StoreError::NotFound(format!("site {id}")).into());
    }
    Ok(Json(store.competitors_of(id)?))
}

#[derive(Debug, Deserialize)]
struct DomainQuery {
    domain: String,
}

/// Competitors of the own site matching `domain`; empty when none matches.
async fn competitors_for_domain(
    State(store): State<Arc<Store>>,
    Query(q): Query<DomainQuery>,
) -> ApiResult<Json<Vec<Site>>> {
    let competitors = match store.own_site_for_domain(&q.domain)? {
        Some(site) => store.competitors_of(site.id)?,
        None => Vec::new(),
    };
    Ok(Json(competitors))
}

async fn list_topics(
    State(store): State<Arc<Store>>,
    Query(filter): Query<TopicFilter>,
) -> ApiResult<Json<Vec<TopicView>>> {
    Ok(Json(store.list_topics(&filter, Utc::now())?))
}

async fn stats(State(store): State<Arc<Store>>) -> ApiResult<Json<Stats>> {
    Ok(Json(store.stats()?))
}

async fn trigger_scan<F>(State(state): State<AppState<F>>) -> (StatusCode, Json<Value>)
where
    F: PageFetcher + 'static,
{
    state.scheduler.trigger_scan();
    info!("Scan accepted");
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
}

#[derive(Debug, Deserialize)]
struct CompetitorScanQuery {
    site_id: Option<i64>,
    domain: Option<String>,
}

async fn trigger_competitor_scan<F>(
    State(state): State<AppState<F>>,
    Query(q): Query<CompetitorScanQuery>,
) -> ApiResult<(StatusCode, Json<Value>)>
where
    F: PageFetcher + 'static,
{
    match (q.site_id, q.domain.as_deref().map(str::trim)) {
        (Some(site_id), _) => {
            if state.store.get_site(site_id)?.is_none() {
                return Err(StoreError::NotFound(format!("site {site_id}")).into());
            }
            state.scheduler.trigger_competitor_scan(site_id);
        }
        (None, Some(domain)) if !domain.is_empty() => {
            state.scheduler.trigger_competitor_scan_for_domain(domain);
        }
        _ => return Err(ApiError::BadRequest("site_id or domain is required".to_string())),
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}

async fn seed_sites(State(store): State<Arc<Store>>) -> ApiResult<Json<RegisterSummary>> {
    Ok(Json(seed::seed_sites(&store)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSite, SiteKind};
    use crate::scanner::Scanner;
    use crate::scanner::tests::{StubFetcher, quiet_options};
    use crate::scheduler::SchedulerOptions;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    const PAGE: &str = r#"<div class="tags"><a href="/t/uno">Uno</a><a href="/t/dos">Dos</a></div>"#;

    fn app() -> (Router, Arc<Store>) {
        app_with_origins(&[])
    }

    fn app_with_origins(allowed_origins: &[String]) -> (Router, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let fetcher = StubFetcher::default().with_page("https://a.example/", PAGE);
        let scanner = Arc::new(Scanner::new(store.clone(), fetcher, quiet_options()));
        let scheduler = Arc::new(Scheduler::start_with(
            scanner,
            store.clone(),
            SchedulerOptions {
                scan_interval: Duration::from_secs(3600),
                purge_interval: Duration::from_secs(3600),
                retention_days: 7,
                scan_on_start: false,
            },
        ));
        let router = build_router(
            AppState {
                store: store.clone(),
                scheduler,
            },
            allowed_origins,
        );
        (router, store)
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app();
        let (status, body) = send(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["topics"], 0);
    }

    #[tokio::test]
    async fn test_register_site_status_codes() {
        let (router, _) = app();
        let site = json!({ "name": "A", "url": "https://a.example/", "kind": "own", "selector": ".tags a" });

        let (status, body) = send(&router, Method::POST, "/api/sites", Some(site.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["id"].as_i64().is_some());

        let (status, body) = send(&router, Method::POST, "/api/sites", Some(site)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        let bad_kind = json!({ "name": "B", "url": "https://b.example/", "kind": "rival" });
        let (status, _) = send(&router, Method::POST, "/api/sites", Some(bad_kind)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let blank = json!({ "name": " ", "url": "https://b.example/", "kind": "own" });
        let (status, _) = send(&router, Method::POST, "/api/sites", Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&router, Method::GET, "/api/sites", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["kind"], "own");
    }

    #[tokio::test]
    async fn test_bulk_registration() {
        let (router, _) = app();
        let body = json!({ "sites": [
            { "name": "El Mundo", "url": "https://www.elmundo.es/", "kind": "competitor" },
            { "name": "Sin URL", "kind": "competitor" },
            { "name": "El Mundo", "url": "https://www.elmundo.es/", "kind": "competitor" },
        ]});
        let (status, body) = send(&router, Method::POST, "/api/sites/bulk", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "added": 1, "existing": 1 }));
    }

    #[tokio::test]
    async fn test_competitor_links() {
        let (router, store) = app();
        let own = store
            .add_site(&NewSite::new("Own", "https://www.own.example/", SiteKind::Own))
            .unwrap();
        let rival = store
            .add_site(&NewSite::new("Rival", "https://rival.example/", SiteKind::Competitor))
            .unwrap();
        let uri = format!("/api/sites/{}/competitors", own.id);

        let link = json!({ "competitor_id": rival.id });
        let (status, _) = send(&router, Method::POST, &uri, Some(link.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&router, Method::POST, &uri, Some(link)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&router, Method::POST, &uri, Some(json!({ "competitor_id": 999 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&router, Method::POST, &uri, Some(json!({ "competitor_id": own.id }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Rival");

        let (_, body) = send(&router, Method::GET, "/api/competitors?domain=own.example", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        let (_, body) = send(&router, Method::GET, "/api/competitors?domain=nobody.example", None).await;
        assert_eq!(body, json!([]));

        let (status, _) = send(&router, Method::GET, "/api/sites/999/competitors", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scan_is_accepted_and_runs_in_background() {
        let (router, store) = app();
        store
            .add_site(&NewSite::new("A", "https://a.example/", SiteKind::Own).with_selector(".tags a"))
            .unwrap();

        let (status, body) = send(&router, Method::POST, "/api/scan", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({ "accepted": true }));

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.topic_count().unwrap() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scan never recorded topics");

        let (status, body) = send(&router, Method::GET, "/api/topics?kind=own&visible=true", None).await;
        assert_eq!(status, StatusCode::OK);
        let topics = body.as_array().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0]["freshness"], "fresh");
        assert_eq!(topics[0]["color"], "#4caf50");
        assert_eq!(topics[0]["site_name"], "A");

        let (_, body) = send(&router, Method::GET, "/api/topics?kind=competitor", None).await;
        assert_eq!(body, json!([]));

        let (_, body) = send(&router, Method::GET, "/api/stats", None).await;
        assert_eq!(body["topics"], 2);
        assert_eq!(body["sites"]["own"], 1);
    }

    #[tokio::test]
    async fn test_competitor_scan_params() {
        let (router, store) = app();
        let own = store
            .add_site(&NewSite::new("Own", "https://www.own.example/", SiteKind::Own))
            .unwrap();

        let (status, _) = send(&router, Method::POST, "/api/scan/competitors", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&router, Method::POST, "/api/scan/competitors?site_id=999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/scan/competitors?site_id={}", own.id);
        let (status, _) = send(&router, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (status, _) = send(&router, Method::POST, "/api/scan/competitors?domain=own.example", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_seed_endpoint() {
        let (router, _) = app();
        let (status, body) = send(&router, Method::POST, "/api/seed", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "added": 27, "existing": 0 }));
        let (_, body) = send(&router, Method::POST, "/api/seed", None).await;
        assert_eq!(body, json!({ "added": 0, "existing": 27 }));
    }

    async fn preflight(router: &Router, uri: &str, origin: &str) -> axum::response::Response {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        router.clone().oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_any_origin_by_default() {
        let (router, _) = app();
        let response = preflight(&router, "/api/scan", "chrome-extension://abcdef").await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(headers.contains_key("access-control-allow-methods"));

        let req = Request::builder()
            .uri("/api/topics")
            .header("origin", "https://www.lne.es")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_cors_restricted_origins() {
        let (router, _) = app_with_origins(&["https://www.lne.es".to_string()]);

        let allowed = preflight(&router, "/api/topics", "https://www.lne.es").await;
        assert_eq!(allowed.headers()["access-control-allow-origin"], "https://www.lne.es");

        let denied = preflight(&router, "/api/topics", "https://elsewhere.example").await;
        assert!(!denied.headers().contains_key("access-control-allow-origin"));
    }
}
