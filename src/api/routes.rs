use crate::{
    api::{health, map},
    maps::ConfigProvider,
    observability::{HealthChecker, MetricsRecorder},
    rate_limit::{rate_limit_middleware, RateLimiter},
};
use axum::{
    extract::{FromRef, MatchedPath, Request},
    http::Method,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub provider: Arc<ConfigProvider>,
    pub health_checker: Arc<HealthChecker>,
}

impl FromRef<AppState> for Arc<ConfigProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.provider.clone()
    }
}

impl FromRef<AppState> for Arc<HealthChecker> {
    fn from_ref(state: &AppState) -> Self {
        state.health_checker.clone()
    }
}

pub fn create_router(state: AppState, metrics_enabled: bool) -> Router {
    // The map endpoint is read-only and called from the browser
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let api = Router::new()
        .route("/map", get(map::get_map))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let mut router = Router::new()
        // Health endpoints
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api);

    if metrics_enabled {
        router = router.route("/metrics", get(health::metrics));
    }

    router
        .route_layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    MetricsRecorder::record_http_request(&method, &path, response.status().as_u16());
    MetricsRecorder::record_http_duration(&method, &path, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::location::default_locations;
    use crate::domain::RateLimitRecord;
    use crate::rate_limit::Policy;
    use crate::store::{
        AppendOutcome, AppendRequest, MemoryStore, RecordStore, StoreError, StoreResult,
    };
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request as HttpRequest, StatusCode},
    };
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with_store(store: Arc<dyn RecordStore>, max_requests: u64) -> Router {
        let policy = Policy::new(max_requests, Duration::from_secs(3600)).unwrap();
        let state = AppState {
            limiter: Arc::new(RateLimiter::new(
                store.clone(),
                policy,
                Duration::from_secs(1),
            )),
            provider: Arc::new(
                ConfigProvider::new("test-maps-key".to_string(), default_locations()).unwrap(),
            ),
            health_checker: Arc::new(HealthChecker::new(store)),
        };

        create_router(state, true)
    }

    fn map_request(ip: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri("/api/map")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_returns_payload() {
        let app = app_with_store(Arc::new(MemoryStore::new()), 5);

        let response = app.oneshot(map_request("198.51.100.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "4");

        let body = json_body(response).await;
        assert_eq!(body["apiKey"], "test-maps-key");
        assert_eq!(body["locations"].as_array().unwrap().len(), 3);
        assert_eq!(body["locations"][2]["name"], "Anatolian Plateau");
    }

    #[tokio::test]
    async fn test_quota_exceeded_returns_429() {
        let app = app_with_store(Arc::new(MemoryStore::new()), 2);

        for _ in 0..2 {
            let response = app.clone().oneshot(map_request("198.51.100.8")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(map_request("198.51.100.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_some());

        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Rate limit exceeded"));

        // Other clients keep their own quota
        let response = app.oneshot(map_request("198.51.100.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_address_uses_unknown_identifier() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with_store(store.clone(), 5);

        let request = HttpRequest::builder()
            .uri("/api/map")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(store.get("unknown-ip").await.unwrap().is_some());
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn get(&self, _identifier: &str) -> StoreResult<Option<RateLimitRecord>> {
            Err(StoreError::Timeout(Duration::from_millis(5)))
        }

        async fn check_and_append(&self, _request: AppendRequest) -> StoreResult<AppendOutcome> {
            Err(StoreError::Timeout(Duration::from_millis(5)))
        }

        async fn remove(&self, _identifier: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Timeout(Duration::from_millis(5)))
        }
    }

    #[tokio::test]
    async fn test_store_failure_returns_500() {
        let app = app_with_store(Arc::new(BrokenStore), 5);

        let response = app.oneshot(map_request("198.51.100.10")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_readiness_reflects_store() {
        let app = app_with_store(Arc::new(BrokenStore), 5);
        let request = HttpRequest::builder()
            .uri("/health/ready")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let app = app_with_store(Arc::new(MemoryStore::new()), 5);
        let request = HttpRequest::builder()
            .uri("/health/ready")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = app_with_store(Arc::new(MemoryStore::new()), 5);
        app.clone().oneshot(map_request("198.51.100.11")).await.unwrap();

        let request = HttpRequest::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("rate_limit_decisions_total"));
    }
}
