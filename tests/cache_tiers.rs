//! Integration tests over the multi-tier cache as exercised through the
//! HTTP surface: warm → stats → refresh → clear (`spec.md` §4.4, §6).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use chronoretrace_core::cache::{
    LocalCache, MockDataProvider, MultiTierCache, RemoteCachePort, RemoteInfo, WarmingController,
};
use chronoretrace_core::error::{ChronoError, ChronoResult};
use chronoretrace_core::infrastructure::http::{AppState, create_router};
use chronoretrace_core::monitor::PerformanceMonitor;
use chronoretrace_core::realtime::ConnectionManager;

/// In-memory stand-in for the remote tier (`spec.md` §4.3), so these tests
/// exercise the multi-tier read/write/invalidate contract without a real
/// Redis instance.
#[derive(Default)]
struct InMemoryRemote {
    store: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl RemoteCachePort for InMemoryRemote {
    async fn get(&self, key: &str) -> ChronoResult<Option<Vec<u8>>> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> ChronoResult<()> {
        self.store.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ChronoResult<()> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> ChronoResult<bool> {
        Ok(self.store.lock().unwrap().contains_key(key))
    }

    async fn delete_pattern(&self, pattern: &str) -> ChronoResult<u64> {
        let prefix = pattern.trim_end_matches('*');
        let mut store = self.store.lock().unwrap();
        let matching: Vec<String> = store
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for k in &matching {
            store.remove(k);
        }
        Ok(matching.len() as u64)
    }

    async fn ping(&self) -> ChronoResult<bool> {
        Ok(true)
    }

    async fn info(&self) -> ChronoResult<RemoteInfo> {
        Ok(RemoteInfo {
            reachable: true,
            connected_clients: Some(1),
            used_memory_bytes: Some(self.store.lock().unwrap().len() as u64),
        })
    }
}

#[derive(Default)]
struct FailingRemote;

#[async_trait]
impl RemoteCachePort for FailingRemote {
    async fn get(&self, _key: &str) -> ChronoResult<Option<Vec<u8>>> {
        Err(ChronoError::unavailable("simulated outage"))
    }
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> ChronoResult<()> {
        Err(ChronoError::unavailable("simulated outage"))
    }
    async fn delete(&self, _key: &str) -> ChronoResult<()> {
        Ok(())
    }
    async fn exists(&self, _key: &str) -> ChronoResult<bool> {
        Ok(false)
    }
    async fn delete_pattern(&self, _pattern: &str) -> ChronoResult<u64> {
        Ok(0)
    }
    async fn ping(&self) -> ChronoResult<bool> {
        Ok(false)
    }
    async fn info(&self) -> ChronoResult<RemoteInfo> {
        Ok(RemoteInfo {
            reachable: false,
            connected_clients: None,
            used_memory_bytes: None,
        })
    }
}

fn build_state(remote: Arc<dyn RemoteCachePort>) -> AppState {
    let monitor = Arc::new(PerformanceMonitor::new(64));
    let cache = Arc::new(MultiTierCache::new(
        Arc::new(LocalCache::new(100)),
        remote,
        Arc::clone(&monitor),
        "integration_test",
    ));
    let warming = Arc::new(WarmingController::new(Arc::clone(&cache), 0.5));
    let provider = Arc::new(MockDataProvider::new());
    provider.seed("hot_stocks", "600000", b"{\"price\":10.5}".to_vec());
    provider.seed("hot_stocks", "000001", b"{\"price\":9.1}".to_vec());
    warming.register_namespace("hot_stocks", provider, Duration::from_secs(300));

    AppState {
        cache,
        warming,
        monitor,
        connections: Arc::new(ConnectionManager::new(16, Duration::from_secs(60))),
        stale_threshold: Duration::from_secs(5),
        version: "test".to_string(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn warm_then_stats_reflects_populated_entries() {
    let state = build_state(Arc::new(InMemoryRemote::default()));
    let app = create_router(state);

    let warm_request = Request::builder()
        .method("POST")
        .uri("/cache/warm")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "warm_hot_stocks": true }).to_string(),
        ))
        .unwrap();
    let warm_response = app.clone().oneshot(warm_request).await.unwrap();
    assert_eq!(warm_response.status(), StatusCode::OK);
    let warm_body = body_json(warm_response).await;
    assert_eq!(warm_body["succeeded"], 2);
    assert_eq!(warm_body["failed"], 0);

    let stats_request = Request::builder()
        .uri("/cache/stats")
        .body(Body::empty())
        .unwrap();
    let stats_response = app.oneshot(stats_request).await.unwrap();
    assert_eq!(stats_response.status(), StatusCode::OK);
    let stats_body = body_json(stats_response).await;
    assert_eq!(stats_body["total_keys"], 2);
    assert_eq!(stats_body["warming_stats"]["succeeded"], 2);
}

#[tokio::test]
async fn clear_all_removes_every_warmed_entry() {
    let state = build_state(Arc::new(InMemoryRemote::default()));
    let app = create_router(state.clone());

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cache/warm")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "warm_hot_stocks": true }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let clear_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cache/clear")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "clear_all": true }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(clear_response.status(), StatusCode::OK);
    assert!(!state.cache.exists("hot_stocks:600000").await);
}

#[tokio::test]
async fn refresh_skips_young_entries_and_refreshes_stale_ones() {
    let state = build_state(Arc::new(InMemoryRemote::default()));
    let app = create_router(state.clone());

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cache/warm")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "warm_hot_stocks": true }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let refresh_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cache/refresh")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "stock_codes": ["600000", "000001"] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(refresh_response.status(), StatusCode::OK);
    let refresh_body = body_json(refresh_response).await;
    // Both entries were just warmed, so neither has crossed the 5s
    // staleness threshold yet.
    assert_eq!(refresh_body["succeeded"], 0);
    assert_eq!(refresh_body["failed"], 0);
}

#[tokio::test]
async fn health_reports_degraded_when_remote_is_down() {
    let state = build_state(Arc::new(FailingRemote));
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/cache/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["redis_status"], "down");
}
