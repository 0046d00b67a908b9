use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pagewatch_core::models::Target;
use pagewatch_core::notify::{NotificationDispatcher, NotifierDefaults};
use pagewatch_core::proxy_pool::ProxyPool;
use pagewatch_core::scheduler::Scheduler;
use pagewatch_core::testutil::{MockChannelSender, MockFetcher};
use pagewatch_core::MemoryStorage;
use pagewatch_server::routes;
use pagewatch_server::state::{AppState, WatchScheduler};

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub scheduler: WatchScheduler<MockFetcher, MemoryStorage, MockChannelSender>,
    pub storage: MemoryStorage,
    pub fetcher: MockFetcher,
    pub sender: MockChannelSender,
    pub proxies: ProxyPool,
}

/// Router over in-memory storage, a mock fetcher and a mock channel sender.
pub fn setup_test_app(targets: Vec<Target>, fetcher: MockFetcher) -> TestApp {
    let storage = MemoryStorage::with_targets(targets);
    let sender = MockChannelSender::new();
    let defaults = NotifierDefaults {
        feishu_webhook: Some("https://feishu.test/hook".into()),
        ..Default::default()
    };
    let dispatcher = NotificationDispatcher::new(sender.clone(), defaults);
    let scheduler = Scheduler::new(fetcher.clone(), storage.clone(), dispatcher);
    let proxies = ProxyPool::default();

    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        proxies: proxies.clone(),
        api_key: TEST_API_KEY.to_string(),
    });

    TestApp {
        router: routes::router(state),
        scheduler,
        storage,
        fetcher,
        sender,
        proxies,
    }
}

impl TestApp {
    /// Authenticated request; `body` is sent as JSON when present.
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {TEST_API_KEY}"));
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
