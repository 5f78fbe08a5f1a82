//! Common test utilities for fundflow integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::{TestRequest, TestServer};
use chrono::Utc;
use serde_json::json;

use fundflow_core::{
    LocalSubscription, Month, PageId, ProcessorSubscription, SubscriptionStatus, UserId,
};
use fundflow_service::{create_router, AppState, PaymentProcessor, ServiceConfig, StripeError};
use fundflow_store::{MemoryStore, Store};

/// Payment processor returning whatever the test configured.
#[derive(Default)]
pub struct FakeProcessor {
    subscriptions: Mutex<Vec<ProcessorSubscription>>,
}

impl FakeProcessor {
    /// Replace the processor's subscriptions.
    pub fn set(&self, subscriptions: Vec<ProcessorSubscription>) {
        *self.subscriptions.lock().unwrap() = subscriptions;
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn list_subscriptions(&self) -> Result<Vec<ProcessorSubscription>, StripeError> {
        Ok(self.subscriptions.lock().unwrap().clone())
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for seeding and inspection.
    pub store: Arc<MemoryStore>,
    /// The fake payment processor.
    pub processor: Arc<FakeProcessor>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh store and a fake processor.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Create a harness with no payment processor configured.
    pub fn without_processor() -> Self {
        Self::build(false)
    }

    fn build(with_processor: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(FakeProcessor::default());

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            ..ServiceConfig::default()
        };

        let state = if with_processor {
            AppState::with_processor(store.clone(), config, processor.clone())
        } else {
            AppState::new(store.clone(), config)
        };
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            processor,
            test_user_id: UserId::generate(),
            service_api_key,
            admin_api_key,
        }
    }

    /// Authenticate a request as `user_id`.
    pub fn as_user(&self, request: TestRequest, user_id: UserId) -> TestRequest {
        request
            .add_header(header("x-api-key"), value(&self.service_api_key))
            .add_header(header("x-user-id"), value(&user_id.to_string()))
    }

    /// Authenticate a request as the content service.
    pub fn as_service(&self, request: TestRequest) -> TestRequest {
        request
            .add_header(header("x-api-key"), value(&self.service_api_key))
            .add_header(header("x-service-name"), value("content"))
    }

    /// Authenticate a request as an admin.
    pub fn as_admin(&self, request: TestRequest) -> TestRequest {
        request
            .add_header(header("x-admin-key"), value(&self.admin_api_key))
            .add_header(header("x-admin-id"), value("test-admin"))
    }

    /// Record an active subscription for a user.
    pub fn seed_subscription(&self, user_id: UserId, amount_cents: i64) {
        self.store
            .put_subscription(&LocalSubscription {
                user_id,
                amount_cents,
                status: SubscriptionStatus::Active,
                processor_subscription_id: Some(format!("sub_{user_id}")),
                updated_at: Utc::now(),
            })
            .expect("Failed to seed subscription");
    }

    /// Open a cycle through the admin API.
    pub async fn open_cycle(&self, month: Month) {
        self.as_admin(self.server.post("/v1/admin/cycles"))
            .json(&json!({ "month": month.to_string() }))
            .await
            .assert_status_ok();
    }

    /// Register a writer-owned page through the service API.
    pub async fn register_writer_page(&self, writer_id: UserId) -> PageId {
        let page_id = PageId::generate();
        self.as_service(self.server.post("/v1/pages"))
            .json(&json!({
                "page_id": page_id,
                "owner": { "type": "writer", "writer_id": writer_id }
            }))
            .await
            .assert_status_ok();
        page_id
    }

    /// Allocate through the user API, returning the raw response.
    pub async fn allocate(
        &self,
        user_id: UserId,
        page_id: PageId,
        change_cents: i64,
        client_sequence: u64,
    ) -> axum_test::TestResponse {
        self.as_user(self.server.post("/v1/allocations"), user_id)
            .json(&json!({
                "page_id": page_id,
                "change_cents": change_cents,
                "client_sequence": client_sequence,
                "source": "direct"
            }))
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A month whose deadline has long passed.
pub fn past_month() -> Month {
    Month::new(2020, 1).expect("valid month")
}

fn header(name: &'static str) -> HeaderName {
    HeaderName::from_static(name)
}

fn value(raw: &str) -> HeaderValue {
    HeaderValue::from_str(raw).expect("valid header value")
}
