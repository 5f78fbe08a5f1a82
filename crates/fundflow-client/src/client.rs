//! Fundflow HTTP client implementation.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use fundflow_core::{PageId, UserId};

use crate::batcher::AllocationWriter;
use crate::error::ClientError;
use crate::types::{
    AllocationRequest, AllocationResponse, AllocationWriteResponse, ApiErrorResponse,
    BudgetResponse, ListAllocationsResponse,
};

/// Fundflow API client.
///
/// Holds the service credentials. Calls on behalf of a funder go through
/// [`FundflowClient::for_user`].
#[derive(Debug, Clone)]
pub struct FundflowClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl FundflowClient {
    /// Create a new fundflow client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the fundflow service (e.g., `"http://fundflow:8080"`)
    /// * `api_key` - Service API key for authentication
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new fundflow client with custom options.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    /// Scope the client to one funder.
    #[must_use]
    pub fn for_user(&self, user_id: UserId) -> UserClient {
        UserClient {
            inner: self.clone(),
            user_id,
        }
    }

    fn request(&self, builder: RequestBuilder, user_id: UserId) -> RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .header("x-user-id", user_id.to_string())
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let details = api_error.error.details.as_ref();
                let detail = |key: &str| {
                    details
                        .and_then(|d| d.get(key))
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0)
                };

                match api_error.error.code.as_str() {
                    "insufficient_budget" => Err(ClientError::InsufficientBudget {
                        remaining_cents: detail("remaining_cents"),
                        requested_cents: detail("requested_cents"),
                    }),
                    "invalid_allocation" => Err(ClientError::InvalidAllocation {
                        current_cents: detail("current_cents"),
                        change_cents: detail("change_cents"),
                    }),
                    "cycle_not_open" => Err(ClientError::CycleNotOpen),
                    code => Err(ClientError::Api {
                        code: code.to_string(),
                        message: api_error.error.message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// A client acting for one funder.
#[derive(Debug, Clone)]
pub struct UserClient {
    inner: FundflowClient,
    user_id: UserId,
}

impl UserClient {
    /// The funder this client acts for.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Get the funder's budget for the open cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_budget(&self) -> Result<BudgetResponse, ClientError> {
        let url = format!("{}/v1/budget", self.inner.base_url);
        let response = self
            .inner
            .request(self.inner.client.get(&url), self.user_id)
            .send()
            .await?;

        FundflowClient::handle_response(response).await
    }

    /// List the funder's allocations for the open cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_allocations(&self) -> Result<ListAllocationsResponse, ClientError> {
        let url = format!("{}/v1/allocations", self.inner.base_url);
        let response = self
            .inner
            .request(self.inner.client.get(&url), self.user_id)
            .send()
            .await?;

        FundflowClient::handle_response(response).await
    }

    /// Get the funder's allocation to one page.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_allocation(&self, page_id: PageId) -> Result<AllocationResponse, ClientError> {
        let url = format!("{}/v1/allocations/{page_id}", self.inner.base_url);
        let response = self
            .inner
            .request(self.inner.client.get(&url), self.user_id)
            .send()
            .await?;

        FundflowClient::handle_response(response).await
    }

    /// Apply a signed allocation change.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientBudget`], [`ClientError::InvalidAllocation`]
    /// or [`ClientError::CycleNotOpen`] when the server rejects the change.
    pub async fn write_allocation(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationWriteResponse, ClientError> {
        let url = format!("{}/v1/allocations", self.inner.base_url);
        let response = self
            .inner
            .request(self.inner.client.post(&url), self.user_id)
            .json(request)
            .send()
            .await?;

        FundflowClient::handle_response(response).await
    }
}

#[async_trait]
impl AllocationWriter for UserClient {
    async fn write_allocation(
        &self,
        request: AllocationRequest,
    ) -> Result<AllocationWriteResponse, ClientError> {
        UserClient::write_allocation(self, &request).await
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundflow_core::{AllocationSource, SessionId};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn client_creation() {
        let client = FundflowClient::new("http://localhost:8080", "test-api-key").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = FundflowClient::new("http://localhost:8080/", "test-api-key").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn client_options() {
        let options = ClientOptions::with_service_name("reader-app");
        let client = FundflowClient::with_options("http://localhost:8080", "key", options).unwrap();
        assert_eq!(client.service_name, "reader-app");
    }

    fn request(page_id: PageId, change_cents: i64) -> AllocationRequest {
        AllocationRequest {
            page_id,
            change_cents,
            client_sequence: 1,
            session_id: Some(SessionId::generate()),
            source: AllocationSource::Direct,
        }
    }

    #[tokio::test]
    async fn write_allocation_sends_user_headers() {
        let server = MockServer::start().await;
        let user_id = UserId::generate();

        Mock::given(method("POST"))
            .and(path("/v1/allocations"))
            .and(header("x-api-key", "key"))
            .and(header("x-user-id", user_id.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "current_allocation": 300,
                "user_allocated_cents": 300,
                "total_budget_cents": 1000,
                "last_sequence": 1,
                "replayed": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = FundflowClient::new(server.uri(), "key").unwrap().for_user(user_id);
        let response = client
            .write_allocation(&request(PageId::generate(), 300))
            .await
            .unwrap();

        assert_eq!(response.current_allocation, 300);
        assert!(!response.replayed);
    }

    #[tokio::test]
    async fn insufficient_budget_maps_to_typed_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/allocations"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {
                    "code": "insufficient_budget",
                    "message": "Insufficient budget",
                    "details": { "remaining_cents": 400, "requested_cents": 500 }
                }
            })))
            .mount(&server)
            .await;

        let client = FundflowClient::new(server.uri(), "key")
            .unwrap()
            .for_user(UserId::generate());
        let err = client
            .write_allocation(&request(PageId::generate(), 500))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::InsufficientBudget {
                remaining_cents: 400,
                requested_cents: 500
            }
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/budget"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = FundflowClient::new(server.uri(), "key")
            .unwrap()
            .for_user(UserId::generate());
        let err = client.get_budget().await.unwrap_err();

        assert!(matches!(err, ClientError::Api { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cycle_not_open_maps_to_typed_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/allocations"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": "cycle_not_open", "message": "closed", "details": null }
            })))
            .mount(&server)
            .await;

        let client = FundflowClient::new(server.uri(), "key")
            .unwrap()
            .for_user(UserId::generate());
        let err = client
            .write_allocation(&request(PageId::generate(), 100))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::CycleNotOpen));
    }
}
