use crate::core::config::ConfigError;
use crate::core::errors::KristError;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{instrument, trace};

/// REST client trait for making HTTP requests
///
/// Implementations only move JSON; mapping the service's error bodies to
/// typed errors is done here so every caller sees the same `KristError`.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Make a GET request
    ///
    /// # Arguments
    /// * `endpoint` - The API endpoint path
    /// * `query_params` - Query parameters as key-value pairs
    ///
    /// # Returns
    /// The response body as a JSON value
    async fn get(&self, endpoint: &str, query_params: &[(&str, &str)])
        -> Result<Value, KristError>;

    /// Make a GET request with strongly-typed response
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, KristError>;

    /// Make a POST request
    ///
    /// # Arguments
    /// * `endpoint` - The API endpoint path
    /// * `body` - Request body as JSON value
    ///
    /// # Returns
    /// The response body as a JSON value
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, KristError>;

    /// Make a POST request with strongly-typed response
    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<T, KristError>;
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    /// Create a new configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the API, without a trailing slash
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_seconds: 30,
            user_agent: format!("kristlink/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self { config }
    }

    /// Build the REST client
    pub fn build(self) -> Result<ReqwestRest, KristError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ConfigError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone, Debug)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
}

impl ReqwestRest {
    pub fn new(base_url: String) -> Result<Self, KristError> {
        RestClientBuilder::new(RestClientConfig::new(base_url)).build()
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Build the full URL for an endpoint
    fn build_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    /// Handle the response and extract JSON
    #[instrument(skip(self, response), fields(base_url = %self.config.base_url, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, KristError> {
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| KristError::NetworkError(format!("Failed to read response body: {}", e)))?;

        trace!("Response body: {}", response_text);

        interpret_body(status.as_u16(), status.is_success(), &response_text)
    }

    #[instrument(skip(self, body), fields(base_url = %self.config.base_url, method = %method, endpoint = %endpoint))]
    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Value, KristError> {
        let url = self.build_url(endpoint);
        let mut request = self.client.request(method, &url);

        for (key, value) in query_params {
            request = request.query(&[(key, value)]);
        }

        if !body.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body.to_vec());
        }

        let response = request
            .send()
            .await
            .map_err(|e| KristError::NetworkError(format!("Request failed: {}", e)))?;

        self.handle_response(response).await
    }
}

/// Turn a response body into JSON, mapping Krist error bodies to `KristError::Server`
///
/// Krist answers `{"ok": false, "error": "<code>", ...}` both with error
/// statuses and, for some endpoints, with 200.
fn interpret_body(status: u16, success: bool, body: &str) -> Result<Value, KristError> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            if value.get("ok").and_then(Value::as_bool) == Some(false) {
                let code = value
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_error");
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Err(KristError::server(code, message));
            }
            if success {
                Ok(value)
            } else {
                Err(KristError::ApiError {
                    code: i32::from(status),
                    message: body.to_string(),
                })
            }
        }
        Err(e) if success => Err(KristError::DeserializationError(format!(
            "Failed to parse JSON response: {}",
            e
        ))),
        Err(_) => Err(KristError::ApiError {
            code: i32::from(status),
            message: body.to_string(),
        }),
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, KristError> {
    serde_json::from_value(value)
        .map_err(|e| KristError::DeserializationError(format!("Failed to deserialize JSON: {}", e)))
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Value, KristError> {
        self.make_request(Method::GET, endpoint, query_params, &[])
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, KristError> {
        self.make_request(Method::GET, endpoint, query_params, &[])
            .await
            .and_then(from_value)
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, KristError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| {
            KristError::SerializationError(format!("Failed to serialize request body: {}", e))
        })?;

        self.make_request(Method::POST, endpoint, &[], &body_bytes)
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<T, KristError> {
        self.post(endpoint, body).await.and_then(from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ServerErrorCode;

    #[test]
    fn test_base_url_is_normalized() {
        let rest = ReqwestRest::new("https://krist.dev/".to_string()).unwrap();
        assert_eq!(rest.base_url(), "https://krist.dev");
        assert_eq!(rest.build_url("/ws/start"), "https://krist.dev/ws/start");
    }

    #[test]
    fn test_success_body_passes_through() {
        let value = interpret_body(200, true, r#"{"ok": true, "url": "wss://x"}"#).unwrap();
        assert_eq!(value["url"], "wss://x");
    }

    #[test]
    fn test_krist_error_body_maps_to_server_error() {
        let err = interpret_body(
            404,
            false,
            r#"{"ok": false, "error": "address_not_found", "message": "Address not found"}"#,
        )
        .unwrap_err();
        assert_eq!(err.server_code(), Some(&ServerErrorCode::AddressNotFound));
    }

    #[test]
    fn test_non_json_error_maps_to_api_error() {
        match interpret_body(502, false, "Bad Gateway") {
            Err(KristError::ApiError { code, message }) => {
                assert_eq!(code, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_on_success_is_deserialization_error() {
        assert!(matches!(
            interpret_body(200, true, "not json"),
            Err(KristError::DeserializationError(_))
        ));
    }
}
