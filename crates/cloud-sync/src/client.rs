//! HTTP client for the ledgerline cloud transactions API.

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

use async_trait::async_trait;

use ledgerline_core::sync::{RemoteError, RemoteTransactionStore};
use ledgerline_core::transactions::TransactionPayload;

use crate::error::{CloudSyncError, Result};
use crate::types::{ApiErrorResponse, SuccessResponse, TransactionCreatedResponse};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Fallback base URL when the embedding app does not configure one.
pub const DEFAULT_API_BASE_URL: &str = "https://api.ledgerline.app";

/// Base URL from `LEDGERLINE_API_URL`, or the production default.
pub fn api_base_url_from_env() -> String {
    std::env::var("LEDGERLINE_API_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

/// Client for the ledgerline cloud transactions API.
#[derive(Debug, Clone)]
pub struct CloudSyncClient {
    client: reqwest::Client,
    base_url: String,
}

impl CloudSyncClient {
    /// Create a new cloud sync client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the cloud API (e.g., "https://api.ledgerline.app")
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Create headers for an API request.
    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| CloudSyncError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            // Try to parse error response
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(CloudSyncError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(CloudSyncError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            CloudSyncError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Create a remote transaction, returning the durable identifier.
    ///
    /// POST /api/v1/transactions
    pub async fn create_transaction(
        &self,
        token: &str,
        payload: &TransactionPayload,
    ) -> Result<TransactionCreatedResponse> {
        let url = format!("{}/api/v1/transactions", self.base_url);
        debug!("Creating remote transaction in category {}", payload.category);

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Replace a remote transaction's client payload.
    ///
    /// PATCH /api/v1/transactions/{id}
    pub async fn update_transaction(
        &self,
        token: &str,
        transaction_id: &str,
        payload: &TransactionPayload,
    ) -> Result<SuccessResponse> {
        let url = format!(
            "{}/api/v1/transactions/{}",
            self.base_url,
            urlencoding::encode(transaction_id)
        );

        let response = self
            .client
            .patch(&url)
            .headers(self.headers(token)?)
            .json(payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Delete a remote transaction.
    ///
    /// DELETE /api/v1/transactions/{id}
    pub async fn delete_transaction(
        &self,
        token: &str,
        transaction_id: &str,
    ) -> Result<SuccessResponse> {
        let url = format!(
            "{}/api/v1/transactions/{}",
            self.base_url,
            urlencoding::encode(transaction_id)
        );

        let response = self
            .client
            .delete(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

#[async_trait]
impl RemoteTransactionStore for CloudSyncClient {
    async fn create_transaction(
        &self,
        access_token: &str,
        payload: &TransactionPayload,
    ) -> std::result::Result<String, RemoteError> {
        let created = CloudSyncClient::create_transaction(self, access_token, payload).await?;
        Ok(created.id)
    }

    async fn update_transaction(
        &self,
        access_token: &str,
        remote_id: &str,
        payload: &TransactionPayload,
    ) -> std::result::Result<(), RemoteError> {
        CloudSyncClient::update_transaction(self, access_token, remote_id, payload).await?;
        Ok(())
    }

    async fn delete_transaction(
        &self,
        access_token: &str,
        remote_id: &str,
    ) -> std::result::Result<(), RemoteError> {
        CloudSyncClient::delete_transaction(self, access_token, remote_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    use ledgerline_core::sync::RetryClass;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        authorization: Option<String>,
        body: String,
    }

    fn sample_payload() -> TransactionPayload {
        TransactionPayload {
            amount: dec!(42.50),
            category: "groceries".to_string(),
            txn_date: "2026-03-14".to_string(),
            notes: None,
            payment_method: Some("card".to_string()),
        }
    }

    fn created_body(id: &str) -> String {
        format!(
            r#"{{"id":"{}","createdAt":"2026-03-14T10:00:00.000Z"}}"#,
            id
        )
    }

    fn api_error_body(code: &str, message: &str) -> String {
        format!(
            r#"{{"error":"error","code":"{}","message":"{}"}}"#,
            code, message
        )
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            authorization: headers.get("authorization").cloned(),
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            401 => "Unauthorized",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<(u16, String)>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted_clone);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);

                    let (status, body) = scripted_inner.lock().await.pop_front().unwrap_or((
                        500,
                        api_error_body("INTERNAL", "unexpected request"),
                    ));
                    let _ = write_http_response(&mut stream, status, &body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    #[tokio::test]
    async fn create_posts_payload_and_returns_remote_id() {
        let (base_url, captured, server) =
            start_mock_server(vec![(201, created_body("srv-1"))]).await;

        let client = CloudSyncClient::new(&base_url);
        let created = client
            .create_transaction("token-1", &sample_payload())
            .await
            .expect("create");

        assert_eq!(created.id, "srv-1");
        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .request_line
            .starts_with("POST /api/v1/transactions HTTP"));
        assert_eq!(
            requests[0].authorization.as_deref(),
            Some("Bearer token-1")
        );
        let body: serde_json::Value =
            serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body["txnDate"], "2026-03-14");
        assert_eq!(body["paymentMethod"], "card");
        assert_eq!(body["category"], "groceries");

        server.abort();
    }

    #[tokio::test]
    async fn update_percent_encodes_the_path_id() {
        let (base_url, captured, server) =
            start_mock_server(vec![(200, r#"{"success":true}"#.to_string())]).await;

        let client = CloudSyncClient::new(&base_url);
        let response = client
            .update_transaction("token-1", "doc/2026 a", &sample_payload())
            .await
            .expect("update");

        assert!(response.success);
        let requests = captured.lock().await.clone();
        assert!(requests[0]
            .request_line
            .starts_with("PATCH /api/v1/transactions/doc%2F2026%20a HTTP"));

        server.abort();
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_retry_class() {
        let (base_url, _captured, server) =
            start_mock_server(vec![(500, api_error_body("INTERNAL", "boom"))]).await;

        let client = CloudSyncClient::new(&base_url);
        let err = client
            .create_transaction("token-1", &sample_payload())
            .await
            .expect_err("should fail");

        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.retry_class(), RetryClass::Retryable);
        match &err {
            CloudSyncError::Api { message, .. } => {
                assert!(message.contains("INTERNAL"));
                assert!(message.contains("boom"));
            }
            other => panic!("expected API error, got {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn auth_failures_classify_as_reauth() {
        let (base_url, _captured, server) =
            start_mock_server(vec![(401, api_error_body("UNAUTHORIZED", "token expired"))]).await;

        let client = CloudSyncClient::new(&base_url);
        let err = client
            .delete_transaction("stale-token", "srv-1")
            .await
            .expect_err("should fail");

        assert_eq!(err.retry_class(), RetryClass::ReauthRequired);

        server.abort();
    }

    #[tokio::test]
    async fn remote_store_trait_maps_responses_and_errors() {
        let (base_url, captured, server) = start_mock_server(vec![
            (201, created_body("srv-9")),
            (400, api_error_body("VALIDATION", "bad category")),
        ])
        .await;

        let store: Arc<dyn RemoteTransactionStore> = Arc::new(CloudSyncClient::new(&base_url));
        let id = store
            .create_transaction("token-1", &sample_payload())
            .await
            .expect("create through trait");
        assert_eq!(id, "srv-9");

        let err = store
            .update_transaction("token-1", "srv-9", &sample_payload())
            .await
            .expect_err("should fail");
        assert_eq!(err.retry_class, RetryClass::Permanent);
        assert_eq!(err.error_code(), "http_400");

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[1]
            .request_line
            .starts_with("PATCH /api/v1/transactions/srv-9 HTTP"));

        server.abort();
    }
}
