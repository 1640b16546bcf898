//! HTTP collaborators.
//!
//! Both clients POST JSON and translate transport and status failures into
//! [`CollaboratorError`] so the classifier sees a uniform taxonomy.

use crate::classify::CollaboratorError;
use crate::collaborator::{
    GeneratedContent, GenerationRequest, Generator, PublishedRef, Publisher,
};
use crate::content::Artifact;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IDEMPOTENCY_KEY: &str = "Idempotency-Key";
const MAX_ERROR_BODY: usize = 512;

fn build_client(request_timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| CollaboratorError::Other(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport-level failure.
fn map_transport_error(error: reqwest::Error) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::Timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        CollaboratorError::Connection(format!("Connection error: {}", error))
    } else if error.is_decode() {
        CollaboratorError::MalformedResponse(format!("Failed to decode response: {}", error))
    } else {
        CollaboratorError::Other(format!("HTTP error: {}", error))
    }
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Map a non-success HTTP status.
pub fn map_status(status: StatusCode, headers: &HeaderMap, body: &str) -> CollaboratorError {
    let detail = if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{} ({}...)", status, &body[..end])
    } else if body.is_empty() {
        status.to_string()
    } else {
        format!("{} ({})", status, body)
    };

    match status.as_u16() {
        429 => {
            let hint = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            CollaboratorError::rate_limited(detail, hint)
        }
        401 => CollaboratorError::Authentication(detail),
        403 => CollaboratorError::PermissionDenied(detail),
        404 => CollaboratorError::NotFound(detail),
        400 | 422 => CollaboratorError::MalformedRequest(detail),
        408 => CollaboratorError::Timeout(detail),
        500..=599 => CollaboratorError::Unavailable(detail),
        _ => CollaboratorError::Other(detail),
    }
}

async fn post_json(
    client: &Client,
    endpoint: &str,
    api_key: Option<&str>,
    idempotency_key: String,
    payload: &serde_json::Value,
) -> Result<reqwest::Response, CollaboratorError> {
    let mut request = client
        .post(endpoint)
        .header(IDEMPOTENCY_KEY, idempotency_key)
        .json(payload);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request.send().await.map_err(map_transport_error)?;

    if !response.status().is_success() {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        return Err(map_status(status, &headers, &body));
    }
    Ok(response)
}

/// Generation backend reached over HTTP.
pub struct HttpGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(request_timeout)?,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError> {
        let payload = json!({
            "work_item_id": request.work_item_id,
            "payload_ref": request.payload_ref,
            "kind": request.kind,
            "category_id": request.taxonomy.category_id,
            "subcategory_id": request.taxonomy.subcategory_id,
            "attempt": request.attempt,
        });
        debug!(
            work_item_id = %request.work_item_id,
            endpoint = %self.endpoint,
            "Requesting generation"
        );
        let response = post_json(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            format!("{}:{}", request.work_item_id, request.attempt),
            &payload,
        )
        .await?;

        response.json::<GeneratedContent>().await.map_err(|e| {
            CollaboratorError::MalformedResponse(format!("Failed to parse generation response: {}", e))
        })
    }
}

/// Publish backend reached over HTTP. Sends the artifact id as the idempotency key.
pub struct HttpPublisher {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpPublisher {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(request_timeout)?,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct PublishResponse {
    reference: String,
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, artifact: &Artifact) -> Result<PublishedRef, CollaboratorError> {
        let payload = json!({
            "artifact_id": artifact.id,
            "kind": artifact.kind,
            "payload_ref": artifact.payload_ref,
            "category_id": artifact.taxonomy.category_id,
            "subcategory_id": artifact.taxonomy.subcategory_id,
            "body_digest": artifact.body_digest,
            "body": artifact.body,
        });
        debug!(artifact_id = %artifact.id, endpoint = %self.endpoint, "Publishing artifact");
        let response = post_json(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            artifact.id.to_string(),
            &payload,
        )
        .await?;

        let parsed: PublishResponse = response.json().await.map_err(|e| {
            CollaboratorError::MalformedResponse(format!("Failed to parse publish response: {}", e))
        })?;
        Ok(PublishedRef(parsed.reference))
    }
}
