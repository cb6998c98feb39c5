//! # API Client
//!
//! Bearer-authenticated calls to the cloud API with one transparent
//! re-authentication.
//!
//! ## Status Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1 (current access token)                                      │
//! │     │                                                                   │
//! │     ├── not 401 ──────────────────────────────► return response as-is  │
//! │     │                                                                   │
//! │     └── 401 ──► TokenAuthority::refresh_after_unauthorized              │
//! │                    │                                                    │
//! │                    ├── Err ──► ApiError::Unauthorized (terminal)        │
//! │                    │                                                    │
//! │                    └── Ok ──► attempt 2 (new token) ──► return as-is   │
//! │                                                                         │
//! │  At most 2 HTTP attempts and 1 refresh per call, whatever attempt 2    │
//! │  answers.                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::token_authority::TokenAuthority;

const JSON: &str = "application/json";
const JSON_PATCH: &str = "application/json-patch+json";

/// Cloud API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    authority: TokenAuthority,
    base_url: String,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        authority: TokenAuthority,
        base_url: impl Into<String>,
    ) -> Self {
        ApiClient {
            transport,
            authority,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    /// Issues one logical request.
    ///
    /// `path` is joined onto the base URL unless it is already an absolute
    /// `http(s)://` URL. `is_patch` selects the JSON-Patch content type.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        is_patch: bool,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.resolve(path)?;
        let body = body.map(Value::to_string);
        let content_type = if is_patch { JSON_PATCH } else { JSON };

        let access = self.authority.access_token().await;
        let response = self
            .send(method, &url, content_type, body.clone(), &access)
            .await?;

        if response.status != 401 {
            return Ok(response);
        }

        warn!(method = %method, url = %url, "Unauthorized, refreshing access token");

        let pair = self
            .authority
            .refresh_after_unauthorized(&access)
            .await
            .map_err(|source| ApiError::Unauthorized { source })?;

        let retry = self
            .send(method, &url, content_type, body, &pair.access_token)
            .await?;

        if retry.status == 401 {
            warn!(url = %url, "Still unauthorized after token refresh");
        }

        Ok(retry)
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Get, path, None, false).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Post, path, Some(body), false)
            .await
    }

    pub async fn patch_json(&self, path: &str, body: &Value) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Patch, path, Some(body), true)
            .await
    }

    fn resolve(&self, path: &str) -> Result<String, ApiError> {
        let candidate = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        };

        url::Url::parse(&candidate)
            .map_err(|e| ApiError::InvalidUrl(format!("{candidate}: {e}")))?;
        Ok(candidate)
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        content_type: &str,
        body: Option<String>,
        access: &str,
    ) -> Result<HttpResponse, ApiError> {
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {access}")),
                ("Content-Type".to_string(), content_type.to_string()),
                ("Accept".to_string(), JSON.to_string()),
            ],
            body,
        };

        let response = self.transport.execute(request).await?;
        debug!(method = %method, url = %url, status = response.status, "API call");
        Ok(response)
    }
}

/// Percent-encodes a value for a path segment or query string.
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
