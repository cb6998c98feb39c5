//! # Token Authority
//!
//! Owns the in-memory token pair and the OAuth refresh-token grant.
//!
//! ## Refresh Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      401 → Refresh → Retry                              │
//! │                                                                         │
//! │  ApiClient A ──401──┐                                                  │
//! │                     ├──► refresh_after_unauthorized(stale_access)      │
//! │  ApiClient B ──401──┘            │                                      │
//! │                                  │ current.access != stale?             │
//! │                                  ├── yes ──► return current pair        │
//! │                                  │                                      │
//! │                                  │ refresh already in flight?           │
//! │                                  ├── yes ──► await the same future      │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │                 POST token_url (grant_type=refresh_token)              │
//! │                                  │                                      │
//! │                  ┌───────────────┴────────────────┐                    │
//! │                  ▼ ok                              ▼ err                │
//! │        install pair in memory             pair untouched,              │
//! │        persist via TokenStore             every waiter gets the        │
//! │        (failure only logged)              same RefreshError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The token pair is replaced wholesale under a write lock, so readers never
//! see an access token from one grant paired with a refresh token from
//! another.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use beacon_core::TokenPair;

use crate::config::CloudSettings;
use crate::error::RefreshError;
use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::token_store::TokenStore;

type RefreshFuture = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

/// Body of a successful refresh grant.
#[derive(Debug, Deserialize)]
struct GrantResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth client credentials and endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl From<&CloudSettings> for OAuthClient {
    fn from(cloud: &CloudSettings) -> Self {
        OAuthClient {
            token_url: cloud.token_url.clone(),
            client_id: cloud.client_id.clone(),
            client_secret: cloud.client_secret.clone(),
        }
    }
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    client: OAuthClient,
    current: RwLock<TokenPair>,
    inflight: Mutex<Option<RefreshFuture>>,
}

/// Cloneable handle; all clones share one token pair.
#[derive(Clone)]
pub struct TokenAuthority {
    inner: Arc<Inner>,
}

impl TokenAuthority {
    /// Creates the authority with the pair from `store`, or `bootstrap` if
    /// nothing usable is stored.
    pub async fn load(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        client: OAuthClient,
        bootstrap: TokenPair,
    ) -> Self {
        let pair = store.load(bootstrap).await;
        Self::with_pair(transport, store, client, pair)
    }

    pub fn with_pair(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        client: OAuthClient,
        pair: TokenPair,
    ) -> Self {
        TokenAuthority {
            inner: Arc::new(Inner {
                transport,
                store,
                client,
                current: RwLock::new(pair),
                inflight: Mutex::new(None),
            }),
        }
    }

    /// Snapshot of the current pair.
    pub async fn current(&self) -> TokenPair {
        self.inner.current.read().await.clone()
    }

    pub async fn access_token(&self) -> String {
        self.inner.current.read().await.access_token.clone()
    }

    /// Runs one refresh-token grant. Mutates nothing.
    pub async fn refresh(&self, old_refresh: &str) -> Result<TokenPair, RefreshError> {
        self.inner.refresh(old_refresh).await
    }

    /// Refreshes after a 401 seen with `stale_access`.
    ///
    /// Concurrent callers share one grant. If the pair has already moved on
    /// from `stale_access`, the current pair is returned without a grant.
    pub async fn refresh_after_unauthorized(
        &self,
        stale_access: &str,
    ) -> Result<TokenPair, RefreshError> {
        let refresh = {
            let mut inflight = self.inner.inflight.lock().await;

            let current = self.inner.current.read().await.clone();
            if current.access_token != stale_access {
                debug!("Token already refreshed by another caller");
                return Ok(current);
            }

            match inflight.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let old_refresh = current.refresh_token;
                    let fut = async move { inner.refresh_and_install(&old_refresh).await }
                        .boxed()
                        .shared();
                    *inflight = Some(fut.clone());
                    fut
                }
            }
        };

        let result = refresh.clone().await;

        let mut inflight = self.inner.inflight.lock().await;
        if inflight.as_ref().map_or(false, |f| f.ptr_eq(&refresh)) {
            *inflight = None;
        }

        result
    }
}

impl Inner {
    async fn refresh(&self, old_refresh: &str) -> Result<TokenPair, RefreshError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("client_id", &self.client.client_id)
            .append_pair("client_secret", &self.client.client_secret)
            .append_pair("refresh_token", old_refresh)
            .finish();

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.client.token_url.clone(),
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        };

        let response = self.transport.execute(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Token refresh rejected");
            return Err(RefreshError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        let grant: GrantResponse = serde_json::from_str(&response.body)
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;

        let access = grant
            .access_token
            .filter(|a| !a.is_empty())
            .ok_or(RefreshError::MissingAccessToken)?;

        let rotated = grant.refresh_token.as_deref().map_or(false, |r| !r.is_empty());
        let previous = TokenPair::new(String::new(), old_refresh);
        let pair = previous.rotate(access, grant.refresh_token);

        debug!(refresh_rotated = rotated, "Token refresh grant succeeded");
        Ok(pair)
    }

    async fn refresh_and_install(&self, old_refresh: &str) -> Result<TokenPair, RefreshError> {
        let pair = self.refresh(old_refresh).await?;

        *self.current.write().await = pair.clone();
        info!("Access token refreshed");

        if let Err(e) = self.store.save(&pair).await {
            warn!(
                retryable = e.is_retryable(),
                error = %e,
                "Failed to persist refreshed token pair"
            );
        }

        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::HttpResponse;
    use crate::test_support::FakeTransport;
    use crate::token_store::MemoryTokenStore;
    use std::time::Duration;

    fn client() -> OAuthClient {
        OAuthClient {
            token_url: "https://auth.test/access_token".into(),
            client_id: "cid".into(),
            client_secret: "secret".into(),
        }
    }

    fn authority(transport: Arc<FakeTransport>, store: Arc<MemoryTokenStore>) -> TokenAuthority {
        TokenAuthority::with_pair(transport, store, client(), TokenPair::new("A0", "R0"))
    }

    #[tokio::test]
    async fn test_refresh_sends_form_grant() {
        let transport =
            FakeTransport::new(|_| Ok(HttpResponse::new(200, r#"{"access_token":"A1"}"#)));
        let auth = authority(transport.clone(), Arc::new(MemoryTokenStore::new()));

        auth.refresh("R0").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(
            requests[0].header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        let body = requests[0].body.as_deref().unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("client_id=cid"));
        assert!(body.contains("refresh_token=R0"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_when_omitted() {
        let transport =
            FakeTransport::new(|_| Ok(HttpResponse::new(200, r#"{"access_token":"A1"}"#)));
        let auth = authority(transport, Arc::new(MemoryTokenStore::new()));

        let pair = auth.refresh("R0").await.unwrap();
        assert_eq!(pair.access_token, "A1");
        assert_eq!(pair.refresh_token, "R0");

        // Pure grant: the authority's own pair is unchanged.
        assert_eq!(auth.access_token().await, "A0");
    }

    #[tokio::test]
    async fn test_refresh_takes_rotated_refresh() {
        let transport = FakeTransport::new(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"access_token":"A1","refresh_token":"R1","expires_in":1209599}"#,
            ))
        });
        let auth = authority(transport, Arc::new(MemoryTokenStore::new()));

        let pair = auth.refresh("R0").await.unwrap();
        assert_eq!(pair.refresh_token, "R1");
    }

    async fn failed_refresh(reply: Result<HttpResponse, TransportError>) -> RefreshError {
        let transport = FakeTransport::new(move |_| reply.clone());
        let store = Arc::new(MemoryTokenStore::new());
        let auth = authority(transport, store.clone());

        let err = auth.refresh_after_unauthorized("A0").await.unwrap_err();

        // Failed grants leave both the in-memory and stored pair alone.
        assert_eq!(auth.current().await.access_token, "A0");
        assert_eq!(store.raw().await, None);
        err
    }

    #[tokio::test]
    async fn test_refresh_errors_never_yield_partial_pairs() {
        let err = failed_refresh(Ok(HttpResponse::new(400, "invalid_grant"))).await;
        assert!(matches!(err, RefreshError::Rejected { status: 400, .. }));

        let err = failed_refresh(Ok(HttpResponse::new(200, "<html>"))).await;
        assert!(matches!(err, RefreshError::MalformedResponse(_)));

        let err = failed_refresh(Ok(HttpResponse::new(200, r#"{"refresh_token":"R9"}"#))).await;
        assert_eq!(err, RefreshError::MissingAccessToken);

        let err = failed_refresh(Err(TransportError::Timeout)).await;
        assert_eq!(err, RefreshError::Transport(TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_refresh_after_unauthorized_installs_and_persists() {
        let transport =
            FakeTransport::new(|_| Ok(HttpResponse::new(200, r#"{"access_token":"A1"}"#)));
        let store = Arc::new(MemoryTokenStore::new());
        let auth = authority(transport, store.clone());

        let pair = auth.refresh_after_unauthorized("A0").await.unwrap();
        assert_eq!(pair.access_token, "A1");
        assert_eq!(auth.access_token().await, "A1");

        let raw = store.raw().await.unwrap();
        assert!(raw.contains("\"access\":\"A1\""));
        assert!(raw.contains("\"refresh\":\"R0\""));
    }

    #[tokio::test]
    async fn test_stale_caller_skips_refresh() {
        let transport =
            FakeTransport::new(|_| Ok(HttpResponse::new(200, r#"{"access_token":"A1"}"#)));
        let auth = authority(transport.clone(), Arc::new(MemoryTokenStore::new()));

        auth.refresh_after_unauthorized("A0").await.unwrap();
        let pair = auth.refresh_after_unauthorized("A0").await.unwrap();

        assert_eq!(pair.access_token, "A1");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_share_one_refresh() {
        let transport = FakeTransport::with_latency(Duration::from_millis(50), |_| {
            Ok(HttpResponse::new(200, r#"{"access_token":"A1"}"#))
        });
        let auth = authority(transport.clone(), Arc::new(MemoryTokenStore::new()));

        let (a, b, c) = tokio::join!(
            auth.refresh_after_unauthorized("A0"),
            auth.refresh_after_unauthorized("A0"),
            auth.refresh_after_unauthorized("A0"),
        );

        assert_eq!(a.unwrap().access_token, "A1");
        assert_eq!(b.unwrap().access_token, "A1");
        assert_eq!(c.unwrap().access_token, "A1");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_share_one_error() {
        let transport = FakeTransport::with_latency(Duration::from_millis(50), |_| {
            Ok(HttpResponse::new(401, "expired refresh token"))
        });
        let auth = authority(transport.clone(), Arc::new(MemoryTokenStore::new()));

        let (a, b) = tokio::join!(
            auth.refresh_after_unauthorized("A0"),
            auth.refresh_after_unauthorized("A0"),
        );

        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(transport.requests().len(), 1);
    }
}
