//! # Device Discovery
//!
//! Finds the panels that belong to this room.
//!
//! ## Lookup Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Discovery Sequence                              │
//! │                                                                         │
//! │  1. LocalIdentity::device_id()          → "Y2lzY29...ABC"              │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  2. GET /devices/{id}                   → { "workspaceId": "WS1" }     │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  3. GET /devices?workspaceId=WS1        → { "items": [...] }           │
//! │          │   (follows Link: rel="next")                                 │
//! │          ▼                                                              │
//! │  4. keep items where                                                   │
//! │       product contains "Cisco Room Navigator"                          │
//! │       AND type == "roomdesk"                                           │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  5. swap in the new set (only if every step succeeded)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure leaves the previously discovered set in place.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use beacon_core::DeviceDescriptor;

use crate::api_client::{encode_component, ApiClient};
use crate::config::DiscoverySettings;
use crate::error::DiscoveryError;
use crate::http::HttpResponse;

// =============================================================================
// Local Identity
// =============================================================================

/// Resolves the cloud id of the device this agent runs beside.
#[async_trait]
pub trait LocalIdentity: Send + Sync {
    async fn device_id(&self) -> Result<String, DiscoveryError>;
}

/// Identity taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    device_id: Option<String>,
}

impl StaticIdentity {
    pub fn new(device_id: Option<String>) -> Self {
        StaticIdentity {
            device_id: device_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

#[async_trait]
impl LocalIdentity for StaticIdentity {
    async fn device_id(&self) -> Result<String, DiscoveryError> {
        self.device_id.clone().ok_or_else(|| {
            DiscoveryError::LocalIdentity("discovery.local_device_id is not configured".into())
        })
    }
}

// =============================================================================
// Inventory Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceDetails {
    #[serde(default)]
    workspace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    items: Vec<InventoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryItem {
    id: String,
    #[serde(default)]
    product: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    display_name: Option<String>,
}

// =============================================================================
// Device Discovery
// =============================================================================

/// Sole owner of the discovered device set.
pub struct DeviceDiscovery {
    api: ApiClient,
    identity: Arc<dyn LocalIdentity>,
    settings: DiscoverySettings,
    devices: RwLock<Arc<[DeviceDescriptor]>>,
}

impl DeviceDiscovery {
    pub fn new(
        api: ApiClient,
        identity: Arc<dyn LocalIdentity>,
        settings: DiscoverySettings,
    ) -> Self {
        DeviceDiscovery {
            api,
            identity,
            settings,
            devices: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Current device set. Readers get an immutable snapshot.
    pub async fn devices(&self) -> Arc<[DeviceDescriptor]> {
        Arc::clone(&*self.devices.read().await)
    }

    /// Runs the full lookup chain and replaces the device set on success.
    pub async fn discover(&self) -> Result<Arc<[DeviceDescriptor]>, DiscoveryError> {
        let device_id = self.identity.device_id().await?;
        debug!(device_id = %device_id, "Resolving workspace of local device");

        let workspace_id = self.workspace_of(&device_id).await?;
        debug!(workspace_id = %workspace_id, "Listing workspace devices");

        let items = self.list_workspace(&workspace_id).await?;
        let inspected = items.len();

        let matched: Vec<DeviceDescriptor> = items
            .iter()
            .filter(|item| self.is_target(item))
            .map(|item| {
                DeviceDescriptor::new(
                    item.id.clone(),
                    item.display_name.clone().unwrap_or_else(|| item.id.clone()),
                )
            })
            .collect();

        if matched.is_empty() {
            warn!(
                inspected,
                target_product = %self.settings.target_product,
                target_type = %self.settings.target_type,
                "No matching panels in workspace"
            );
            for item in &items {
                debug!(product = %item.product, kind = %item.kind, id = %item.id, "Workspace device");
            }
            return Err(DiscoveryError::NoMatchingDevices { inspected });
        }

        let set: Arc<[DeviceDescriptor]> = Arc::from(matched);
        *self.devices.write().await = Arc::clone(&set);

        for device in set.iter() {
            debug!(device = %device, "Discovered panel");
        }
        info!(count = set.len(), inspected, "Device discovery complete");

        Ok(set)
    }

    fn is_target(&self, item: &InventoryItem) -> bool {
        item.product.contains(&self.settings.target_product)
            && item.kind == self.settings.target_type
    }

    async fn workspace_of(&self, device_id: &str) -> Result<String, DiscoveryError> {
        const STAGE: &str = "device";

        let path = format!("devices/{}", encode_component(device_id));
        let response = self
            .api
            .get(&path)
            .await
            .map_err(|source| DiscoveryError::Api {
                stage: STAGE,
                source,
            })?;
        let details: DeviceDetails = parse(STAGE, &response)?;

        details
            .workspace_id
            .filter(|ws| !ws.is_empty())
            .ok_or_else(|| DiscoveryError::MalformedResponse {
                stage: STAGE,
                reason: "device has no workspaceId".into(),
            })
    }

    async fn list_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<InventoryItem>, DiscoveryError> {
        const STAGE: &str = "workspace";

        let mut items = Vec::new();
        let mut next = Some(format!("devices?workspaceId={}", encode_component(workspace_id)));
        let mut pages = 0;

        while let Some(path) = next.take() {
            let response = self
                .api
                .get(&path)
                .await
                .map_err(|source| DiscoveryError::Api {
                    stage: STAGE,
                    source,
                })?;
            let page: DeviceList = parse(STAGE, &response)?;
            items.extend(page.items);
            pages += 1;

            next = response.header("link").and_then(next_link);
            if next.is_some() && pages >= self.settings.max_pages {
                warn!(pages, "Inventory page limit reached, ignoring remaining pages");
                break;
            }
        }

        Ok(items)
    }
}

fn parse<T: for<'de> Deserialize<'de>>(
    stage: &'static str,
    response: &HttpResponse,
) -> Result<T, DiscoveryError> {
    if !response.is_success() {
        return Err(DiscoveryError::Status {
            stage,
            status: response.status,
        });
    }

    serde_json::from_str(&response.body).map_err(|e| DiscoveryError::MalformedResponse {
        stage,
        reason: e.to_string(),
    })
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header.
///
/// Targets are read between `<` and `>` first, so commas inside a URL do not
/// split a link-value.
fn next_link(header: &str) -> Option<String> {
    let mut rest = header;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let close = after.find('>')?;
        let target = &after[..close];

        let tail = &after[close + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());
        let is_next = tail[..params_end].split(';').any(|p| {
            matches!(
                p.trim().trim_end_matches(',').trim_end(),
                "rel=\"next\"" | "rel=next"
            )
        });
        if is_next {
            return Some(target.to_string());
        }

        rest = &tail[params_end..];
    }

    None
}
