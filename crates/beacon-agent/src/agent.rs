//! # Beacon Agent
//!
//! Wires the orchestration components together and routes local events.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          BeaconAgent::start                             │
//! │                                                                         │
//! │  HttpTransport ──┬──► TokenAuthority ◄── TokenStore (SQLite kv_store)  │
//! │                  │          │                                           │
//! │                  └──► ApiClient                                         │
//! │                          │                                              │
//! │           ┌──────────────┼───────────────────┐                          │
//! │           ▼              ▼                   ▼                          │
//! │   DeviceDiscovery   PanelCommands   BroadcastController                 │
//! │           │              │                   │                          │
//! │           └──────────────┴─────────┬─────────┘                          │
//! │                                    ▼                                    │
//! │                           LedSessionMachine                             │
//! │                                    ▲                                    │
//! │  LocalEvent ──► AgentHandle::handle_event                               │
//! │                   • prompt containing hold phrase ──► hold              │
//! │                   • room-in-use True/False       ──► occupancy          │
//! │                   • any other prompt             ──► ignored            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed initial discovery is logged, not fatal. The first hold will
//! retry it.

use std::sync::Arc;
use tracing::{debug, info, warn};

use beacon_core::{LedSession, LocalEvent};
use beacon_db::Database;

use crate::api_client::ApiClient;
use crate::broadcast::BroadcastController;
use crate::config::AgentConfig;
use crate::discovery::{DeviceDiscovery, LocalIdentity, StaticIdentity};
use crate::error::{AgentError, AgentResult};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::panel::PanelCommands;
use crate::session::{LedSessionMachine, SessionHandle};
use crate::token_authority::{OAuthClient, TokenAuthority};
use crate::token_store::{DbTokenStore, TokenStore};

// =============================================================================
// Beacon Agent
// =============================================================================

/// Unstarted agent: configuration plus its external seams.
pub struct BeaconAgent {
    config: AgentConfig,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    identity: Arc<dyn LocalIdentity>,
}

impl BeaconAgent {
    /// Creates an agent talking to the real cloud and persisting tokens in `db`.
    pub fn new(config: AgentConfig, db: &Database) -> AgentResult<Self> {
        config.validate()?;

        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        let store = Arc::new(DbTokenStore::new(db.kv(), config.storage.token_key.clone()));
        let identity = Arc::new(StaticIdentity::new(
            config.discovery.local_device_id.clone(),
        ));

        Ok(Self::with_parts(config, transport, store, identity))
    }

    /// Creates an agent from explicit seams.
    pub fn with_parts(
        config: AgentConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        identity: Arc<dyn LocalIdentity>,
    ) -> Self {
        BeaconAgent {
            config,
            transport,
            store,
            identity,
        }
    }

    /// Loads tokens, runs the initial discovery and spawns the session machine.
    pub async fn start(self) -> AgentResult<AgentHandle> {
        let BeaconAgent {
            config,
            transport,
            store,
            identity,
        } = self;

        info!(
            base_url = %config.cloud.base_url,
            local_device_id = ?config.discovery.local_device_id,
            target_product = %config.discovery.target_product,
            "Starting beacon agent"
        );

        let authority = TokenAuthority::load(
            Arc::clone(&transport),
            store,
            OAuthClient::from(&config.cloud),
            config.bootstrap_tokens(),
        )
        .await;

        let api = ApiClient::new(transport, authority, config.cloud.base_url.clone());
        let discovery = Arc::new(DeviceDiscovery::new(
            api.clone(),
            identity,
            config.discovery.clone(),
        ));

        match discovery.discover().await {
            Ok(devices) => info!(devices = devices.len(), "Initial discovery complete"),
            Err(e) => {
                let e = AgentError::from(e);
                warn!(
                    retryable = e.is_retryable(),
                    error = %e,
                    "Initial discovery failed, will retry on first hold"
                );
            }
        }

        let broadcaster = Arc::new(BroadcastController::new(
            Arc::clone(&discovery),
            &config.broadcast,
        ));
        let session = LedSessionMachine::new(
            broadcaster,
            PanelCommands::new(api),
            config.session.clone(),
        )
        .start();

        info!("Beacon agent started");

        Ok(AgentHandle {
            hold_phrase: config.session.hold_phrase.clone(),
            discovery,
            session,
        })
    }
}

// =============================================================================
// Agent Handle
// =============================================================================

/// Handle for feeding events to a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    hold_phrase: String,
    discovery: Arc<DeviceDiscovery>,
    session: SessionHandle,
}

impl AgentHandle {
    /// Routes one local event to the session machine.
    pub async fn handle_event(&self, event: LocalEvent) -> AgentResult<()> {
        if event.is_hold(&self.hold_phrase) {
            return self.session.hold().await;
        }

        match event {
            LocalEvent::OccupancyChanged { occupied } => self.session.occupancy(occupied).await,
            LocalEvent::PromptDisplayed { text } => {
                debug!(text = %text, "Prompt is not a hold notification");
                Ok(())
            }
        }
    }

    /// Re-runs discovery. Returns the size of the new device set.
    pub async fn rediscover(&self) -> AgentResult<usize> {
        let devices = self.discovery.discover().await?;
        Ok(devices.len())
    }

    pub async fn revert_now(&self) -> AgentResult<()> {
        self.session.revert_now().await
    }

    /// Current session snapshot.
    pub fn session(&self) -> LedSession {
        self.session.snapshot()
    }

    pub fn session_handle(&self) -> &SessionHandle {
        &self.session
    }

    pub async fn shutdown(&self) -> AgentResult<()> {
        info!("Shutting down beacon agent");
        self.session.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};
    use crate::test_support::FakeTransport;
    use crate::token_store::MemoryTokenStore;
    use beacon_core::SessionPhase;
    use beacon_db::DbConfig;
    use std::time::Duration;

    const INVENTORY: &str = r#"{"items": [
        {"id": "NAV1", "product": "Cisco Room Navigator", "type": "roomdesk", "displayName": "Door A"},
        {"id": "NAV2", "product": "Cisco Room Navigator", "type": "roomdesk", "displayName": "Door B"},
        {"id": "BOARD", "product": "Cisco Board Pro", "type": "roomdesk", "displayName": "Board"}
    ]}"#;

    fn cloud(r: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if r.url.ends_with("/devices/LOCAL") {
            Ok(HttpResponse::new(200, r#"{"workspaceId":"WS1"}"#))
        } else if r.url.contains("workspaceId=WS1") {
            Ok(HttpResponse::new(200, INVENTORY))
        } else {
            Ok(HttpResponse::new(204, ""))
        }
    }

    fn config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.cloud.base_url = "https://api.test/v1".into();
        config.cloud.client_id = "cid".into();
        config.cloud.client_secret = "secret".into();
        config.cloud.access_token = "A0".into();
        config.cloud.refresh_token = "R0".into();
        config
    }

    async fn start(transport: Arc<FakeTransport>, local: Option<&str>) -> AgentHandle {
        BeaconAgent::with_parts(
            config(),
            transport,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(StaticIdentity::new(local.map(String::from))),
        )
        .start()
        .await
        .unwrap()
    }

    fn hold_prompt() -> LocalEvent {
        LocalEvent::PromptDisplayed {
            text: "Someone has put this room on hold".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_prompt_activates_discovered_panels() {
        let transport = FakeTransport::new(cloud);
        let agent = start(transport.clone(), Some("LOCAL")).await;

        agent.handle_event(hold_prompt()).await.unwrap();
        agent
            .session_handle()
            .wait_until(|s| s.phase == SessionPhase::Active)
            .await
            .unwrap();

        assert_eq!(transport.count_body(HttpMethod::Patch, "\"Manual\""), 2);
        assert_eq!(transport.count_url("LedControl.Color.Set"), 2);
        assert_eq!(transport.count_body(HttpMethod::Post, "\"BOARD\""), 0);
        assert!(agent.session().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_prompts_are_ignored() {
        let transport = FakeTransport::new(cloud);
        let agent = start(transport.clone(), Some("LOCAL")).await;
        transport.clear();

        agent
            .handle_event(LocalEvent::PromptDisplayed {
                text: "Meeting starts in 5 minutes".into(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(agent.session().is_idle());
        assert_eq!(agent.session().generation, 0);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_occupancy_event_reverts_active_session() {
        let transport = FakeTransport::new(cloud);
        let agent = start(transport.clone(), Some("LOCAL")).await;

        agent.handle_event(hold_prompt()).await.unwrap();
        agent
            .session_handle()
            .wait_until(|s| s.phase == SessionPhase::Active)
            .await
            .unwrap();

        agent
            .handle_event(LocalEvent::parse_line("room-in-use True").unwrap())
            .await
            .unwrap();
        agent
            .session_handle()
            .wait_until(|s| s.is_idle())
            .await
            .unwrap();

        assert_eq!(transport.count_body(HttpMethod::Patch, "\"Auto\""), 2);
    }

    #[tokio::test]
    async fn test_start_survives_failed_discovery() {
        let agent = start(FakeTransport::new(cloud), None).await;
        assert!(agent.session().is_idle());

        let err = agent.rediscover().await.unwrap_err();
        assert!(matches!(err, AgentError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_rediscover_counts_matching_panels() {
        let agent = start(FakeTransport::new(cloud), Some("LOCAL")).await;
        assert_eq!(agent.rediscover().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let agent = start(FakeTransport::new(cloud), Some("LOCAL")).await;
        agent.shutdown().await.unwrap();

        let mut rx = agent.session_handle().subscribe();
        while rx.changed().await.is_ok() {}

        assert!(agent.handle_event(hold_prompt()).await.is_err());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut invalid = config();
        invalid.cloud.client_secret = String::new();

        assert!(matches!(
            BeaconAgent::new(invalid, &db),
            Err(AgentError::InvalidConfig(_))
        ));
        assert!(BeaconAgent::new(config(), &db).is_ok());
    }
}
