//! # LED Session Machine
//!
//! Decides when the panels show the hold colour and when they go back to
//! automatic. Runs as an actor: every trigger, timer and finished transition
//! arrives as a message, so state is only ever touched by one task.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            hold                     activation done                    │
//! │   ┌──────┐ ───────► ┌────────────┐ ───────────────► ┌────────┐         │
//! │   │ Idle │          │ Activating │                  │ Active │         │
//! │   └──────┘ ◄─┐      └────────────┘ ◄───── hold ──── └────────┘         │
//! │      ▲       │  no devices │  ▲                          │              │
//! │      │       └─────────────┘  │ hold                     │ revert timer │
//! │      │                        │                          │ or presence  │
//! │      │  revert done     ┌───────────┐                    │ debounce     │
//! │      └───────────────── │ Reverting │ ◄──────────────────┘              │
//! │                         └───────────┘                                   │
//! │                                                                         │
//! │  Activation: set Manual ─► wait propagation delay ─► set colour        │
//! │  Revert:     set Auto                                                  │
//! │                                                                         │
//! │  Every hold bumps the generation. Timer and transition messages carry  │
//! │  the generation they were started under; stale ones are dropped.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Broadcast failures never block a transition. A panel that missed its
//! command after the retry budget is logged and the machine moves on.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beacon_core::{DeviceDescriptor, LedSession, SessionPhase};

use crate::broadcast::BroadcastController;
use crate::config::SessionSettings;
use crate::error::{AgentError, AgentResult};
use crate::panel::PanelCommands;

// =============================================================================
// Commands
// =============================================================================

/// Commands accepted from handles.
#[derive(Debug)]
pub enum SessionCommand {
    /// The room was put on hold.
    Hold,
    /// Room occupancy changed.
    Occupancy { occupied: bool },
    /// Revert immediately, unless already idle.
    RevertNow,
    Shutdown,
}

/// Messages from the machine's own timers and transition tasks.
#[derive(Debug)]
enum Internal {
    ActivationComplete { generation: u64 },
    ActivationAborted { generation: u64 },
    RevertDue { generation: u64 },
    DebounceElapsed { generation: u64 },
    RevertComplete { generation: u64 },
}

// =============================================================================
// Cancellable Task
// =============================================================================

/// A spawned timer or transition. Aborted when cancelled or dropped.
struct Scheduled(JoinHandle<()>);

impl Drop for Scheduled {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Cancels whatever is in `slot`. A no-op if it is empty or already fired.
fn cancel(slot: &mut Option<Scheduled>) -> bool {
    slot.take().is_some()
}

// =============================================================================
// Session Handle
// =============================================================================

/// Handle for driving the session machine.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<LedSession>,
}

impl SessionHandle {
    pub async fn hold(&self) -> AgentResult<()> {
        self.send(SessionCommand::Hold).await
    }

    pub async fn occupancy(&self, occupied: bool) -> AgentResult<()> {
        self.send(SessionCommand::Occupancy { occupied }).await
    }

    pub async fn revert_now(&self) -> AgentResult<()> {
        self.send(SessionCommand::RevertNow).await
    }

    pub async fn shutdown(&self) -> AgentResult<()> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> LedSession {
        self.state_rx.borrow().clone()
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> watch::Receiver<LedSession> {
        self.state_rx.clone()
    }

    /// Waits until the session satisfies `pred`.
    pub async fn wait_until(&self, pred: impl Fn(&LedSession) -> bool) -> AgentResult<LedSession> {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| AgentError::ShuttingDown)?;
        Ok(state.clone())
    }

    async fn send(&self, cmd: SessionCommand) -> AgentResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| AgentError::ChannelError("Session command channel closed".into()))
    }
}

// =============================================================================
// Session Machine
// =============================================================================

pub struct LedSessionMachine {
    broadcaster: Arc<BroadcastController>,
    panels: PanelCommands,
    settings: SessionSettings,
    session: LedSession,
    state_tx: watch::Sender<LedSession>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    /// In-flight activation or revert broadcast. At most one.
    transition: Option<Scheduled>,
    revert_timer: Option<Scheduled>,
    debounce_timer: Option<Scheduled>,
}

impl LedSessionMachine {
    pub fn new(
        broadcaster: Arc<BroadcastController>,
        panels: PanelCommands,
        settings: SessionSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(LedSession::default());
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        LedSessionMachine {
            broadcaster,
            panels,
            settings,
            session: LedSession::default(),
            state_tx,
            internal_tx,
            internal_rx,
            transition: None,
            revert_timer: None,
            debounce_timer: None,
        }
    }

    /// Spawns the machine loop and returns a handle.
    pub fn start(self) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let handle = SessionHandle {
            cmd_tx,
            state_rx: self.state_tx.subscribe(),
        };

        tokio::spawn(self.run(cmd_rx));

        handle
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        info!(
            dwell_secs = self.settings.dwell_secs,
            debounce_secs = self.settings.presence_debounce_secs,
            revert_on_occupancy = self.settings.revert_on_occupancy,
            "LED session machine started"
        );

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Hold) => self.on_hold(),
                        Some(SessionCommand::Occupancy { occupied }) => self.on_occupancy(occupied),
                        Some(SessionCommand::RevertNow) => self.on_revert_now(),
                        Some(SessionCommand::Shutdown) | None => {
                            info!("LED session machine shutting down");
                            break;
                        }
                    }
                }
                Some(event) = self.internal_rx.recv() => self.on_internal(event),
            }
        }

        self.cancel_all();
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    fn on_hold(&mut self) {
        let superseded = self.session.phase;
        self.cancel_all();
        self.session.generation += 1;
        self.session.revert_deadline = None;
        self.session.presence_debounce_armed = false;
        self.session.enter(SessionPhase::Activating);
        self.publish();

        info!(
            generation = self.session.generation,
            previous = %superseded,
            "Hold detected, activating hold light"
        );

        self.transition = Some(self.spawn_activation());
    }

    fn on_occupancy(&mut self, occupied: bool) {
        if !self.settings.revert_on_occupancy {
            debug!(occupied, "Occupancy change ignored (revert on occupancy disabled)");
            return;
        }

        if occupied {
            if self.session.phase != SessionPhase::Active {
                debug!(phase = %self.session.phase, "Occupancy ignored outside active session");
                return;
            }
            if self.debounce_timer.is_some() {
                return;
            }

            info!(
                debounce_secs = self.settings.presence_debounce_secs,
                "Presence detected, confirming before revert"
            );
            let generation = self.session.generation;
            self.debounce_timer = Some(self.schedule(
                self.settings.presence_debounce(),
                Internal::DebounceElapsed { generation },
            ));
            self.session.presence_debounce_armed = true;
            self.publish();
        } else if cancel(&mut self.debounce_timer) {
            info!("Presence cleared before debounce elapsed, staying active");
            self.session.presence_debounce_armed = false;
            self.publish();
        }
    }

    fn on_revert_now(&mut self) {
        match self.session.phase {
            SessionPhase::Idle => debug!("Revert requested while idle, nothing to do"),
            SessionPhase::Reverting => debug!("Revert already in progress"),
            SessionPhase::Activating | SessionPhase::Active => self.begin_revert("requested"),
        }
    }

    fn on_internal(&mut self, event: Internal) {
        let current = self.session.generation;

        match event {
            Internal::ActivationComplete { generation }
                if generation == current && self.session.phase == SessionPhase::Activating =>
            {
                self.transition = None;
                self.session.enter(SessionPhase::Active);

                let dwell = self.settings.dwell();
                self.session.revert_deadline = chrono::Duration::from_std(dwell)
                    .ok()
                    .map(|d| chrono::Utc::now() + d);
                self.revert_timer = Some(self.schedule(dwell, Internal::RevertDue { generation }));
                self.publish();

                info!(generation, dwell_secs = dwell.as_secs(), "Hold light active");
            }
            Internal::ActivationAborted { generation }
                if generation == current && self.session.phase == SessionPhase::Activating =>
            {
                self.transition = None;
                self.session.enter(SessionPhase::Idle);
                self.publish();
                warn!(generation, "No panels to activate, staying idle");
            }
            Internal::RevertDue { generation }
                if generation == current && self.session.phase == SessionPhase::Active =>
            {
                self.revert_timer = None;
                self.begin_revert("dwell elapsed");
            }
            Internal::DebounceElapsed { generation }
                if generation == current && self.session.phase == SessionPhase::Active =>
            {
                self.debounce_timer = None;
                self.begin_revert("presence confirmed");
            }
            Internal::RevertComplete { generation }
                if generation == current && self.session.phase == SessionPhase::Reverting =>
            {
                self.transition = None;
                self.session.enter(SessionPhase::Idle);
                self.publish();
                info!(generation, "Panels reverted, session idle");
            }
            stale => debug!(?stale, generation = current, "Dropping superseded session event"),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn begin_revert(&mut self, reason: &str) {
        self.cancel_all();
        self.session.revert_deadline = None;
        self.session.presence_debounce_armed = false;
        self.session.enter(SessionPhase::Reverting);
        self.publish();

        info!(reason, generation = self.session.generation, "Reverting panels to auto");

        self.transition = Some(self.spawn_revert());
    }

    fn spawn_activation(&self) -> Scheduled {
        let generation = self.session.generation;
        let broadcaster = Arc::clone(&self.broadcaster);
        let panels = self.panels.clone();
        let manual = self.settings.manual_mode.clone();
        let color = self.settings.hold_color.clone();
        let delay = self.settings.propagation_delay();
        let tx = self.internal_tx.clone();

        Scheduled(tokio::spawn(async move {
            let Some(devices) = ensure_devices(&broadcaster).await else {
                let _ = tx.send(Internal::ActivationAborted { generation });
                return;
            };

            let mode_panels = panels.clone();
            broadcaster
                .broadcast_to(&devices, "set-manual", move |device| {
                    let panels = mode_panels.clone();
                    let manual = manual.clone();
                    async move { panels.set_mode(&device, &manual).await }
                })
                .await;

            tokio::time::sleep(delay).await;

            broadcaster
                .broadcast_to(&devices, "set-color", move |device| {
                    let panels = panels.clone();
                    let color = color.clone();
                    async move { panels.set_color(&device, &color).await }
                })
                .await;

            let _ = tx.send(Internal::ActivationComplete { generation });
        }))
    }

    fn spawn_revert(&self) -> Scheduled {
        let generation = self.session.generation;
        let broadcaster = Arc::clone(&self.broadcaster);
        let panels = self.panels.clone();
        let auto = self.settings.auto_mode.clone();
        let tx = self.internal_tx.clone();

        Scheduled(tokio::spawn(async move {
            broadcaster
                .broadcast("set-auto", move |device| {
                    let panels = panels.clone();
                    let auto = auto.clone();
                    async move { panels.set_mode(&device, &auto).await }
                })
                .await;

            let _ = tx.send(Internal::RevertComplete { generation });
        }))
    }

    fn schedule(&self, after: Duration, event: Internal) -> Scheduled {
        let tx = self.internal_tx.clone();
        Scheduled(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(event);
        }))
    }

    fn cancel_all(&mut self) {
        cancel(&mut self.transition);
        cancel(&mut self.revert_timer);
        cancel(&mut self.debounce_timer);
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.session.clone());
    }
}

/// Returns the device set, re-running discovery once if it is empty.
async fn ensure_devices(broadcaster: &BroadcastController) -> Option<Arc<[DeviceDescriptor]>> {
    let devices = broadcaster.discovery().devices().await;
    if !devices.is_empty() {
        return Some(devices);
    }

    warn!("No panels discovered yet, retrying discovery");
    match broadcaster.discovery().discover().await {
        Ok(devices) if !devices.is_empty() => Some(devices),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Discovery retry failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::ApiClient;
    use crate::config::{BroadcastSettings, DiscoverySettings};
    use crate::discovery::{DeviceDiscovery, StaticIdentity};
    use crate::error::TransportError;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};
    use crate::test_support::FakeTransport;
    use crate::token_authority::{OAuthClient, TokenAuthority};
    use crate::token_store::MemoryTokenStore;
    use beacon_core::TokenPair;
    use tokio::time::Instant;

    const INVENTORY: &str = r#"{"items": [
        {"id": "NAV1", "product": "Cisco Room Navigator", "type": "roomdesk", "displayName": "Door A"},
        {"id": "NAV2", "product": "Cisco Room Navigator", "type": "roomdesk", "displayName": "Door B"},
        {"id": "NAV3", "product": "Cisco Room Navigator", "type": "roomdesk", "displayName": "Door C"}
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

    struct Rig {
        transport: Arc<FakeTransport>,
        handle: SessionHandle,
    }

    async fn rig_with(
        transport: Arc<FakeTransport>,
        local: Option<&str>,
        settings: SessionSettings,
    ) -> Rig {
        let authority = TokenAuthority::with_pair(
            transport.clone(),
            Arc::new(MemoryTokenStore::new()),
            OAuthClient {
                token_url: "https://auth.test/access_token".into(),
                client_id: "cid".into(),
                client_secret: "secret".into(),
            },
            TokenPair::new("A0", "R0"),
        );
        let api = ApiClient::new(transport.clone(), authority, "https://api.test/v1");
        let discovery = Arc::new(DeviceDiscovery::new(
            api.clone(),
            Arc::new(StaticIdentity::new(local.map(String::from))),
            DiscoverySettings::default(),
        ));
        if local.is_some() {
            discovery.discover().await.unwrap();
        }
        transport.clear();

        let broadcaster = Arc::new(BroadcastController::new(
            discovery,
            &BroadcastSettings::default(),
        ));
        let handle =
            LedSessionMachine::new(broadcaster, PanelCommands::new(api), settings).start();

        Rig { transport, handle }
    }

    async fn rig() -> Rig {
        rig_with(FakeTransport::new(cloud), Some("LOCAL"), SessionSettings::default()).await
    }

    fn is_phase(phase: SessionPhase) -> impl Fn(&LedSession) -> bool {
        move |s| s.phase == phase
    }

    impl Rig {
        fn manual_calls(&self) -> usize {
            self.transport.count_body(HttpMethod::Patch, "\"Manual\"")
        }

        fn auto_calls(&self) -> usize {
            self.transport.count_body(HttpMethod::Patch, "\"Auto\"")
        }

        fn color_calls(&self) -> usize {
            self.transport.count_url("LedControl.Color.Set")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_activates_then_reverts_after_dwell() {
        let rig = rig().await;
        let started = Instant::now();

        rig.handle.hold().await.unwrap();
        let active = rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();

        assert!(active.active);
        assert!(active.revert_deadline.is_some());
        assert_eq!(active.generation, 1);
        assert_eq!(rig.manual_calls(), 3);
        assert_eq!(rig.color_calls(), 3);
        assert_eq!(rig.auto_calls(), 0);
        assert!(started.elapsed() >= Duration::from_millis(2000));

        let idle = rig.handle.wait_until(is_phase(SessionPhase::Idle)).await.unwrap();
        assert!(!idle.active);
        assert_eq!(idle.revert_deadline, None);
        assert_eq!(rig.auto_calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(178 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistently_failing_panel_does_not_block_activation() {
        let transport = FakeTransport::new(|r| {
            let nav2 = r.url.contains("deviceId=NAV2")
                || r.body.as_deref().map_or(false, |b| b.contains("\"NAV2\""));
            if nav2 {
                Ok(HttpResponse::new(500, "offline"))
            } else {
                cloud(r)
            }
        });
        let rig = rig_with(transport, Some("LOCAL"), SessionSettings::default()).await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();

        let t = &rig.transport;
        assert_eq!(t.count_url("deviceId=NAV2"), 2);
        assert_eq!(t.count_url("deviceId=NAV1"), 1);
        assert_eq!(t.count_url("deviceId=NAV3"), 1);
        assert_eq!(t.count_body(HttpMethod::Post, "\"NAV2\""), 2);
        assert_eq!(t.count_body(HttpMethod::Post, "\"NAV1\""), 1);
        assert_eq!(t.count_body(HttpMethod::Post, "\"NAV3\""), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_hold_restarts_and_reverts_once() {
        let rig = rig().await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(100)).await;
        let restarted = Instant::now();
        rig.handle.hold().await.unwrap();
        let active = rig
            .handle
            .wait_until(|s| s.phase == SessionPhase::Active && s.generation == 2)
            .await
            .unwrap();
        assert!(active.active);
        assert_eq!(rig.manual_calls(), 6);

        rig.handle.wait_until(is_phase(SessionPhase::Idle)).await.unwrap();
        assert!(restarted.elapsed() >= Duration::from_secs(178));
        assert_eq!(rig.auto_calls(), 3);

        // The first cycle's timer must not fire later.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(rig.auto_calls(), 3);
        assert!(rig.handle.snapshot().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_during_activation_supersedes_it() {
        let rig = rig().await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Activating)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        rig.handle.hold().await.unwrap();

        let active = rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();
        assert_eq!(active.generation, 2);
        // The first activation never reached the colour phase.
        assert_eq!(rig.color_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_flicker_within_debounce_does_not_revert() {
        let rig = rig().await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();

        rig.handle.occupancy(true).await.unwrap();
        rig.handle
            .wait_until(|s| s.presence_debounce_armed)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        rig.handle.occupancy(false).await.unwrap();
        rig.handle
            .wait_until(|s| !s.presence_debounce_armed)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rig.handle.snapshot().phase, SessionPhase::Active);
        assert_eq!(rig.auto_calls(), 0);

        // Original dwell timer still runs.
        rig.handle.wait_until(is_phase(SessionPhase::Idle)).await.unwrap();
        assert_eq!(rig.auto_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_presence_reverts_early() {
        let rig = rig().await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();

        let started = Instant::now();
        rig.handle.occupancy(true).await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Idle)).await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(60));
        assert_eq!(rig.auto_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_occupancy_ignored_when_disabled() {
        let settings = SessionSettings {
            revert_on_occupancy: false,
            ..SessionSettings::default()
        };
        let rig = rig_with(FakeTransport::new(cloud), Some("LOCAL"), settings).await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();
        rig.handle.occupancy(true).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Active);
        assert!(!snapshot.presence_debounce_armed);
        assert_eq!(rig.auto_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_while_idle_is_noop() {
        let rig = rig().await;

        rig.handle.revert_now().await.unwrap();
        rig.handle.occupancy(true).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(rig.handle.snapshot().is_idle());
        assert!(rig.transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_now_while_active() {
        let rig = rig().await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();
        rig.handle.revert_now().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Idle)).await.unwrap();

        assert_eq!(rig.auto_calls(), 3);

        // The cancelled dwell timer stays quiet.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(rig.auto_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_during_debounce_does_not_revert() {
        let rig = rig().await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();
        rig.handle.occupancy(true).await.unwrap();
        rig.handle
            .wait_until(|s| s.presence_debounce_armed)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        rig.handle.hold().await.unwrap();
        rig.handle
            .wait_until(|s| s.phase == SessionPhase::Active && s.generation == 2)
            .await
            .unwrap();

        // Well past the debounce window of the first cycle.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Active);
        assert!(!snapshot.presence_debounce_armed);
        assert_eq!(rig.auto_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_during_revert_restarts_activation() {
        let transport = FakeTransport::with_latency(Duration::from_millis(800), cloud);
        let rig = rig_with(transport, Some("LOCAL"), SessionSettings::default()).await;

        rig.handle.hold().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();
        rig.handle.revert_now().await.unwrap();
        rig.handle.wait_until(is_phase(SessionPhase::Reverting)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        rig.handle.hold().await.unwrap();
        let active = rig
            .handle
            .wait_until(|s| s.phase == SessionPhase::Active && s.generation == 2)
            .await
            .unwrap();
        assert!(active.active);
        assert_eq!(rig.manual_calls(), 6);
        assert_eq!(rig.auto_calls(), 3);

        rig.handle.wait_until(is_phase(SessionPhase::Idle)).await.unwrap();
        assert_eq!(rig.auto_calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_devices_stays_idle() {
        let rig = rig_with(FakeTransport::new(cloud), None, SessionSettings::default()).await;

        rig.handle.hold().await.unwrap();
        let idle = rig
            .handle
            .wait_until(|s| s.generation == 1 && s.is_idle())
            .await
            .unwrap();

        assert!(!idle.active);
        assert_eq!(rig.manual_calls(), 0);
        assert_eq!(rig.color_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_set_triggers_one_rediscovery() {
        // Built by hand: the rig runs discovery up front.
        let transport = FakeTransport::new(cloud);
        let authority = TokenAuthority::with_pair(
            transport.clone(),
            Arc::new(MemoryTokenStore::new()),
            OAuthClient {
                token_url: "https://auth.test/access_token".into(),
                client_id: "cid".into(),
                client_secret: "secret".into(),
            },
            TokenPair::new("A0", "R0"),
        );
        let api = ApiClient::new(transport.clone(), authority, "https://api.test/v1");
        let discovery = Arc::new(DeviceDiscovery::new(
            api.clone(),
            Arc::new(StaticIdentity::new(Some("LOCAL".into()))),
            DiscoverySettings::default(),
        ));
        let broadcaster = Arc::new(BroadcastController::new(
            discovery,
            &BroadcastSettings::default(),
        ));
        let handle = LedSessionMachine::new(
            broadcaster,
            PanelCommands::new(api),
            SessionSettings::default(),
        )
        .start();

        handle.hold().await.unwrap();
        handle.wait_until(is_phase(SessionPhase::Active)).await.unwrap();

        assert_eq!(transport.count_url("/devices/LOCAL"), 1);
        assert_eq!(transport.count_url("LedControl.Color.Set"), 3);
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let rig = rig().await;
        rig.handle.shutdown().await.unwrap();

        let mut rx = rig.handle.subscribe();
        // Sender is dropped once the loop exits.
        while rx.changed().await.is_ok() {}

        assert!(rig.handle.hold().await.is_err());
    }
}
