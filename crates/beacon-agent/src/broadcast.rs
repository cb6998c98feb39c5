//! # Broadcast Controller
//!
//! Fans one logical action out to every discovered panel.
//!
//! ## Retry Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  devices: [NAV1, NAV2, NAV3]          (snapshot from DeviceDiscovery)  │
//! │                                                                         │
//! │  NAV1 ── try ── 204 ✓                                    attempts = 1  │
//! │  NAV2 ── try ── 500 ✗ ── wait 1s ── try ── 200 ✓         attempts = 2  │
//! │  NAV3 ── try ── timeout ✗ ── wait 1s ── try ── 503 ✗     attempts = 2  │
//! │                                                                         │
//! │  Devices run concurrently and independently. One failing panel never   │
//! │  delays or skips another. Exactly one outcome per device.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only 200 and 204 count as success for control-plane writes.

use backoff::backoff::{Backoff, Constant};
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use beacon_core::{ActionOutcome, DeviceDescriptor};

use crate::config::{BroadcastSettings, MAX_ATTEMPTS_LIMIT};
use crate::discovery::DeviceDiscovery;
use crate::error::ApiError;
use crate::http::HttpResponse;

pub struct BroadcastController {
    discovery: Arc<DeviceDiscovery>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl BroadcastController {
    pub fn new(discovery: Arc<DeviceDiscovery>, settings: &BroadcastSettings) -> Self {
        BroadcastController {
            discovery,
            max_attempts: settings.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            retry_delay: settings.retry_delay(),
        }
    }

    pub fn discovery(&self) -> &Arc<DeviceDiscovery> {
        &self.discovery
    }

    /// Applies `per_device` to every currently discovered device.
    pub async fn broadcast<F, Fut>(&self, action: &str, per_device: F) -> Vec<ActionOutcome>
    where
        F: Fn(DeviceDescriptor) -> Fut,
        Fut: Future<Output = Result<HttpResponse, ApiError>>,
    {
        let devices = self.discovery.devices().await;
        self.broadcast_to(&devices, action, per_device).await
    }

    /// Applies `per_device` to an explicit device list.
    pub async fn broadcast_to<F, Fut>(
        &self,
        devices: &[DeviceDescriptor],
        action: &str,
        per_device: F,
    ) -> Vec<ActionOutcome>
    where
        F: Fn(DeviceDescriptor) -> Fut,
        Fut: Future<Output = Result<HttpResponse, ApiError>>,
    {
        let span = info_span!("broadcast", action = %action, broadcast_id = %Uuid::new_v4());

        async {
            let outcomes = join_all(
                devices
                    .iter()
                    .map(|device| self.run_device(device.clone(), &per_device)),
            )
            .await;

            let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
            if succeeded == outcomes.len() {
                info!(devices = outcomes.len(), "Broadcast complete");
            } else {
                warn!(
                    devices = outcomes.len(),
                    succeeded,
                    failed = outcomes.len() - succeeded,
                    "Broadcast finished with failures"
                );
            }
            outcomes
        }
        .instrument(span)
        .await
    }

    async fn run_device<F, Fut>(&self, device: DeviceDescriptor, per_device: &F) -> ActionOutcome
    where
        F: Fn(DeviceDescriptor) -> Fut,
        Fut: Future<Output = Result<HttpResponse, ApiError>>,
    {
        let mut delays = Constant::new(self.retry_delay);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match per_device(device.clone()).await {
                Ok(response) if response.is_control_success() => {
                    debug!(device_id = %device.id, attempt, status = response.status, "Device action applied");
                    return ActionOutcome {
                        device,
                        succeeded: true,
                        attempts: attempt,
                    };
                }
                Ok(response) => {
                    warn!(device_id = %device.id, attempt, status = response.status, "Device action rejected");
                }
                Err(e) => {
                    warn!(
                        device_id = %device.id,
                        attempt,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Device action failed"
                    );
                }
            }

            if attempt >= self.max_attempts {
                return ActionOutcome {
                    device,
                    succeeded: false,
                    attempts: attempt,
                };
            }

            let delay = delays.next_backoff().unwrap_or(self.retry_delay);
            tokio::time::sleep(delay).await;
        }
    }
}
