//! # Panel LED Commands
//!
//! The two control-plane writes a hold-light cycle needs.
//!
//! ```text
//! set_mode  → PATCH /deviceConfigurations?deviceId=<id>
//!             {"op":"replace","path":"UserInterface.LedControl.Mode/sources/configured/value","value":"Manual"}
//!
//! set_color → POST /xapi/command/UserInterface.LedControl.Color.Set
//!             {"deviceId":"<id>","arguments":{"Color":"Blue"}}
//! ```

use serde_json::json;

use beacon_core::DeviceDescriptor;

use crate::api_client::{encode_component, ApiClient};
use crate::error::ApiError;
use crate::http::HttpResponse;

const LED_MODE_PATH: &str = "UserInterface.LedControl.Mode/sources/configured/value";
const COLOR_SET_COMMAND: &str = "xapi/command/UserInterface.LedControl.Color.Set";

#[derive(Clone)]
pub struct PanelCommands {
    api: ApiClient,
}

impl PanelCommands {
    pub fn new(api: ApiClient) -> Self {
        PanelCommands { api }
    }

    /// Switches the panel's LED control mode (`Manual` / `Auto`).
    pub async fn set_mode(
        &self,
        device: &DeviceDescriptor,
        mode: &str,
    ) -> Result<HttpResponse, ApiError> {
        let path = format!("deviceConfigurations?deviceId={}", encode_component(&device.id));
        let body = json!({
            "op": "replace",
            "path": LED_MODE_PATH,
            "value": mode,
        });
        self.api.patch_json(&path, &body).await
    }

    /// Sets the LED colour. Only takes effect in manual mode.
    pub async fn set_color(
        &self,
        device: &DeviceDescriptor,
        color: &str,
    ) -> Result<HttpResponse, ApiError> {
        let body = json!({
            "deviceId": device.id,
            "arguments": { "Color": color },
        });
        self.api.post_json(COLOR_SET_COMMAND, &body).await
    }
}
