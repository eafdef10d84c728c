//! HTTP client for the Bravia control endpoints.
//!
//! Every call resolves the active profile from the store first, so a profile
//! switch takes effect on the very next request. There is no connection
//! state beyond reqwest's own pool.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::profiles::{Profile, ProfileStore};
use crate::protocol::{
    self, ircc_envelope, AppInfo, InputInfo, PowerState, RpcRequest, RpcResponse, ServicePath,
    VolumeInfo, DEFAULT_TIMEOUT_MS, IRCC_PATH, IRCC_SOAP_ACTION,
};

/// Per-call knobs. `version` overrides the service default, `timeout_ms`
/// overrides the client default.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub version: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    profiles: ProfileStore,
    default_timeout_ms: u64,
}

impl RpcClient {
    pub fn new(profiles: ProfileStore) -> Result<Self> {
        Self::with_timeout(profiles, DEFAULT_TIMEOUT_MS)
    }

    pub fn with_timeout(profiles: ProfileStore, default_timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            profiles,
            default_timeout_ms,
        })
    }

    /// The active profile, required to be callable.
    async fn configured_profile(&self) -> Result<Profile> {
        let set = self.profiles.list().await?;
        match set.active {
            Some(p) if p.is_configured() => Ok(p),
            _ => Err(Error::NotConfigured),
        }
    }

    fn timeout(&self, timeout_ms: Option<u64>) -> Duration {
        Duration::from_millis(timeout_ms.unwrap_or(self.default_timeout_ms))
    }

    /// POST one JSON-RPC envelope. An HTTP-level failure wins over anything
    /// in the body; after that a non-empty `error` array fails the call even
    /// on a 200.
    pub async fn call(
        &self,
        service: ServicePath,
        method: &str,
        params: Vec<Value>,
        options: CallOptions,
    ) -> Result<RpcResponse> {
        let profile = self.configured_profile().await?;
        let base = protocol::normalize_base_url(&profile.url);
        let url = format!("{base}{}", service.path());

        let version = options
            .version
            .unwrap_or_else(|| service.default_version().to_string());
        let request = RpcRequest::new(method, params, &version);
        let timeout = self.timeout(options.timeout_ms);

        debug!(method, path = service.path(), %version, "rpc call");

        let response = self
            .http
            .post(&url)
            .header("X-Auth-PSK", &profile.psk)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, &url, timeout))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = RpcResponse::from_body(&body);

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                method: method.to_string(),
            });
        }
        if let Some(payload) = parsed.error_payload() {
            return Err(Error::Protocol(Value::Array(payload.to_vec())));
        }
        Ok(parsed)
    }

    /// POST one infrared code to the legacy SOAP endpoint. Any 2xx is
    /// success; the body is not inspected.
    pub async fn send_ircc(&self, code: &str, timeout_ms: Option<u64>) -> Result<()> {
        let profile = self.configured_profile().await?;
        let base = protocol::normalize_base_url(&profile.url);
        let url = format!("{base}{IRCC_PATH}");
        let timeout = self.timeout(timeout_ms);

        debug!(code, "ircc send");

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPACTION", IRCC_SOAP_ACTION)
            .header("X-Auth-PSK", &profile.psk)
            .timeout(timeout)
            .body(ircc_envelope(code))
            .send()
            .await
            .map_err(|e| send_error(e, &url, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                method: "X_SendIRCC".to_string(),
            });
        }
        Ok(())
    }

    // ── typed endpoint helpers ────────────────────────────────────────────────

    pub async fn power_status(&self) -> Result<PowerState> {
        let res = self
            .call(
                ServicePath::System,
                "getPowerStatus",
                vec![],
                CallOptions::default(),
            )
            .await?;
        protocol::parse_power_status(&res.into_result())
    }

    pub async fn set_power_status(&self, on: bool) -> Result<()> {
        self.call(
            ServicePath::System,
            "setPowerStatus",
            vec![json!({"status": on})],
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Raw capability result, handed to [`crate::capabilities::IrCodeMap`].
    pub async fn remote_controller_info(&self) -> Result<Vec<Value>> {
        let res = self
            .call(
                ServicePath::System,
                "getRemoteControllerInfo",
                vec![],
                CallOptions::default(),
            )
            .await?;
        Ok(res.into_result())
    }

    pub async fn volume_info(&self) -> Result<Option<VolumeInfo>> {
        let res = self
            .call(
                ServicePath::Audio,
                "getVolumeInformation",
                vec![],
                CallOptions::default(),
            )
            .await?;
        protocol::parse_volume_info(&res.into_result())
    }

    pub async fn set_volume(&self, volume: i32) -> Result<()> {
        // the device expects the level as a string
        self.call(
            ServicePath::Audio,
            "setAudioVolume",
            vec![json!({"target": "speaker", "volume": volume.to_string()})],
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.call(
            ServicePath::Audio,
            "setAudioMute",
            vec![json!({"status": mute})],
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn application_list(&self) -> Result<Vec<AppInfo>> {
        let res = self
            .call(
                ServicePath::AppControl,
                "getApplicationList",
                vec![],
                CallOptions::default(),
            )
            .await?;
        protocol::parse_application_list(&res.into_result())
    }

    pub async fn launch_app(&self, uri: &str) -> Result<()> {
        self.call(
            ServicePath::AppControl,
            "setActiveApp",
            vec![json!({"uri": uri})],
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn input_list(&self) -> Result<Vec<InputInfo>> {
        let res = self
            .call(
                ServicePath::AvContent,
                "getCurrentExternalInputsStatus",
                vec![],
                CallOptions::default(),
            )
            .await?;
        protocol::parse_input_list(&res.into_result())
    }

    pub async fn switch_input(&self, uri: &str) -> Result<()> {
        self.call(
            ServicePath::AvContent,
            "setPlayContent",
            vec![json!({"uri": uri})],
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }
}

fn send_error(e: reqwest::Error, url: &str, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        Error::Transport(e)
    }
}
