//! Wire-level types for the Bravia control endpoints: the JSON-RPC envelope,
//! response shapes, and the SOAP body used by the legacy IRCC service.
//!
//! Everything here is pure data shaping; nothing does I/O.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Applied to every call unless the caller overrides it.
pub const DEFAULT_TIMEOUT_MS: u64 = 6000;

pub const IRCC_PATH: &str = "/sony/IRCC";

/// The device requires the quotes to be part of the header value.
pub const IRCC_SOAP_ACTION: &str = "\"urn:schemas-sony-com:service:IRCC:1#X_SendIRCC\"";

/// The four JSON-RPC service endpoints a Bravia panel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServicePath {
    System,
    Audio,
    AppControl,
    AvContent,
}

impl ServicePath {
    pub fn path(&self) -> &'static str {
        match self {
            ServicePath::System => "/sony/system",
            ServicePath::Audio => "/sony/audio",
            ServicePath::AppControl => "/sony/appControl",
            ServicePath::AvContent => "/sony/avContent",
        }
    }

    /// Version sent when the caller does not override it. All four services
    /// speak "1.0" for the methods used here; newer methods can pass an
    /// explicit version per call.
    pub fn default_version(&self) -> &'static str {
        "1.0"
    }
}

// ── JSON-RPC envelope ─────────────────────────────────────────────────────────

/// Outgoing envelope. The device ignores `id` for request matching over
/// plain HTTP, so it is fixed at 1.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u32,
    pub version: String,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>, version: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params: normalize_params(params),
            id: 1,
            version: version.to_string(),
        }
    }
}

/// Incoming envelope. `error`, when present and non-empty, wins over any
/// `result` regardless of the HTTP status.
#[derive(Debug, Clone, Default)]
pub struct RpcResponse {
    pub result: Option<Vec<Value>>,
    pub error: Option<Vec<Value>>,
}

impl RpcResponse {
    /// Parse a response body. Some firmware replies with an empty or
    /// non-JSON body on success, so an unparseable body is an empty
    /// response, not a failure. `result` and `error` are lifted
    /// field by field; an off-type `result` must not take a reported
    /// error array down with it.
    pub fn from_body(body: &str) -> Self {
        let parsed: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };
        Self {
            result: array_field(&parsed, "result"),
            error: array_field(&parsed, "error"),
        }
    }

    /// The error array, if the device reported one.
    pub fn error_payload(&self) -> Option<&[Value]> {
        match &self.error {
            Some(err) if !err.is_empty() => Some(err.as_slice()),
            _ => None,
        }
    }

    pub fn into_result(self) -> Vec<Value> {
        self.result.unwrap_or_default()
    }
}

/// A top-level array field; anything that is not an array counts as absent.
fn array_field(parsed: &Value, key: &str) -> Option<Vec<Value>> {
    match parsed.get(key) {
        Some(Value::Array(items)) => Some(items.clone()),
        _ => None,
    }
}

/// The device rejects calls with an empty params array; parameterless
/// methods expect a single empty object instead.
pub fn normalize_params(params: Vec<Value>) -> Vec<Value> {
    if params.is_empty() {
        vec![json!({})]
    } else {
        params
    }
}

/// Trim whitespace and strip every trailing slash so paths can be appended
/// verbatim.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// ── typed result shapes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    On,
    Standby,
    Unknown,
}

impl PowerState {
    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Standby => "standby",
            PowerState::Unknown => "unknown",
        }
    }
}

/// `getPowerStatus` result: `[{"status": "active" | "standby"}]`. Statuses
/// this build does not know map to `Unknown` rather than failing.
pub fn parse_power_status(result: &[Value]) -> Result<PowerState> {
    let entry = result
        .first()
        .ok_or_else(|| Error::Parse("empty power status result".to_string()))?;
    let status = entry
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("power status entry without status field".to_string()))?;
    Ok(match status {
        "active" => PowerState::On,
        "standby" => PowerState::Standby,
        _ => PowerState::Unknown,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    #[serde(default)]
    pub target: String,
    pub volume: i32,
    pub mute: bool,
    #[serde(default)]
    pub max_volume: Option<i32>,
    #[serde(default)]
    pub min_volume: Option<i32>,
}

/// `getVolumeInformation` result: `[[{target, volume, mute, ...}, ...]]`.
/// The speaker target is preferred, else the first entry; a device that
/// reports no audio targets yields `None`.
pub fn parse_volume_info(result: &[Value]) -> Result<Option<VolumeInfo>> {
    let list = match result.first() {
        Some(Value::Array(list)) => list,
        Some(other) => {
            return Err(Error::Parse(format!(
                "volume information is not a list: {other}"
            )))
        }
        None => return Ok(None),
    };

    let infos: Vec<VolumeInfo> = list
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();

    Ok(infos
        .iter()
        .find(|v| v.target == "speaker")
        .or_else(|| infos.first())
        .cloned())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    #[serde(default)]
    pub title: String,
    pub uri: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl AppInfo {
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.uri
        } else {
            &self.title
        }
    }
}

/// `getApplicationList` result: `[[{title, uri, icon}, ...]]`. Entries
/// without a uri are useless to a caller and are skipped.
pub fn parse_application_list(result: &[Value]) -> Result<Vec<AppInfo>> {
    parse_entry_list(result, "application list")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub label: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub connection: Option<bool>,
}

impl InputInfo {
    pub fn display_name(&self) -> &str {
        if !self.title.is_empty() {
            return &self.title;
        }
        match &self.label {
            Some(label) if !label.is_empty() => label,
            _ => &self.uri,
        }
    }
}

/// `getCurrentExternalInputsStatus` result: `[[{title, label, uri, ...}, ...]]`.
pub fn parse_input_list(result: &[Value]) -> Result<Vec<InputInfo>> {
    parse_entry_list(result, "input list")
}

fn parse_entry_list<T: serde::de::DeserializeOwned>(
    result: &[Value],
    what: &str,
) -> Result<Vec<T>> {
    let list = match result.first() {
        Some(Value::Array(list)) => list,
        Some(other) => return Err(Error::Parse(format!("{what} is not a list: {other}"))),
        None => return Ok(Vec::new()),
    };
    Ok(list
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect())
}

// ── IRCC (SOAP) ───────────────────────────────────────────────────────────────

/// Fixed-shape SOAP body carrying one infrared code. The code goes in
/// verbatim; it is an opaque base64 token from the device's own tables.
pub fn ircc_envelope(code: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"
            s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:X_SendIRCC xmlns:u="urn:schemas-sony-com:service:IRCC:1">
      <IRCCCode>{code}</IRCCCode>
    </u:X_SendIRCC>
  </s:Body>
</s:Envelope>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_become_single_empty_object() {
        assert_eq!(normalize_params(vec![]), vec![json!({})]);
    }

    #[test]
    fn non_empty_params_pass_through() {
        let params = vec![json!({"status": true}), json!("x")];
        assert_eq!(normalize_params(params.clone()), params);
        // idempotent on its own output
        assert_eq!(
            normalize_params(normalize_params(vec![])),
            vec![json!({})]
        );
    }

    #[test]
    fn base_url_loses_whitespace_and_trailing_slashes() {
        assert_eq!(normalize_base_url("  http://tv.local///  "), "http://tv.local");
        assert_eq!(normalize_base_url("http://tv.local"), "http://tv.local");
        let once = normalize_base_url("http://tv.local/");
        assert_eq!(normalize_base_url(&once), once);
    }

    #[test]
    fn request_envelope_has_fixed_fields() {
        let req = RpcRequest::new("getPowerStatus", vec![], "1.0");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["method"], "getPowerStatus");
        assert_eq!(value["params"], json!([{}]));
    }

    #[test]
    fn unparseable_body_is_an_empty_response() {
        let res = RpcResponse::from_body("<html>not json</html>");
        assert!(res.result.is_none());
        assert!(res.error_payload().is_none());
    }

    #[test]
    fn empty_error_array_is_not_an_error() {
        let res = RpcResponse::from_body(r#"{"result":[{"status":"active"}],"error":[]}"#);
        assert!(res.error_payload().is_none());

        let res = RpcResponse::from_body(r#"{"error":[7,"Illegal State"]}"#);
        assert_eq!(res.error_payload().unwrap().len(), 2);
    }

    #[test]
    fn off_type_result_does_not_mask_the_error_array() {
        // valid JSON, error array present, result not the expected array
        let res = RpcResponse::from_body(r#"{"result": 17, "error": [7, "Illegal State"]}"#);
        assert_eq!(res.error_payload().unwrap(), [json!(7), json!("Illegal State")]);
        assert!(res.into_result().is_empty());
    }

    #[test]
    fn power_status_parses_known_and_unknown_states() {
        assert_eq!(
            parse_power_status(&[json!({"status": "active"})]).unwrap(),
            PowerState::On
        );
        assert_eq!(
            parse_power_status(&[json!({"status": "standby"})]).unwrap(),
            PowerState::Standby
        );
        assert_eq!(
            parse_power_status(&[json!({"status": "shuttingDown"})]).unwrap(),
            PowerState::Unknown
        );
        assert!(parse_power_status(&[]).is_err());
        assert!(parse_power_status(&[json!({"state": "active"})]).is_err());
    }

    #[test]
    fn volume_info_prefers_the_speaker_target() {
        let result = vec![json!([
            {"target": "headphone", "volume": 11, "mute": false},
            {"target": "speaker", "volume": 25, "mute": true}
        ])];
        let info = parse_volume_info(&result).unwrap().unwrap();
        assert_eq!(info.target, "speaker");
        assert_eq!(info.volume, 25);
        assert!(info.mute);
    }

    #[test]
    fn volume_info_falls_back_to_the_first_target() {
        let result = vec![json!([
            {"target": "headphone", "volume": 11, "mute": false}
        ])];
        let info = parse_volume_info(&result).unwrap().unwrap();
        assert_eq!(info.target, "headphone");
    }

    #[test]
    fn volume_info_handles_missing_and_malformed_results() {
        assert_eq!(parse_volume_info(&[]).unwrap(), None);
        assert_eq!(parse_volume_info(&[json!([])]).unwrap(), None);
        assert!(parse_volume_info(&[json!({"volume": 1})]).is_err());
    }

    #[test]
    fn application_list_skips_entries_without_a_uri() {
        let result = vec![json!([
            {"title": "YouTube", "uri": "com.sony.dtv.yt"},
            {"title": "broken"},
            {"uri": "com.sony.dtv.netflix"}
        ])];
        let apps = parse_application_list(&result).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].display_name(), "YouTube");
        assert_eq!(apps[1].display_name(), "com.sony.dtv.netflix");
    }

    #[test]
    fn input_display_name_falls_back_through_label_to_uri() {
        let inputs = parse_input_list(&[json!([
            {"title": "HDMI 1", "uri": "extInput:hdmi?port=1"},
            {"title": "", "label": "Console", "uri": "extInput:hdmi?port=2"},
            {"title": "", "uri": "extInput:hdmi?port=3"}
        ])])
        .unwrap();
        assert_eq!(inputs[0].display_name(), "HDMI 1");
        assert_eq!(inputs[1].display_name(), "Console");
        assert_eq!(inputs[2].display_name(), "extInput:hdmi?port=3");
    }

    #[test]
    fn ircc_envelope_embeds_the_code_verbatim() {
        let body = ircc_envelope("AAAAAQAAAAEAAAAVAw==");
        assert!(body.contains("<IRCCCode>AAAAAQAAAAEAAAAVAw==</IRCCCode>"));
        assert!(body.starts_with("<?xml version=\"1.0\"?>"));
        assert!(body.contains("urn:schemas-sony-com:service:IRCC:1"));
    }

    #[test]
    fn soap_action_keeps_its_literal_quotes() {
        assert!(IRCC_SOAP_ACTION.starts_with('"'));
        assert!(IRCC_SOAP_ACTION.ends_with('"'));
    }

    #[test]
    fn service_paths_match_the_device_layout() {
        assert_eq!(ServicePath::System.path(), "/sony/system");
        assert_eq!(ServicePath::Audio.path(), "/sony/audio");
        assert_eq!(ServicePath::AppControl.path(), "/sony/appControl");
        assert_eq!(ServicePath::AvContent.path(), "/sony/avContent");
        assert_eq!(ServicePath::System.default_version(), "1.0");
    }
}
