#![allow(dead_code)]

//! In-process stand-in for a Bravia panel: an axum app on an ephemeral port
//! answering the four JSON-RPC services plus the SOAP IRCC endpoint, with
//! switchable failure modes and per-method delays.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use bravia_api::{MemoryStore, ProfileStore, RpcClient, Session};

pub const TEST_PSK: &str = "sekrit";

/// One request as the device saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub method: String,
    pub body: Value,
    pub psk: Option<String>,
    pub soap_action: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Failure {
    /// 200 with a non-empty JSON-RPC error array.
    ApiError(Value),
    /// Plain HTTP error status.
    Http(u16),
    /// 200 with this raw body.
    Body(String),
    /// Never answer (until the client gives up).
    Hang,
}

pub struct TvState {
    pub power: Mutex<String>,
    pub volume: Mutex<i32>,
    pub mute: Mutex<bool>,
    /// Full `getRemoteControllerInfo` result array.
    pub remote_info: Mutex<Value>,
    pub apps: Mutex<Value>,
    pub inputs: Mutex<Value>,
    pub fail: Mutex<Option<Failure>>,
    /// Delay applied to requests whose method matches.
    pub delay: Mutex<Option<(String, u64)>>,
    pub requests: Mutex<Vec<Recorded>>,
}

impl TvState {
    fn new() -> Self {
        Self {
            power: Mutex::new("standby".to_string()),
            volume: Mutex::new(25),
            mute: Mutex::new(false),
            remote_info: Mutex::new(json!(["1.0", []])),
            apps: Mutex::new(json!([
                {"title": "YouTube", "uri": "com.sony.dtv.yt"},
                {"title": "Netflix", "uri": "com.sony.dtv.netflix"}
            ])),
            inputs: Mutex::new(json!([
                {"title": "HDMI 1", "uri": "extInput:hdmi?port=1", "connection": true},
                {"title": "", "label": "Console", "uri": "extInput:hdmi?port=2"}
            ])),
            fail: Mutex::new(None),
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    async fn maybe_delay(&self, method: &str) {
        let delay = self.delay.lock().await.clone();
        if let Some((m, ms)) = delay {
            if m == method {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
    }

    async fn maybe_fail(&self) -> Option<Response> {
        let failure = self.fail.lock().await.clone();
        match failure {
            None => None,
            Some(Failure::ApiError(err)) => Some(Json(json!({"error": err, "id": 1})).into_response()),
            Some(Failure::Http(code)) => {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Some((status, "error").into_response())
            }
            Some(Failure::Body(body)) => Some((StatusCode::OK, body).into_response()),
            Some(Failure::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Some(StatusCode::OK.into_response())
            }
        }
    }
}

pub struct MockTv {
    pub addr: SocketAddr,
    pub state: Arc<TvState>,
    server: tokio::task::JoinHandle<()>,
}

impl MockTv {
    pub async fn start() -> Self {
        let state = Arc::new(TvState::new());
        let app = Router::new()
            .route("/sony/:service", post(handle))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn set_power(&self, status: &str) {
        *self.state.power.lock().await = status.to_string();
    }

    pub async fn set_fail(&self, failure: Option<Failure>) {
        *self.state.fail.lock().await = failure;
    }

    pub async fn set_delay(&self, method: &str, ms: u64) {
        *self.state.delay.lock().await = Some((method.to_string(), ms));
    }

    pub async fn clear_delay(&self) {
        *self.state.delay.lock().await = None;
    }

    pub async fn set_remote_info(&self, result: Value) {
        *self.state.remote_info.lock().await = result;
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().await.clone()
    }

    pub async fn requests_for(&self, method: &str) -> Vec<Recorded> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }
}

impl Drop for MockTv {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    Path(service): Path<String>,
    State(tv): State<Arc<TvState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/sony/{service}");
    let psk = header_string(&headers, "x-auth-psk");
    let soap_action = header_string(&headers, "soapaction");
    let content_type = header_string(&headers, "content-type");

    if service == "IRCC" {
        let xml = String::from_utf8_lossy(&body).to_string();
        tv.requests.lock().await.push(Recorded {
            path,
            method: "X_SendIRCC".to_string(),
            body: Value::String(xml),
            psk: psk.clone(),
            soap_action,
            content_type,
        });
        tv.maybe_delay("X_SendIRCC").await;
        if let Some(response) = tv.maybe_fail().await {
            return response;
        }
        if psk.as_deref() != Some(TEST_PSK) {
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        }
        return StatusCode::OK.into_response();
    }

    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let method = parsed
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    tv.requests.lock().await.push(Recorded {
        path,
        method: method.clone(),
        body: parsed.clone(),
        psk: psk.clone(),
        soap_action,
        content_type,
    });

    tv.maybe_delay(&method).await;
    if let Some(response) = tv.maybe_fail().await {
        return response;
    }
    if psk.as_deref() != Some(TEST_PSK) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let result: Value = match (service.as_str(), method.as_str()) {
        ("system", "getPowerStatus") => {
            json!([{"status": tv.power.lock().await.clone()}])
        }
        ("system", "setPowerStatus") => {
            let on = parsed["params"][0]["status"].as_bool().unwrap_or(false);
            *tv.power.lock().await = if on { "active" } else { "standby" }.to_string();
            json!([])
        }
        ("system", "getRemoteControllerInfo") => tv.remote_info.lock().await.clone(),
        ("audio", "getVolumeInformation") => {
            json!([[{
                "target": "speaker",
                "volume": *tv.volume.lock().await,
                "mute": *tv.mute.lock().await,
                "maxVolume": 100,
                "minVolume": 0
            }]])
        }
        ("audio", "setAudioVolume") => {
            // the level arrives as a string
            if let Some(v) = parsed["params"][0]["volume"]
                .as_str()
                .and_then(|s| s.parse().ok())
            {
                *tv.volume.lock().await = v;
            }
            json!([0])
        }
        ("audio", "setAudioMute") => {
            *tv.mute.lock().await = parsed["params"][0]["status"].as_bool().unwrap_or(false);
            json!([0])
        }
        ("appControl", "getApplicationList") => json!([tv.apps.lock().await.clone()]),
        ("appControl", "setActiveApp") => json!([]),
        ("avContent", "getCurrentExternalInputsStatus") => {
            json!([tv.inputs.lock().await.clone()])
        }
        ("avContent", "setPlayContent") => json!([]),
        _ => {
            return Json(json!({"error": [12, "No Such Method"], "id": 1})).into_response();
        }
    };

    Json(json!({"result": result, "id": 1})).into_response()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// ── wiring helpers ────────────────────────────────────────────────────────────

/// Profile store with one configured profile pointing at the mock device.
pub async fn profiles_for(tv: &MockTv) -> ProfileStore {
    let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));
    profiles.ensure_default().await.unwrap();
    profiles
        .save_active("Test TV", &tv.base_url(), TEST_PSK)
        .await
        .unwrap();
    profiles
}

pub async fn client_for(tv: &MockTv) -> (RpcClient, ProfileStore) {
    let profiles = profiles_for(tv).await;
    let client = RpcClient::new(profiles.clone()).unwrap();
    (client, profiles)
}

pub async fn session_for(tv: &MockTv) -> Session {
    let (client, profiles) = client_for(tv).await;
    Session::new(profiles, client)
}
