//! Session: one attached controller instance owning all runtime state.
//!
//! Everything that used to be ad-hoc globals (poll timer, volume busy flag,
//! editor pin) lives here, so independent sessions can run side by side and
//! tests can drive one without touching process state.
//!
//!   start()                    stop() / set_visible(false)
//!     │                           │
//!     ▼                           ▼
//!   seed default profile      abort poll task
//!   load IR capabilities
//!   spawn poll task ──poll──► StatusSnapshot ──broadcast──► subscribers
//!
//! Each poll carries a tick id; a slow poll whose id is no longer the latest
//! dispatched is discarded instead of overwriting a newer snapshot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capabilities::IrCodeMap;
use crate::client::RpcClient;
use crate::error::{Error, Result};
use crate::profiles::{Profile, ProfileSet, ProfileStore};
use crate::protocol::{self, AppInfo, InputInfo, PowerState, VolumeInfo};

/// Fixed status poll cadence while the session is visible.
pub const POLL_INTERVAL_MS: u64 = 5000;

/// One complete status observation. Published as a unit; a failed poll
/// yields an unreachable snapshot rather than partial fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Id of the poll that produced this snapshot.
    pub tick: u64,
    pub power: PowerState,
    pub volume: Option<i32>,
    pub muted: Option<bool>,
    pub reachable: bool,
    /// True while a manual volume set is in flight; views should leave the
    /// volume control alone.
    pub volume_busy: bool,
    /// Normalized base URL of the active profile, `None` when unconfigured.
    pub endpoint: Option<String>,
}

struct SessionShared {
    /// Latest dispatched poll id. A completed poll publishes only while its
    /// own id still equals this counter.
    ticks: AtomicU64,
    busy_volume: AtomicBool,
    editor_pinned: AtomicBool,
    ir_map: RwLock<IrCodeMap>,
    last_snapshot: RwLock<Option<StatusSnapshot>>,
    snapshot_tx: broadcast::Sender<StatusSnapshot>,
}

pub struct Session {
    client: RpcClient,
    profiles: ProfileStore,
    shared: Arc<SessionShared>,
    poll_interval_ms: u64,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(profiles: ProfileStore, client: RpcClient) -> Self {
        Self::with_poll_interval(profiles, client, POLL_INTERVAL_MS)
    }

    pub fn with_poll_interval(
        profiles: ProfileStore,
        client: RpcClient,
        poll_interval_ms: u64,
    ) -> Self {
        let (snapshot_tx, _) = broadcast::channel(32);
        Self {
            client,
            profiles,
            shared: Arc::new(SessionShared {
                ticks: AtomicU64::new(0),
                busy_volume: AtomicBool::new(false),
                editor_pinned: AtomicBool::new(false),
                ir_map: RwLock::new(IrCodeMap::new()),
                last_snapshot: RwLock::new(None),
                snapshot_tx,
            }),
            poll_interval_ms,
            poll_task: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    // ── lifecycle ─────────────────────────────────────────────────────────────

    /// Attach: seed the default profile if the store is empty, load IR
    /// capabilities opportunistically, begin polling.
    pub async fn start(&self) -> Result<()> {
        self.profiles.ensure_default().await?;
        self.reload_capabilities().await;
        self.start_polling().await;
        Ok(())
    }

    pub async fn stop(&self) {
        self.stop_polling().await;
    }

    /// Hidden sessions stop the timer entirely; becoming visible re-polls
    /// immediately and restarts the interval.
    pub async fn set_visible(&self, visible: bool) {
        if visible {
            self.start_polling().await;
        } else {
            self.stop_polling().await;
        }
    }

    async fn start_polling(&self) {
        self.stop_polling().await;
        let client = self.client.clone();
        let profiles = self.profiles.clone();
        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_millis(self.poll_interval_ms);
        let handle = tokio::spawn(async move {
            loop {
                poll_once(&client, &profiles, &shared).await;
                tokio::time::sleep(interval).await;
            }
        });
        *self.poll_task.lock().await = Some(handle);
        info!("status polling started");
    }

    async fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().await.take() {
            handle.abort();
            debug!("status polling stopped");
        }
    }

    // ── snapshots ─────────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub async fn last_snapshot(&self) -> Option<StatusSnapshot> {
        self.shared.last_snapshot.read().await.clone()
    }

    /// One immediate poll outside the timer, e.g. after a user action.
    pub async fn refresh_once(&self) {
        poll_once(&self.client, &self.profiles, &self.shared).await;
    }

    // ── device intents ────────────────────────────────────────────────────────

    /// Probe the device once. Returns the reported power state so the view
    /// can phrase the outcome.
    pub async fn test_connection(&self) -> Result<PowerState> {
        self.client.power_status().await
    }

    /// Read current power, request the opposite, refresh. Returns whether
    /// the device was asked to turn on.
    pub async fn toggle_power(&self) -> Result<bool> {
        let current = self.client.power_status().await?;
        let turn_on = !current.is_on();
        self.client.set_power_status(turn_on).await?;
        self.refresh_once().await;
        Ok(turn_on)
    }

    /// Read current mute, request the opposite, refresh. Returns the
    /// requested mute state. An unknown current state counts as unmuted.
    pub async fn toggle_mute(&self) -> Result<bool> {
        let info = self.client.volume_info().await?;
        let muted = info.map(|v| v.mute).unwrap_or(false);
        self.client.set_mute(!muted).await?;
        self.refresh_once().await;
        Ok(!muted)
    }

    /// Set the speaker volume. The busy flag suppresses concurrent poll
    /// updates of the volume control; it is always cleared before the
    /// follow-up refresh, even when the call fails.
    pub async fn set_volume(&self, volume: i32) -> Result<()> {
        let volume = volume.clamp(0, 100);
        self.shared.busy_volume.store(true, Ordering::Relaxed);
        let result = self.client.set_volume(volume).await;
        self.shared.busy_volume.store(false, Ordering::Relaxed);
        self.refresh_once().await;
        result
    }

    /// Send a named infrared command through the current code table.
    pub async fn send_named_ir(&self, name: &str) -> Result<()> {
        let code = {
            let map = self.shared.ir_map.read().await;
            map.lookup(name).map(str::to_string)
        };
        match code {
            Some(code) => self.client.send_ircc(&code, None).await,
            None => Err(Error::UnknownCommand(name.to_string())),
        }
    }

    /// Query the device's command table and merge it over the fallback.
    /// Failures are swallowed; the previous table keeps working.
    pub async fn reload_capabilities(&self) -> bool {
        match self.client.remote_controller_info().await {
            Ok(result) => {
                let applied = self.shared.ir_map.write().await.refresh(&result);
                if applied {
                    info!("remote controller codes loaded");
                }
                applied
            }
            Err(e) => {
                debug!("capability reload failed, keeping current codes: {e}");
                false
            }
        }
    }

    pub async fn ir_command_names(&self) -> Vec<String> {
        let map = self.shared.ir_map.read().await;
        map.names().into_iter().map(str::to_string).collect()
    }

    pub async fn load_apps(&self) -> Result<Vec<AppInfo>> {
        self.client.application_list().await
    }

    pub async fn launch_app(&self, uri: &str) -> Result<()> {
        self.client.launch_app(uri).await
    }

    pub async fn load_inputs(&self) -> Result<Vec<InputInfo>> {
        self.client.input_list().await
    }

    pub async fn switch_input(&self, uri: &str) -> Result<()> {
        self.client.switch_input(uri).await
    }

    // ── profile intents ───────────────────────────────────────────────────────

    pub async fn list_profiles(&self) -> Result<ProfileSet> {
        self.profiles.list().await
    }

    /// Add a blank profile and pin the editor open so it can be filled in.
    pub async fn add_profile(&self) -> Result<Profile> {
        let profile = self.profiles.add().await?;
        self.shared.editor_pinned.store(true, Ordering::Relaxed);
        self.refresh_once().await;
        Ok(profile)
    }

    /// Switch the active profile. A successful switch unpins the editor and
    /// reloads capabilities for the new device.
    pub async fn select_profile(&self, id: &str) -> Result<bool> {
        let switched = self.profiles.select(id).await?;
        if switched {
            self.shared.editor_pinned.store(false, Ordering::Relaxed);
            self.reload_capabilities().await;
            self.refresh_once().await;
        }
        Ok(switched)
    }

    /// Overwrite the active profile's fields, then reload capabilities for
    /// the possibly-changed endpoint.
    pub async fn save_profile(&self, name: &str, url: &str, psk: &str) -> Result<Profile> {
        let profile = self.profiles.save_active(name, url, psk).await?;
        self.shared.editor_pinned.store(false, Ordering::Relaxed);
        self.reload_capabilities().await;
        self.refresh_once().await;
        Ok(profile)
    }

    /// Remove the active profile. Refused for the last one.
    pub async fn remove_active_profile(&self) -> Result<()> {
        let set = self.profiles.list().await?;
        let active = set
            .active
            .ok_or_else(|| Error::Validation("no active profile to remove".to_string()))?;
        self.profiles.remove(&active.id).await?;
        self.shared.editor_pinned.store(false, Ordering::Relaxed);
        self.reload_capabilities().await;
        self.refresh_once().await;
        Ok(())
    }

    /// Mark the editor as explicitly opened for the active profile.
    pub fn pin_editor(&self) {
        self.shared.editor_pinned.store(true, Ordering::Relaxed);
    }

    /// Whether a view should show the profile editor: pinned open, or the
    /// active profile is not yet configured.
    pub async fn editor_visible(&self) -> Result<bool> {
        if self.shared.editor_pinned.load(Ordering::Relaxed) {
            return Ok(true);
        }
        let set = self.profiles.list().await?;
        Ok(match set.active {
            Some(active) => !active.is_configured(),
            None => false,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.poll_task.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

// ── polling ───────────────────────────────────────────────────────────────────

async fn poll_once(client: &RpcClient, profiles: &ProfileStore, shared: &SessionShared) {
    let tick = shared.ticks.fetch_add(1, Ordering::SeqCst) + 1;

    let endpoint = match profiles.list().await {
        Ok(set) => set
            .active
            .filter(Profile::is_configured)
            .map(|p| protocol::normalize_base_url(&p.url)),
        Err(_) => None,
    };

    let snapshot = match probe(client).await {
        Ok((power, volume)) => StatusSnapshot {
            tick,
            power,
            volume: volume.as_ref().map(|v| v.volume),
            muted: volume.as_ref().map(|v| v.mute),
            reachable: true,
            volume_busy: shared.busy_volume.load(Ordering::Relaxed),
            endpoint,
        },
        Err(e) => {
            // background probe, never surfaced to the user
            debug!("status poll failed: {e}");
            StatusSnapshot {
                tick,
                power: PowerState::Unknown,
                volume: None,
                muted: None,
                reachable: false,
                volume_busy: shared.busy_volume.load(Ordering::Relaxed),
                endpoint,
            }
        }
    };

    publish_if_current(shared, snapshot).await;
}

/// Store and broadcast the snapshot iff its tick is still the latest
/// dispatched. The counter is re-read under the write lock, so a poll
/// overtaken between its probe and this point cannot land on top of the
/// newer snapshot.
async fn publish_if_current(shared: &SessionShared, snapshot: StatusSnapshot) -> bool {
    let mut guard = shared.last_snapshot.write().await;
    let latest = shared.ticks.load(Ordering::SeqCst);
    if snapshot.tick < latest {
        debug!(tick = snapshot.tick, latest, "discarding stale status snapshot");
        return false;
    }
    *guard = Some(snapshot.clone());
    let _ = shared.snapshot_tx.send(snapshot);
    true
}

async fn probe(client: &RpcClient) -> Result<(PowerState, Option<VolumeInfo>)> {
    let power = client.power_status().await?;
    let volume = client.volume_info().await?;
    Ok((power, volume))
}
