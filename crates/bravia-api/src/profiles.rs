//! Named TV endpoints and the pointer to the one currently driven.
//!
//! Persisted under exactly two keys, `profiles` and `activeProfileId`, so an
//! existing store written by earlier builds keeps working. Reads always go
//! back to the store; mutations are read-modify-write over the full set.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::KvStore;

pub const KEY_PROFILES: &str = "profiles";
pub const KEY_ACTIVE: &str = "activeProfileId";

pub const DEFAULT_PROFILE_ID: &str = "tv_default";
pub const DEFAULT_PROFILE_NAME: &str = "Bravia";

/// Name given to freshly added profiles, matching what earlier builds wrote.
pub const NEW_PROFILE_NAME: &str = "Neuer TV";

/// One stored TV endpoint. Empty `url`/`psk` mean "not configured yet";
/// such a profile exists but cannot be called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub url: String,
    pub psk: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            url: String::new(),
            psk: String::new(),
        }
    }
}

impl Profile {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.psk.is_empty()
    }
}

fn default_profile() -> Profile {
    Profile {
        id: DEFAULT_PROFILE_ID.to_string(),
        name: DEFAULT_PROFILE_NAME.to_string(),
        url: String::new(),
        psk: String::new(),
    }
}

/// Result of a store read: the full ordered list plus the resolved active
/// profile. `active` is `None` only when the list is empty.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    pub profiles: Vec<Profile>,
    pub active: Option<Profile>,
}

// ── id generation ─────────────────────────────────────────────────────────────

fn generate_id() -> String {
    use rand::Rng;
    let entropy: u64 = rand::thread_rng().gen();
    format!("tv_{:x}{:x}", entropy, chrono::Utc::now().timestamp_millis())
}

/// Uniqueness is checked against the current set, not assumed from entropy.
fn fresh_id(existing: &[Profile]) -> String {
    fresh_id_from(generate_id, existing)
}

/// Draws candidates until one misses every existing id.
fn fresh_id_from(mut candidate: impl FnMut() -> String, existing: &[Profile]) -> String {
    loop {
        let id = candidate();
        if !existing.iter().any(|p| p.id == id) {
            return id;
        }
    }
}

// ── store ─────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ProfileStore {
    store: Arc<dyn KvStore>,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Read the stored set. The active profile falls back to the first entry
    /// when the stored pointer matches nothing; the corrected pointer is not
    /// written back here, it heals on the next mutation.
    pub async fn list(&self) -> Result<ProfileSet> {
        let raw = self.store.get(&[KEY_PROFILES, KEY_ACTIVE]).await?;

        let profiles: Vec<Profile> = match raw.get(KEY_PROFILES) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("stored profile list is unreadable, treating as empty: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let active_id = raw
            .get(KEY_ACTIVE)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let active = match active_id {
            Some(id) => profiles
                .iter()
                .find(|p| p.id == id)
                .or_else(|| profiles.first())
                .cloned(),
            None => profiles.first().cloned(),
        };

        Ok(ProfileSet { profiles, active })
    }

    /// Atomically overwrite the whole sequence and the active pointer.
    pub async fn replace(&self, profiles: &[Profile], active_id: &str) -> Result<()> {
        let entries = HashMap::from([
            (KEY_PROFILES.to_string(), serde_json::to_value(profiles)?),
            (KEY_ACTIVE.to_string(), json!(active_id)),
        ]);
        self.store.set(entries).await
    }

    /// Seed one unconfigured default profile iff the store is empty.
    pub async fn ensure_default(&self) -> Result<()> {
        let set = self.list().await?;
        if !set.profiles.is_empty() {
            return Ok(());
        }
        let seed = default_profile();
        debug!("seeding default profile {}", seed.id);
        self.replace(&[seed], DEFAULT_PROFILE_ID).await
    }

    /// Append a blank profile with a fresh unique id and make it active.
    pub async fn add(&self) -> Result<Profile> {
        let mut set = self.list().await?;
        let profile = Profile {
            id: fresh_id(&set.profiles),
            name: NEW_PROFILE_NAME.to_string(),
            url: String::new(),
            psk: String::new(),
        };
        let id = profile.id.clone();
        set.profiles.push(profile.clone());
        self.replace(&set.profiles, &id).await?;
        Ok(profile)
    }

    /// Remove the profile with the given id. Refused when it would leave the
    /// store empty; removing the active profile moves the pointer to the
    /// first remaining entry. An unknown id changes nothing.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let set = self.list().await?;
        if set.profiles.len() <= 1 {
            return Err(Error::Validation(
                "the last profile cannot be removed".to_string(),
            ));
        }

        let remaining: Vec<Profile> = set
            .profiles
            .iter()
            .filter(|p| p.id != id)
            .cloned()
            .collect();
        if remaining.len() == set.profiles.len() {
            debug!("remove: no profile with id {id}");
            return Ok(());
        }

        let was_active = set.active.as_ref().is_some_and(|a| a.id == id);
        let next_active = if was_active {
            remaining[0].id.clone()
        } else {
            set.active.map(|a| a.id).unwrap_or_else(|| remaining[0].id.clone())
        };
        self.replace(&remaining, &next_active).await
    }

    /// Point the active marker at `id`. Returns whether anything changed;
    /// an unknown id is a no-op.
    pub async fn select(&self, id: &str) -> Result<bool> {
        let set = self.list().await?;
        if !set.profiles.iter().any(|p| p.id == id) {
            return Ok(false);
        }
        self.replace(&set.profiles, id).await?;
        Ok(true)
    }

    /// Overwrite the active profile's fields. A blank name keeps the old
    /// one; the url is trimmed; the key is stored verbatim.
    pub async fn save_active(&self, name: &str, url: &str, psk: &str) -> Result<Profile> {
        let set = self.list().await?;
        let active = set
            .active
            .ok_or_else(|| Error::Validation("no active profile to save".to_string()))?;

        let name = name.trim();
        let updated = Profile {
            id: active.id.clone(),
            name: if name.is_empty() {
                active.name.clone()
            } else {
                name.to_string()
            },
            url: url.trim().to_string(),
            psk: psk.to_string(),
        };

        let profiles: Vec<Profile> = set
            .profiles
            .into_iter()
            .map(|p| if p.id == active.id { updated.clone() } else { p })
            .collect();
        self.replace(&profiles, &active.id).await?;
        Ok(updated)
    }
}
