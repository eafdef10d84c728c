//! Command-name to infrared-code table.
//!
//! Seeded with codes common to every Bravia generation so the remote works
//! before (or without) a successful `getRemoteControllerInfo` call. A live
//! refresh rebuilds the table as fallback plus device overrides; it is never
//! persisted.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

/// Codes shared across Bravia models, usable with no capability query.
pub const FALLBACK_IR_CODES: &[(&str, &str)] = &[
    ("Power", "AAAAAQAAAAEAAAAVAw=="),
    ("VolumeUp", "AAAAAQAAAAEAAAASAw=="),
    ("VolumeDown", "AAAAAQAAAAEAAAATAw=="),
    ("Mute", "AAAAAQAAAAEAAAAUAw=="),
    ("ChannelUp", "AAAAAQAAAAEAAAAQAw=="),
    ("ChannelDown", "AAAAAQAAAAEAAAARAw=="),
    ("Up", "AAAAAQAAAAEAAAB0Aw=="),
    ("Down", "AAAAAQAAAAEAAAB1Aw=="),
    ("Left", "AAAAAQAAAAEAAAA0Aw=="),
    ("Right", "AAAAAQAAAAEAAAAzAw=="),
    ("Confirm", "AAAAAQAAAAEAAABlAw=="),
    ("Home", "AAAAAQAAAAEAAABgAw=="),
    ("Return", "AAAAAgAAAJcAAAAjAw=="),
    ("Options", "AAAAAgAAAJcAAAA2Aw=="),
    ("Input", "AAAAAQAAAAEAAAAlAw=="),
    ("Display", "AAAAAQAAAAEAAAA6Aw=="),
];

#[derive(Debug, Clone)]
pub struct IrCodeMap {
    codes: HashMap<String, String>,
}

impl Default for IrCodeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IrCodeMap {
    pub fn new() -> Self {
        Self {
            codes: fallback_map(),
        }
    }

    /// Rebuild the table from a `getRemoteControllerInfo` result. Element 0
    /// is a version label and is ignored; element 1 must be a list of
    /// `{name, value}` entries. Entries with a blank name or value are
    /// skipped. Returns whether at least one entry was applied; when none
    /// is, the previous table stays authoritative.
    pub fn refresh(&mut self, result: &[Value]) -> bool {
        let list = match result.get(1) {
            Some(Value::Array(list)) => list,
            _ => {
                debug!("remote controller info without a command list, keeping current table");
                return false;
            }
        };

        let mut overrides = HashMap::new();
        for item in list {
            let name = item.get("name").and_then(Value::as_str).unwrap_or("");
            let value = item.get("value").and_then(Value::as_str).unwrap_or("");
            if name.is_empty() || value.is_empty() {
                continue;
            }
            overrides.insert(name.to_string(), value.to_string());
        }
        if overrides.is_empty() {
            debug!("remote controller info carried no usable entries");
            return false;
        }

        let mut codes = fallback_map();
        let applied = overrides.len();
        codes.extend(overrides);
        self.codes = codes;
        debug!("applied {applied} remote controller entries");
        true
    }

    /// Exact-match lookup, no aliasing or case folding.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.codes.get(name).map(String::as_str)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn fallback_map() -> HashMap<String, String> {
    FALLBACK_IR_CODES
        .iter()
        .map(|(name, code)| (name.to_string(), code.to_string()))
        .collect()
}
