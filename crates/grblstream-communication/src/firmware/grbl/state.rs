//! Device state tracking
//!
//! [`DeviceState`] is a pure fold over incoming messages. The
//! [`StateTracker`] owns the only mutable copy; everyone else reads
//! snapshots, which may lag the wire by the message being processed.

use super::messages::{Message, StatusFields, StatusValue, MODE_KEY};
use grblstream_core::{thread_safe_rw, ThreadSafeRw};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Controller state as seen from the message stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Firmware version from the last boot banner
    pub version: Option<String>,
    /// Last reported alarm code
    pub alarm_code: Option<String>,
    /// Merged status report fields
    pub status: StatusFields,
    /// `$` settings by name
    pub settings: BTreeMap<String, String>,
}

impl DeviceState {
    /// Fold one message into the state
    ///
    /// Status fields are merged key by key and stale keys persist until
    /// overwritten. A boot banner starts over: version replaced, alarm and
    /// status cleared. Settings survive reboots.
    pub fn apply(&mut self, message: &Message) {
        match message {
            Message::Welcome { version } => {
                self.version = Some(version.clone());
                self.alarm_code = None;
                self.status.clear();
            }
            Message::Alarm { code } => {
                self.alarm_code = Some(code.clone());
            }
            Message::Setting { name, value } => {
                self.settings.insert(name.clone(), value.clone());
            }
            Message::Status { fields } => {
                for (key, value) in fields {
                    self.status.insert(key.clone(), value.clone());
                }
            }
            Message::Feedback { .. } | Message::StartupBlock { .. } | Message::Response(_) => {}
        }
    }

    /// Machine state from the last status report (`Idle`, `Run`, `Alarm`, ...)
    pub fn mode(&self) -> Option<&str> {
        self.status.get(MODE_KEY).and_then(StatusValue::as_text)
    }

    /// Check if the last reported mode is an alarm
    pub fn is_alarmed(&self) -> bool {
        self.mode().is_some_and(|mode| mode.starts_with("Alarm"))
    }

    /// Value of a `$` setting
    pub fn setting(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    /// One status field
    pub fn status_field(&self, key: &str) -> Option<&StatusValue> {
        self.status.get(key)
    }
}

/// Sole owner of the live [`DeviceState`]
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    state: ThreadSafeRw<DeviceState>,
}

impl StateTracker {
    /// Create a tracker with empty state
    pub fn new() -> Self {
        Self {
            state: thread_safe_rw(DeviceState::default()),
        }
    }

    /// Fold a message into the live state
    pub fn apply(&self, message: &Message) {
        self.state.write().apply(message);
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> DeviceState {
        self.state.read().clone()
    }
}
