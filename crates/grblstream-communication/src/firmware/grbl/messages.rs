//! GRBL message taxonomy
//!
//! Every classified inbound line becomes exactly one [`Message`]. Push
//! messages (welcome, alarm, status, settings, feedback, startup blocks)
//! may arrive at any time; a [`Response`] arrives once per queued command.

use super::error_decoder::{describe_alarm, describe_error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status report fields keyed by name; the machine state is under `"mode"`
pub type StatusFields = BTreeMap<String, StatusValue>;

/// Key holding the machine state (`Idle`, `Run`, `Hold:0`, ...) in a status report
pub const MODE_KEY: &str = "mode";

/// One element of a comma-separated status value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusScalar {
    /// Element that parsed as a float
    Number(f64),
    /// Element left as text
    Text(String),
}

impl StatusScalar {
    fn parse(item: &str) -> Self {
        match item.parse::<f64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(item.to_string()),
        }
    }

    /// Numeric value, if this element parsed as a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Value of one status report field
///
/// Single values stay text exactly as reported; comma-separated values
/// become lists with per-element numeric conversion. Mixed lists are legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    /// Comma-separated list
    List(Vec<StatusScalar>),
    /// Single value
    Text(String),
}

impl StatusValue {
    /// Parse a raw field value
    pub fn parse(raw: &str) -> Self {
        if raw.contains(',') {
            Self::List(raw.split(',').map(StatusScalar::parse).collect())
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// Text of a single value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// Single value parsed as a number (e.g. `F:500`)
    pub fn as_f64(&self) -> Option<f64> {
        self.as_text().and_then(|s| s.parse().ok())
    }

    /// Numeric elements of a list, `None` if any element is not numeric
    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        match self {
            Self::List(items) => items.iter().map(StatusScalar::as_f64).collect(),
            Self::Text(_) => None,
        }
    }
}

/// Acknowledgment of one queued command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// `ok`
    Ok,
    /// `error:<code>`
    Error {
        /// Error code as reported
        code: String,
    },
}

/// A classified GRBL line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Boot banner, e.g. `Grbl 1.1f ['$' for help]`
    Welcome {
        /// Version token
        version: String,
    },
    /// `ALARM:<code>`
    Alarm {
        /// Alarm code as reported
        code: String,
    },
    /// `<Idle|MPos:0.000,0.000,0.000|FS:0,0>`
    Status {
        /// Fields including `"mode"`
        fields: StatusFields,
    },
    /// `$<name>=<value>`
    Setting {
        /// Setting name without `$`
        name: String,
        /// Raw value
        value: String,
    },
    /// `[MSG:<text>]`
    Feedback {
        /// Message text
        text: String,
    },
    /// `><block>:ok` or `><block>:error:<code>`
    StartupBlock {
        /// Executed block text
        block: String,
        /// Whether the block executed cleanly
        valid: bool,
        /// Error code when the block failed
        error_code: Option<String>,
    },
    /// `ok` or `error:<code>`
    Response(Response),
}

impl Message {
    /// Machine state of a status report
    pub fn mode(&self) -> Option<&str> {
        match self {
            Message::Status { fields } => fields.get(MODE_KEY).and_then(StatusValue::as_text),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome { version } => write!(f, "welcome:{}", version),
            Self::Alarm { code } => match describe_alarm(code) {
                Some(desc) => write!(f, "ALARM:{} - {}", code, desc),
                None => write!(f, "ALARM:{}", code),
            },
            Self::Status { fields } => match fields.get(MODE_KEY).and_then(StatusValue::as_text) {
                Some(mode) => write!(f, "status:{} ({} fields)", mode, fields.len()),
                None => write!(f, "status ({} fields)", fields.len()),
            },
            Self::Setting { name, value } => write!(f, "setting:${}={}", name, value),
            Self::Feedback { text } => write!(f, "feedback:{}", text),
            Self::StartupBlock {
                block,
                valid: true,
                ..
            } => write!(f, "startup:{}:ok", block),
            Self::StartupBlock {
                block, error_code, ..
            } => write!(
                f,
                "startup:{}:error:{}",
                block,
                error_code.as_deref().unwrap_or("?")
            ),
            Self::Response(Response::Ok) => write!(f, "ok"),
            Self::Response(Response::Error { code }) => match describe_error(code) {
                Some(desc) => write!(f, "error:{} - {}", code, desc),
                None => write!(f, "error:{}", code),
            },
        }
    }
}
