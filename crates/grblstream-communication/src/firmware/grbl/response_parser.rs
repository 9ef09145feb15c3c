//! GRBL line parser
//!
//! Classifies one trimmed line into a [`Message`]. Rules are tried in a
//! fixed order and the first match wins, even when a later rule would also
//! match:
//!
//! 1. contains `Grbl`        -> `Welcome`
//! 2. contains `ALARM`       -> `Alarm`
//! 3. starts with `$`        -> `Setting`
//! 4. equals `ok`            -> `Response::Ok`
//! 5. starts with `error:`   -> `Response::Error`
//! 6. starts with `[MSG:`    -> `Feedback`
//! 7. starts with `<`        -> `Status`
//! 8. starts with `>`        -> `StartupBlock`
//!
//! A line matching no rule, or matching a rule but missing the part that
//! rule needs, yields `None`. That is never an error.

use super::messages::{Message, Response, StatusFields, StatusValue, MODE_KEY};

/// Classify one non-empty, trimmed line
pub fn parse_line(line: &str) -> Option<Message> {
    if line.is_empty() {
        return None;
    }

    if line.contains("Grbl") {
        let version = line.split_whitespace().nth(1)?;
        return Some(Message::Welcome {
            version: version.to_string(),
        });
    }

    if line.contains("ALARM") {
        let (_, code) = line.split_once(':')?;
        return Some(Message::Alarm {
            code: code.to_string(),
        });
    }

    if let Some(setting) = line.strip_prefix('$') {
        let (name, value) = setting.split_once('=')?;
        return Some(Message::Setting {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    if line == "ok" {
        return Some(Message::Response(Response::Ok));
    }

    if let Some(code) = line.strip_prefix("error:") {
        return Some(Message::Response(Response::Error {
            code: code.to_string(),
        }));
    }

    if let Some(feedback) = line.strip_prefix("[MSG:") {
        let text = feedback.strip_suffix(']').unwrap_or(feedback);
        return Some(Message::Feedback {
            text: text.to_string(),
        });
    }

    if let Some(report) = line.strip_prefix('<') {
        return Some(Message::Status {
            fields: parse_status_fields(report.strip_suffix('>').unwrap_or(report)),
        });
    }

    if let Some(startup) = line.strip_prefix('>') {
        let mut parts = startup.split(':');
        let block = parts.next()?;
        let outcome = parts.next()?;
        let valid = outcome == "ok";
        let error_code = if valid {
            None
        } else {
            parts.next().map(str::to_string)
        };
        return Some(Message::StartupBlock {
            block: block.to_string(),
            valid,
            error_code,
        });
    }

    None
}

/// Decode raw line bytes, then classify
///
/// Undecodable bytes are logged at `warn` and dropped; unrecognized text
/// is logged at `debug`. Blank lines are ignored silently.
pub fn decode_line(raw: &[u8]) -> Option<Message> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Dropping undecodable line ({} bytes): {}", raw.len(), e);
            return None;
        }
    };

    let line = text.trim();
    if line.is_empty() {
        return None;
    }

    tracing::debug!("RECV: {}", line);

    let message = parse_line(line);
    if message.is_none() {
        tracing::debug!("Unrecognized line dropped: {}", line);
    }
    message
}

/// Split the inside of `<...>` into mode and key/value fields
fn parse_status_fields(report: &str) -> StatusFields {
    let mut segments = report.split('|');
    let mut fields = StatusFields::new();

    if let Some(mode) = segments.next() {
        fields.insert(MODE_KEY.to_string(), StatusValue::Text(mode.to_string()));
    }

    for segment in segments {
        match segment.split_once(':') {
            Some((key, value)) => {
                fields.insert(key.to_string(), StatusValue::parse(value));
            }
            None => tracing::trace!("Status segment without value: {}", segment),
        }
    }

    fields
}
