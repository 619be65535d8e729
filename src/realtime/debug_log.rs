//! Append-only debug log, mirrored to `tracing`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for DebugLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.message
        )
    }
}

/// Ordered log of everything the session did. Entries are never pruned.
#[derive(Debug, Default)]
pub struct DebugLog {
    entries: Vec<DebugLogEntry>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "rtc_session::debug_log", "{message}");
        self.entries.push(DebugLogEntry {
            at: Utc::now(),
            message,
        });
    }

    pub fn entries(&self) -> &[DebugLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order_and_render_with_timestamp() {
        let mut log = DebugLog::new();
        log.push("Peer connection created");
        log.push(String::from("Data channel opened"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].message, "Peer connection created");
        let rendered = log.entries()[1].to_string();
        assert!(rendered.ends_with("Z: Data channel opened"), "{rendered}");
        assert!(log.contains("channel opened"));
    }
}
