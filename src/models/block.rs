//! Block configuration and runtime state.

use serde::Deserialize;
use std::process::Child;
use std::time::{SystemTime, UNIX_EPOCH};

use super::click::Click;

/// Maximum bytes kept in any single display field.
pub const FIELD_CAPACITY: usize = 1024;

/// Color forced onto a block whose execution failed.
pub const ALERT_COLOR: &str = "#FF0000";

/// Immutable per-block configuration, loaded once at startup.
///
/// The pair `(name, instance)` is the block's identity and must be unique
/// within the block set so that click routing is unambiguous.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    pub name: String,
    #[serde(default)]
    pub instance: String,
    /// Shell command to run; empty means a static block that only shows
    /// its preset display values.
    #[serde(default)]
    pub command: String,
    /// Refresh period in seconds; 0 means the block never auto-updates.
    #[serde(default)]
    pub interval: u64,
    /// Raw signal number that re-triggers this block; 0 means none.
    #[serde(default)]
    pub signal: i32,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub short_text: String,
    #[serde(default)]
    pub color: String,
}

/// Mutable runtime state of one block. Lives for the whole process.
///
/// The running child and its captured stdout pipe travel together inside
/// `Child`, so either there is no child or there is a child with a valid
/// pipe; the two can never disagree.
#[derive(Debug)]
pub struct BlockState {
    pub config: BlockConfig,
    pub full_text: String,
    pub short_text: String,
    pub color: String,
    pub urgent: bool,
    /// Unix seconds of the last completed execution; 0 until the block has
    /// run at least once, which drives the one-time first-run trigger.
    pub last_update: u64,
    pub pending_click: Option<Click>,
    pub child: Option<Child>,
}

impl BlockState {
    pub fn new(config: BlockConfig) -> Self {
        let full_text = truncated(&config.full_text);
        let short_text = truncated(&config.short_text);
        let color = truncated(&config.color);

        Self {
            config,
            full_text,
            short_text,
            color,
            urgent: false,
            last_update: 0,
            pending_click: None,
            child: None,
        }
    }

    /// Restore the display fields to the configured presets, so stale
    /// per-invocation state never leaks into the next run. Does not touch
    /// the pending click, the timestamp or the child handle.
    pub fn reset_display(&mut self) {
        self.full_text = truncated(&self.config.full_text);
        self.short_text = truncated(&self.config.short_text);
        self.color = truncated(&self.config.color);
        self.urgent = false;
    }

    pub fn set_full_text(&mut self, text: &str) {
        self.full_text = truncated(text);
    }

    pub fn set_short_text(&mut self, text: &str) {
        self.short_text = truncated(text);
    }

    pub fn set_color(&mut self, text: &str) {
        self.color = truncated(text);
    }

    pub fn is_static(&self) -> bool {
        self.config.command.is_empty()
    }
}

/// Copy a display value, cutting at `FIELD_CAPACITY` on a char boundary.
pub fn truncated(text: &str) -> String {
    if text.len() <= FIELD_CAPACITY {
        return text.to_string();
    }

    let mut end = FIELD_CAPACITY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Current wall-clock time as unix seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
