//! Wire protocol: status-line emission and click decoding.
//!
//! The outgoing stream is the i3bar format: one header object, then an
//! infinite JSON array holding one array of block objects per pass. The
//! incoming stream mirrors it with one click object per line, each
//! possibly prefixed with the array separator.

use std::io::Write;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::block::BlockState;
use crate::models::click::{Click, ClickEvent};

#[derive(Debug, Serialize)]
struct Header {
    version: u32,
    click_events: bool,
}

/// One block as rendered on the wire. Empty optional attributes are
/// omitted so the bar falls back to its own defaults.
#[derive(Debug, Serialize)]
struct WireBlock<'a> {
    name: &'a str,
    instance: &'a str,
    full_text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    short_text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    color: &'a str,
    urgent: bool,
}

impl<'a> From<&'a BlockState> for WireBlock<'a> {
    fn from(block: &'a BlockState) -> Self {
        Self {
            name: &block.config.name,
            instance: &block.config.instance,
            full_text: &block.full_text,
            short_text: &block.short_text,
            color: &block.color,
            urgent: block.urgent,
        }
    }
}

/// Writes the outgoing status-line stream.
pub struct Emitter<W: Write> {
    out: W,
    first: bool,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W) -> Self {
        Self { out, first: true }
    }

    /// Write the protocol header and open the infinite array. Called once
    /// before the first status line.
    pub fn write_header(&mut self) -> Result<()> {
        let header = Header {
            version: 1,
            click_events: true,
        };
        let encoded = serde_json::to_string(&header).context("failed to encode the header")?;

        writeln!(self.out, "{encoded}").context("failed to write the header")?;
        writeln!(self.out, "[").context("failed to open the status-line array")?;
        self.out.flush().context("failed to flush the header")?;
        Ok(())
    }

    /// Write the full ordered block array as one element of the infinite
    /// array, separator-prefixed after the first.
    pub fn write_status_line(&mut self, blocks: &[BlockState]) -> Result<()> {
        let rendered: Vec<WireBlock> = blocks.iter().map(WireBlock::from).collect();
        let encoded =
            serde_json::to_string(&rendered).context("failed to encode the status line")?;

        if self.first {
            self.first = false;
            writeln!(self.out, "{encoded}").context("failed to write the status line")?;
        } else {
            writeln!(self.out, ",{encoded}").context("failed to write the status line")?;
        }
        self.out.flush().context("failed to flush the status line")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawClick {
    #[serde(default)]
    name: String,
    #[serde(default)]
    instance: String,
    #[serde(default)]
    button: Value,
    #[serde(default)]
    x: Value,
    #[serde(default)]
    y: Value,
}

/// Decode one click payload.
///
/// Tolerates the array separator the bar prefixes to every payload after
/// the first, and accepts `button`/`x`/`y` as either JSON strings or
/// numbers, forwarded verbatim as strings. Malformed payloads decode to
/// `None`.
pub fn parse_click(payload: &str) -> Option<ClickEvent> {
    let object = payload
        .trim_start()
        .trim_start_matches(',')
        .trim_start();

    let raw: RawClick = serde_json::from_str(object).ok()?;

    Some(ClickEvent {
        name: raw.name,
        instance: raw.instance,
        click: Click {
            button: value_to_string(&raw.button),
            x: value_to_string(&raw.x),
            y: value_to_string(&raw.y),
        },
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
