//! Block set configuration.
//!
//! A TOML file holding an array of `[[block]]` tables, in display order:
//!
//! ```toml
//! [[block]]
//! name = "volume"
//! command = "vol.sh"
//! interval = 10
//! signal = 10
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use serde::Deserialize;
use thiserror::Error;

use crate::models::block::BlockConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("duplicate block identity ({name}, {instance})")]
    DuplicateIdentity { name: String, instance: String },
    #[error("block {name}: unknown signal number {signal}")]
    UnknownSignal { name: String, signal: i32 },
    #[error("block {name}: signal {signal} is reserved for shutdown")]
    ReservedSignal { name: String, signal: i32 },
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "block")]
    blocks: Vec<BlockConfig>,
}

/// Load and validate the block set from a config file.
pub fn load(path: &Path) -> Result<Vec<BlockConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    parse(&content).with_context(|| format!("invalid config file: {}", path.display()))
}

/// Parse and validate a block set from TOML content.
pub fn parse(content: &str) -> Result<Vec<BlockConfig>> {
    let file: ConfigFile = toml::from_str(content).context("failed to parse TOML")?;
    validate(&file.blocks)?;
    Ok(file.blocks)
}

/// Reject configurations the scheduler cannot honor: ambiguous click
/// routing, signal numbers unknown to the host, or signals the scheduler
/// reserves for its own shutdown.
pub fn validate(blocks: &[BlockConfig]) -> Result<(), ConfigError> {
    for (index, block) in blocks.iter().enumerate() {
        if block.name.is_empty() {
            return Err(ConfigError::EmptyName { index });
        }

        for prior in &blocks[..index] {
            if prior.name == block.name && prior.instance == block.instance {
                return Err(ConfigError::DuplicateIdentity {
                    name: block.name.clone(),
                    instance: block.instance.clone(),
                });
            }
        }

        if block.signal != 0 {
            let signal =
                Signal::try_from(block.signal).map_err(|_| ConfigError::UnknownSignal {
                    name: block.name.clone(),
                    signal: block.signal,
                })?;

            if matches!(signal, Signal::SIGINT | Signal::SIGTERM) {
                return Err(ConfigError::ReservedSignal {
                    name: block.name.clone(),
                    signal: block.signal,
                });
            }
        }
    }

    Ok(())
}
