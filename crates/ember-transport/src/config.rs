use serde::Deserialize;
use thiserror::Error;

use crate::chunk::{FRAMES_PER_PACKET, MAX_CHUNK_PAYLOAD};
use crate::packet::ACK_WINDOW;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfigInput {
    pub version: u32,
    pub chunk_window: Option<usize>,
    pub record_log_capacity: Option<usize>,
    pub max_chunk_payload: Option<usize>,
    pub ack_window: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Chunks kept for repetition, addressed by frame index.
    pub chunk_window: usize,
    /// In-flight packet records awaiting feedback.
    pub record_log_capacity: usize,
    pub max_chunk_payload: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_window: 1024,
            record_log_capacity: 256,
            max_chunk_payload: MAX_CHUNK_PAYLOAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Reassembly window, addressed by frame index.
    pub chunk_window: usize,
    /// Sequence numbers echoed back per feedback section.
    pub ack_window: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            chunk_window: 1024,
            ack_window: ACK_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub version: u32,
    pub chunk_window: usize,
    pub record_log_capacity: usize,
    pub max_chunk_payload: usize,
    pub ack_window: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let sender = SenderConfig::default();
        Self {
            version: CONFIG_VERSION,
            chunk_window: sender.chunk_window,
            record_log_capacity: sender.record_log_capacity,
            max_chunk_payload: sender.max_chunk_payload,
            ack_window: ReceiverConfig::default().ack_window,
        }
    }
}

impl TransportConfigInput {
    pub fn resolve(self) -> Result<TransportConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = TransportConfig::default();
        Ok(TransportConfig {
            version,
            chunk_window: self
                .chunk_window
                .unwrap_or(defaults.chunk_window)
                .max(FRAMES_PER_PACKET),
            record_log_capacity: self
                .record_log_capacity
                .unwrap_or(defaults.record_log_capacity)
                .max(1),
            max_chunk_payload: self
                .max_chunk_payload
                .unwrap_or(defaults.max_chunk_payload)
                .clamp(1, MAX_CHUNK_PAYLOAD),
            ack_window: self
                .ack_window
                .unwrap_or(defaults.ack_window)
                .clamp(1, ACK_WINDOW),
        })
    }
}

impl TransportConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(TransportConfig::default());
        }
        let parsed: TransportConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn sender(&self) -> SenderConfig {
        SenderConfig {
            chunk_window: self.chunk_window,
            record_log_capacity: self.record_log_capacity,
            max_chunk_payload: self.max_chunk_payload,
        }
    }

    pub fn receiver(&self) -> ReceiverConfig {
        ReceiverConfig {
            chunk_window: self.chunk_window,
            ack_window: self.ack_window,
        }
    }
}
