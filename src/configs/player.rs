use serde::{Deserialize, Serialize};

use crate::audio::constants::{DEFAULT_BITRATE_KBPS, PACKET_CHANNEL_CAPACITY, PROBE_TIMEOUT_SECS};

/// Which probe strategy runs first.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethodConfig {
    #[default]
    Native,
    Fallback,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// Transcoder executable name or path.
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default)]
    pub probe_method: ProbeMethodConfig,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Re-encode target used when neither probe nor transport know better.
    #[serde(default = "default_bitrate_kbps")]
    pub default_bitrate_kbps: u32,
    /// Extra arguments placed before `-i`.
    #[serde(default)]
    pub before_options: Vec<String>,
    /// Extra arguments placed after the output codec settings.
    #[serde(default)]
    pub options: Vec<String>,
    /// Report a truncated container as a track exception instead of ending
    /// the track quietly.
    #[serde(default)]
    pub strict_stream_end: bool,
    #[serde(default = "default_packet_buffer")]
    pub packet_buffer: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            probe_method: ProbeMethodConfig::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
            default_bitrate_kbps: default_bitrate_kbps(),
            before_options: Vec::new(),
            options: Vec::new(),
            strict_stream_end: false,
            packet_buffer: default_packet_buffer(),
        }
    }
}

fn default_executable() -> String {
    "ffmpeg".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    PROBE_TIMEOUT_SECS
}

fn default_bitrate_kbps() -> u32 {
    DEFAULT_BITRATE_KBPS
}

fn default_packet_buffer() -> usize {
    PACKET_CHANNEL_CAPACITY
}
