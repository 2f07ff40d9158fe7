use serde::{Deserialize, Serialize};

use crate::common::types::ChannelId;

/// Channels the RTP connector is allowed to join.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct VoiceConfig {
    #[serde(default)]
    pub channels: Vec<VoiceChannelConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VoiceChannelConfig {
    pub id: ChannelId,
    /// UDP destination for the RTP stream, e.g. `127.0.0.1:5004`.
    pub address: String,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
}

impl VoiceConfig {
    pub fn channel(&self, id: ChannelId) -> Option<&VoiceChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }
}

fn default_bitrate_kbps() -> u32 {
    64
}
