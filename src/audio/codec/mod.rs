//! Passthrough-or-re-encode policy.
//!
//! Probing costs a short delay before the transcoder starts, and buys the
//! option of copying Opus packets untouched when the source already carries
//! them. Anything unverified is re-encoded.

use crate::audio::{constants::PASSTHROUGH_CODECS, probe::ProbeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDecision {
    /// Source packets are already Opus; copy them without resampling.
    PassthroughCopy,
    /// Decode and re-encode to Opus at the given bitrate.
    Reencode { bitrate_kbps: u32 },
}

impl CodecDecision {
    /// Picks the output codec for one track.
    ///
    /// An empty probe result always re-encodes at `default_kbps`, whatever
    /// the transport asks for.
    pub fn decide(
        probe: &ProbeResult,
        transport_bitrate_kbps: Option<u32>,
        default_kbps: u32,
    ) -> Self {
        if let Some(codec) = probe.codec.as_deref() {
            if PASSTHROUGH_CODECS.contains(&codec) {
                return Self::PassthroughCopy;
            }
        }

        if probe.is_empty() {
            return Self::Reencode {
                bitrate_kbps: default_kbps,
            };
        }

        Self::Reencode {
            bitrate_kbps: transport_bitrate_kbps
                .filter(|&kbps| kbps > 0)
                .unwrap_or(default_kbps),
        }
    }

    /// Value passed to the transcoder's `-c:a`.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Self::PassthroughCopy => "copy",
            Self::Reencode { .. } => "libopus",
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::PassthroughCopy)
    }
}

impl std::fmt::Display for CodecDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassthroughCopy => write!(f, "passthrough"),
            Self::Reencode { bitrate_kbps } => write!(f, "re-encode @ {}k", bitrate_kbps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probed(codec: Option<&str>, bitrate: Option<u32>) -> ProbeResult {
        ProbeResult {
            codec: codec.map(str::to_string),
            bitrate_kbps: bitrate,
        }
    }

    #[test]
    fn opus_source_is_copied() {
        let decision = CodecDecision::decide(&probed(Some("opus"), Some(512)), Some(96), 128);
        assert_eq!(decision, CodecDecision::PassthroughCopy);
        assert_eq!(decision.encoder_name(), "copy");

        let decision = CodecDecision::decide(&probed(Some("libopus"), None), None, 128);
        assert!(decision.is_passthrough());
    }

    #[test]
    fn other_codecs_reencode_at_transport_bitrate() {
        let decision = CodecDecision::decide(&probed(Some("aac"), Some(512)), Some(96), 128);
        assert_eq!(decision, CodecDecision::Reencode { bitrate_kbps: 96 });
        assert_eq!(decision.encoder_name(), "libopus");
    }

    #[test]
    fn unknown_transport_bitrate_uses_default() {
        let decision = CodecDecision::decide(&probed(Some("mp3"), None), None, 128);
        assert_eq!(decision, CodecDecision::Reencode { bitrate_kbps: 128 });

        let decision = CodecDecision::decide(&probed(Some("mp3"), None), Some(0), 128);
        assert_eq!(decision, CodecDecision::Reencode { bitrate_kbps: 128 });
    }

    #[test]
    fn failed_probe_never_passes_through() {
        let decision = CodecDecision::decide(&ProbeResult::default(), Some(64), 128);
        assert_eq!(decision, CodecDecision::Reencode { bitrate_kbps: 128 });
    }
}
