//! Central constants for the audio pipeline.
//!
//! All magic numbers in `src/audio/**` live here so they can be tuned in one
//! place and remain consistent across modules.

// ── Output format ────────────────────────────────────────────────────────────

/// Sample rate forced on the re-encode path (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Channel count forced on the re-encode path.
pub const TARGET_CHANNELS: u32 = 2;

/// Samples per channel in one 20 ms Opus frame at 48 kHz.
pub const FRAME_SAMPLES: u32 = 960;

/// Duration of one Opus frame as emitted by the transcoder.
pub const FRAME_DURATION_MS: u64 = 20;

// ── Codec decision ───────────────────────────────────────────────────────────

/// Re-encode bitrate used when nothing better is known (kbps).
pub const DEFAULT_BITRATE_KBPS: u32 = 128;

/// Codec names that are already in the transport's packet format.
pub const PASSTHROUGH_CODECS: &[&str] = &["opus", "libopus"];

// ── Probe ────────────────────────────────────────────────────────────────────

/// Hard limit for a single probe attempt (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 20;

/// Probed bitrates are floored at this value (kbps).
pub const MIN_PROBE_BITRATE_KBPS: u32 = 512;

// ── Packet flow ──────────────────────────────────────────────────────────────

/// Packets buffered between the blocking reader and the transport writer
/// (50 ≈ one second of audio).
pub const PACKET_CHANNEL_CAPACITY: usize = 50;

/// Read buffer placed in front of the transcoder's stdout.
pub const STDOUT_BUFFER_SIZE: usize = 64 * 1_024;

// ── Ogg framing ──────────────────────────────────────────────────────────────

/// Fixed part of an Ogg page header, capture pattern included.
pub const OGG_PAGE_HEADER_LEN: usize = 27;

/// Largest lacing value; a segment of this size continues the packet.
pub const OGG_MAX_SEGMENT: u8 = 255;
