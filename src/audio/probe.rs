//! Source inspection ahead of the codec decision.
//!
//! Two built-in strategies exist: `native` asks ffprobe for structured JSON,
//! `fallback` runs the transcoder itself against the input and scrapes the
//! stream banner it prints. `native` and custom strategies get exactly one
//! `fallback` retry; a `fallback` primary gets none. Every attempt is bounded
//! by a timeout and subprocesses are spawned kill-on-drop, so an expired
//! attempt takes its process down with it.

use std::{
    process::Stdio,
    sync::{Arc, LazyLock},
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    audio::constants::MIN_PROBE_BITRATE_KBPS,
    common::types::AnyResult,
    configs::ProbeMethodConfig,
};

/// Codec and bitrate of a source's first audio stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub codec: Option<String>,
    pub bitrate_kbps: Option<u32>,
}

impl ProbeResult {
    /// True when probing found nothing at all.
    pub fn is_empty(&self) -> bool {
        self.codec.is_none() && self.bitrate_kbps.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{executable} exited with {status}")]
    Status {
        executable: String,
        status: std::process::ExitStatus,
    },
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("unusable probe output: {0}")]
    Parse(String),
    #[error("custom probe failed: {0}")]
    Custom(String),
}

/// One way of inspecting a source.
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, locator: &str, executable: &str) -> Result<ProbeResult, ProbeError>;
}

/// User-supplied probe: `(locator, executable) -> ProbeResult`. Runs on the
/// blocking pool.
///
/// Blocking work cannot be interrupted, so a call that outlives the probe
/// timeout keeps its blocking thread until it returns on its own. Its result
/// is then discarded and the fallback has already answered.
pub type ProbeFn = Arc<dyn Fn(&str, &str) -> AnyResult<ProbeResult> + Send + Sync>;

#[derive(Clone)]
pub enum ProbeMethod {
    Native,
    Fallback,
    Custom(ProbeFn),
}

impl From<ProbeMethodConfig> for ProbeMethod {
    fn from(config: ProbeMethodConfig) -> Self {
        match config {
            ProbeMethodConfig::Native => Self::Native,
            ProbeMethodConfig::Fallback => Self::Fallback,
        }
    }
}

fn floor_bitrate(kbps: u64) -> u32 {
    kbps.max(MIN_PROBE_BITRATE_KBPS as u64).min(u32::MAX as u64) as u32
}

// ─── native ──────────────────────────────────────────────────────────────────

/// Name of the structured-metadata tool paired with `executable`.
pub fn probe_executable(executable: &str) -> String {
    match executable {
        "ffmpeg" | "avconv" => format!("{}probe", &executable[..2]),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    bit_rate: Option<serde_json::Value>,
}

/// Parses `ffprobe -print_format json -show_streams` output.
///
/// Blank output is an empty result, not an error. A present stream with no
/// bitrate reports the floor value.
pub fn parse_ffprobe_json(output: &[u8]) -> Result<ProbeResult, ProbeError> {
    if output.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProbeResult::default());
    }

    let data: FfprobeOutput =
        serde_json::from_slice(output).map_err(|e| ProbeError::Parse(e.to_string()))?;
    let stream = data
        .streams
        .first()
        .ok_or_else(|| ProbeError::Parse("no audio stream in ffprobe output".into()))?;

    let bits_per_sec: u64 = match &stream.bit_rate {
        None | Some(serde_json::Value::Null) => 0,
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ProbeError::Parse(format!("bit_rate {:?} is not an integer", s)))?,
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ProbeError::Parse(format!("bit_rate {} is not an integer", n)))?,
        Some(other) => {
            return Err(ProbeError::Parse(format!("unexpected bit_rate {}", other)));
        }
    };

    Ok(ProbeResult {
        codec: stream.codec_name.clone(),
        bitrate_kbps: Some(floor_bitrate((bits_per_sec + 500) / 1000)),
    })
}

pub struct NativeProbe;

#[async_trait]
impl ProbeStrategy for NativeProbe {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn probe(&self, locator: &str, executable: &str) -> Result<ProbeResult, ProbeError> {
        let exe = probe_executable(executable);
        let output = Command::new(&exe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-select_streams",
                "a:0",
                locator,
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                executable: exe.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::Status {
                executable: exe,
                status: output.status,
            });
        }

        parse_ffprobe_json(&output.stdout)
    }
}

// ─── fallback ────────────────────────────────────────────────────────────────

static BANNER_CODEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Stream #0.*?Audio: (\w+)").expect("codec pattern is valid"));
static BANNER_BITRATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) [kK]b/s").expect("bitrate pattern is valid"));

/// Scrapes codec and bitrate out of the transcoder's input banner.
pub fn parse_banner(banner: &str) -> ProbeResult {
    let codec = BANNER_CODEC
        .captures(banner)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let bitrate_kbps = BANNER_BITRATE
        .captures(banner)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(floor_bitrate);

    ProbeResult {
        codec,
        bitrate_kbps,
    }
}

pub struct FallbackProbe;

#[async_trait]
impl ProbeStrategy for FallbackProbe {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn probe(&self, locator: &str, executable: &str) -> Result<ProbeResult, ProbeError> {
        // Without an output file the transcoder exits non-zero; only the
        // banner matters here.
        let output = Command::new(executable)
            .args(["-hide_banner", "-i", locator])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                executable: executable.to_string(),
                source,
            })?;

        let mut banner = String::from_utf8_lossy(&output.stdout).into_owned();
        banner.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_banner(&banner))
    }
}

// ─── custom ──────────────────────────────────────────────────────────────────

pub struct CustomProbe {
    func: ProbeFn,
}

impl CustomProbe {
    pub fn new(func: ProbeFn) -> Self {
        Self { func }
    }
}

#[async_trait]
impl ProbeStrategy for CustomProbe {
    fn name(&self) -> &'static str {
        "custom"
    }

    async fn probe(&self, locator: &str, executable: &str) -> Result<ProbeResult, ProbeError> {
        let func = self.func.clone();
        let locator = locator.to_string();
        let executable = executable.to_string();

        tokio::task::spawn_blocking(move || func(&locator, &executable))
            .await
            .map_err(|e| ProbeError::Custom(e.to_string()))?
            .map_err(|e| ProbeError::Custom(e.to_string()))
    }
}

// ─── prober ──────────────────────────────────────────────────────────────────

/// Runs the primary strategy, then the fallback once if the primary failed.
#[derive(Clone)]
pub struct Prober {
    primary: Arc<dyn ProbeStrategy>,
    fallback: Option<Arc<dyn ProbeStrategy>>,
    executable: String,
    timeout: Duration,
}

impl Prober {
    pub fn new(method: ProbeMethod, executable: impl Into<String>, timeout: Duration) -> Self {
        let fallback: Arc<dyn ProbeStrategy> = Arc::new(FallbackProbe);
        let (primary, fallback): (Arc<dyn ProbeStrategy>, _) = match method {
            ProbeMethod::Native => (Arc::new(NativeProbe), Some(fallback)),
            ProbeMethod::Fallback => (fallback, None),
            ProbeMethod::Custom(func) => (Arc::new(CustomProbe::new(func)), Some(fallback)),
        };
        Self::with_strategies(primary, fallback, executable, timeout)
    }

    pub fn with_strategies(
        primary: Arc<dyn ProbeStrategy>,
        fallback: Option<Arc<dyn ProbeStrategy>>,
        executable: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            executable: executable.into(),
            timeout,
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Never fails: total failure is an empty result.
    pub async fn probe(&self, locator: &str) -> ProbeResult {
        let err = match self.attempt(self.primary.as_ref(), locator).await {
            Ok(result) => {
                info!(
                    "Probe found codec={:?}, bitrate={:?}",
                    result.codec, result.bitrate_kbps
                );
                return result;
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            warn!(
                "Probe '{}' using '{}' failed: {}",
                self.primary.name(),
                self.executable,
                err
            );
            return ProbeResult::default();
        };

        warn!(
            "Probe '{}' using '{}' failed, trying fallback: {}",
            self.primary.name(),
            self.executable,
            err
        );

        match self.attempt(fallback.as_ref(), locator).await {
            Ok(result) => {
                info!(
                    "Fallback probe found codec={:?}, bitrate={:?}",
                    result.codec, result.bitrate_kbps
                );
                result
            }
            Err(e) => {
                warn!("Fallback probe using '{}' failed: {}", self.executable, e);
                ProbeResult::default()
            }
        }
    }

    async fn attempt(
        &self,
        strategy: &dyn ProbeStrategy,
        locator: &str,
    ) -> Result<ProbeResult, ProbeError> {
        tokio::time::timeout(self.timeout, strategy.probe(locator, &self.executable))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
    }
}
