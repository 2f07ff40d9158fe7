//! `PacketSource`: one transcoder subprocess plus the Ogg demuxer reading
//! its stdout.
//!
//! ```text
//!  locator ──► ┌────────────┐ stdout  ┌────────────────┐
//!  or stdin ─► │ transcoder │ ──────► │ OggPacketReader│ ──► next_packet()
//!              └─────┬──────┘         └────────────────┘
//!                    │ stderr
//!                    └──► drain thread ──► warn!
//! ```
//!
//! The child lives behind a [`KillHandle`]. Killing it from another task
//! closes stdout, so a read blocked inside `next_packet` returns within one
//! read call. Dropping the source kills and reaps the child.

use std::{
    io::{self, BufRead, BufReader, Read},
    process::{Child, ChildStdout, Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::args::TranscodeArgs;
use crate::audio::{
    constants::STDOUT_BUFFER_SIZE,
    demux::{OggError, OggPacketReader},
};

/// Where the transcoder reads its input from.
pub enum SourceInput {
    /// Remote or local locator handed to `-i`.
    Locator(String),
    /// Byte stream copied into the child's stdin by a writer thread. The
    /// reader must reach EOF or fail on its own once the child is gone;
    /// the writer thread is not joined and lives as long as a blocked read.
    Pipe(Box<dyn Read + Send>),
}

impl SourceInput {
    /// Value for `-i`.
    pub fn arg(&self) -> &str {
        match self {
            Self::Locator(locator) => locator,
            Self::Pipe(_) => "-",
        }
    }
}

impl std::fmt::Debug for SourceInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locator(locator) => f.debug_tuple("Locator").field(locator).finish(),
            Self::Pipe(_) => f.write_str("Pipe"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to launch {executable}: {source}")]
    Launch {
        executable: String,
        #[source]
        source: io::Error,
    },
    #[error("transcoder output ended mid-packet")]
    Truncated,
    #[error("malformed transcoder output: {0}")]
    Malformed(String),
    #[error("transcoder read failed: {0}")]
    Io(#[source] io::Error),
}

impl From<OggError> for SourceError {
    fn from(e: OggError) -> Self {
        match e {
            OggError::Truncated => Self::Truncated,
            OggError::Malformed(msg) => Self::Malformed(msg),
            OggError::Io(e) => Self::Io(e),
        }
    }
}

/// Shared, idempotent terminator for one transcoder child.
#[derive(Clone, Default)]
pub struct KillHandle {
    child: Arc<Mutex<Option<Child>>>,
    killed: Arc<AtomicBool>,
}

impl KillHandle {
    fn new(child: Child) -> Self {
        Self {
            child: Arc::new(Mutex::new(Some(child))),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Kills the child if it is still running. Safe to call repeatedly and
    /// from any thread.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        if let Some(child) = self.child.lock().as_mut() {
            if let Err(e) = child.kill() {
                debug!("Transcoder {} already gone: {}", child.id(), e);
            }
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Kills and waits for the child, releasing it.
    fn reap(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => debug!("Transcoder {} reaped ({})", child.id(), status),
                Err(e) => warn!("Failed to reap transcoder {}: {}", child.id(), e),
            }
        }
    }
}

pub struct PacketSource {
    reader: OggPacketReader<BufReader<ChildStdout>>,
    kill: KillHandle,
    strict_end: bool,
    finished: bool,
    packets: u64,
    stdin_writer: Option<thread::JoinHandle<()>>,
}

impl PacketSource {
    /// Launches the transcoder for `args` reading from `input`.
    pub fn spawn(
        executable: &str,
        args: &TranscodeArgs,
        input: SourceInput,
    ) -> Result<Self, SourceError> {
        Self::launch(executable, &args.build(), input)
    }

    fn launch(executable: &str, argv: &[String], input: SourceInput) -> Result<Self, SourceError> {
        let launch_err = |source: io::Error| SourceError::Launch {
            executable: executable.to_string(),
            source,
        };

        debug!("Launching {} {}", executable, argv.join(" "));

        let stdin = match &input {
            SourceInput::Pipe(_) => Stdio::piped(),
            SourceInput::Locator(_) => Stdio::null(),
        };

        let mut child = Command::new(executable)
            .args(argv)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch_err)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child_stdin = child.stdin.take();
        let kill = KillHandle::new(child);

        let Some(stdout) = stdout else {
            kill.reap();
            return Err(launch_err(io::Error::other("stdout was not captured")));
        };

        let stdin_writer = match Self::start_io_threads(executable, stderr, child_stdin, input) {
            Ok(writer) => writer,
            Err(e) => {
                kill.reap();
                return Err(launch_err(e));
            }
        };

        Ok(Self {
            reader: OggPacketReader::new(BufReader::with_capacity(STDOUT_BUFFER_SIZE, stdout)),
            kill,
            strict_end: false,
            finished: false,
            packets: 0,
            stdin_writer,
        })
    }

    fn start_io_threads(
        executable: &str,
        stderr: Option<std::process::ChildStderr>,
        stdin: Option<std::process::ChildStdin>,
        input: SourceInput,
    ) -> io::Result<Option<thread::JoinHandle<()>>> {
        if let Some(stderr) = stderr {
            let name = executable.to_string();
            thread::Builder::new()
                .name("transcoder-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(line) if !line.trim().is_empty() => {
                                warn!(target: "jellywave::audio::source", "{}: {}", name, line.trim_end());
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                })?;
        }

        let mut writer = None;
        if let (SourceInput::Pipe(mut reader), Some(mut stdin)) = (input, stdin) {
            let handle = thread::Builder::new()
                .name("transcoder-stdin".to_string())
                .spawn(move || {
                    // A broken pipe here means the child is gone; the read
                    // side reports that.
                    if let Err(e) = io::copy(&mut reader, &mut stdin) {
                        debug!("Transcoder stdin closed: {}", e);
                    }
                })?;
            writer = Some(handle);
        }

        Ok(writer)
    }

    /// Report truncated or malformed output as an error instead of ending
    /// the stream quietly.
    pub fn with_strict_end(mut self, strict: bool) -> Self {
        self.strict_end = strict;
        self
    }

    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    pub fn packets_read(&self) -> u64 {
        self.packets
    }

    /// Whether the stdin writer thread has exited. Always true for locator
    /// input.
    pub fn input_finished(&self) -> bool {
        self.stdin_writer
            .as_ref()
            .is_none_or(|writer| writer.is_finished())
    }

    /// Blocks until the next complete Opus packet. `Ok(None)` is end of
    /// stream.
    pub fn next_packet(&mut self) -> Result<Option<Bytes>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        match self.reader.next_packet() {
            Ok(Some(packet)) => {
                self.packets += 1;
                Ok(Some(packet))
            }
            Ok(None) => {
                self.finished = true;
                debug!(
                    "Transcoder output ended after {} packets ({} pages)",
                    self.packets,
                    self.reader.pages_read()
                );
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                if self.kill.is_killed() {
                    return Ok(None);
                }
                if self.strict_end {
                    return Err(e.into());
                }
                warn!(
                    "Transcoder output unusable after {} packets, ending track: {}",
                    self.packets, e
                );
                Ok(None)
            }
        }
    }
}

impl Drop for PacketSource {
    fn drop(&mut self) {
        self.kill.reap();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn page(flags: u8, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"OggS");
        out.push(0);
        out.push(flags);
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&7u32.to_le_bytes());
        out.extend_from_slice(&sequence.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(packets.len() as u8);
        for packet in packets {
            out.push(packet.len() as u8);
        }
        for packet in packets {
            out.extend_from_slice(packet);
        }
        out
    }

    fn cat(stream: Vec<u8>) -> PacketSource {
        PacketSource::launch(
            "cat",
            &[],
            SourceInput::Pipe(Box::new(Cursor::new(stream))),
        )
        .expect("cat should launch")
    }

    #[test]
    fn missing_executable_is_launch_failure() {
        let args = TranscodeArgs::new(
            "http://media/1",
            crate::audio::codec::CodecDecision::PassthroughCopy,
        );
        let err = PacketSource::spawn(
            "/nonexistent/jellywave-transcoder",
            &args,
            SourceInput::Locator("http://media/1".into()),
        )
        .err()
        .expect("spawn must fail");
        assert!(matches!(err, SourceError::Launch { .. }));
    }

    #[test]
    fn piped_stream_is_demuxed_into_packets() {
        let mut stream = page(0x02, 0, &[b"OpusHead\x01\x02"]);
        stream.extend(page(0, 1, &[b"OpusTags"]));
        stream.extend(page(0, 2, &[b"one", b"two"]));
        stream.extend(page(0x04, 3, &[b"three"]));

        let mut source = cat(stream);
        let mut packets = Vec::new();
        while let Some(packet) = source.next_packet().unwrap() {
            packets.push(packet.to_vec());
        }

        assert_eq!(packets, [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(source.packets_read(), 3);
        assert!(source.next_packet().unwrap().is_none());
    }

    #[test]
    fn truncated_output_ends_quietly_by_default() {
        let mut stream = page(0, 0, &[b"whole"]);
        let partial = page(0, 1, &[b"cut short"]);
        stream.extend_from_slice(&partial[..partial.len() - 3]);

        let mut source = cat(stream);
        assert_eq!(source.next_packet().unwrap().as_deref(), Some(&b"whole"[..]));
        assert!(source.next_packet().unwrap().is_none());
    }

    #[test]
    fn truncated_output_is_an_error_when_strict() {
        let mut stream = page(0, 0, &[b"whole"]);
        let partial = page(0, 1, &[b"cut short"]);
        stream.extend_from_slice(&partial[..partial.len() - 3]);

        let mut source = cat(stream).with_strict_end(true);
        assert!(source.next_packet().unwrap().is_some());
        assert!(matches!(source.next_packet(), Err(SourceError::Truncated)));
    }

    #[test]
    fn kill_unblocks_a_pending_read() {
        let mut source =
            PacketSource::launch("sleep", &["30".to_string()], SourceInput::Locator(String::new()))
                .expect("sleep should launch");
        let kill = source.kill_handle();

        let reader = thread::spawn(move || {
            let started = std::time::Instant::now();
            let result = source.next_packet();
            (result.map(|p| p.is_none()).unwrap_or(false), started.elapsed())
        });

        thread::sleep(std::time::Duration::from_millis(100));
        kill.kill();
        kill.kill();

        let (ended, elapsed) = reader.join().unwrap();
        assert!(ended);
        assert!(elapsed < std::time::Duration::from_secs(5));
        assert!(kill.is_killed());
    }

    #[test]
    fn stdin_writer_exits_once_the_child_is_killed() {
        let source = PacketSource::launch(
            "sleep",
            &["30".to_string()],
            SourceInput::Pipe(Box::new(io::repeat(0))),
        )
        .expect("sleep should launch");
        assert!(!source.input_finished());

        source.kill_handle().kill();
        let mut exited = false;
        for _ in 0..500 {
            if source.input_finished() {
                exited = true;
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(exited);
    }

    #[test]
    fn locator_input_has_no_writer() {
        let source =
            PacketSource::launch("sleep", &["30".to_string()], SourceInput::Locator(String::new()))
                .expect("sleep should launch");
        assert!(source.input_finished());
    }
}
