pub mod codec;
pub mod constants;
pub mod demux;
pub mod probe;
pub mod source;

pub use codec::CodecDecision;
pub use probe::{ProbeMethod, ProbeResult, Prober};
pub use source::{KillHandle, PacketSource, SourceError, SourceInput, TranscodeArgs};
