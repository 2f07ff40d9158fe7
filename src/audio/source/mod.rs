//! Transcoder-backed packet source.
//!
//! ```text
//! src/audio/source/
//! ├── mod.rs      ← re-exports
//! ├── args.rs     ← TranscodeArgs (argument vector, no I/O)
//! └── process.rs  ← PacketSource, KillHandle, SourceInput
//! ```

pub mod args;
pub mod process;

pub use args::TranscodeArgs;
pub use process::{KillHandle, PacketSource, SourceError, SourceInput};
