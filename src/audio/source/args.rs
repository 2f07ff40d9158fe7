use crate::audio::{
    codec::CodecDecision,
    constants::{TARGET_CHANNELS, TARGET_SAMPLE_RATE},
};

/// Argument vector for one transcoder invocation.
///
/// Layout: `before… -i <input> -map_metadata -1 -f opus -c:a <enc>
/// -loglevel warning [-ar -ac -b:a] options… pipe:1`.
#[derive(Debug, Clone)]
pub struct TranscodeArgs {
    pub input: String,
    pub decision: CodecDecision,
    pub before_options: Vec<String>,
    pub options: Vec<String>,
}

impl TranscodeArgs {
    /// `input` is a locator, or `-` when the source is piped through stdin.
    pub fn new(input: impl Into<String>, decision: CodecDecision) -> Self {
        Self {
            input: input.into(),
            decision,
            before_options: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn before_options(mut self, before: impl IntoIterator<Item = String>) -> Self {
        self.before_options.extend(before);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = String>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = self.before_options.clone();

        args.extend(
            [
                "-i",
                self.input.as_str(),
                "-map_metadata",
                "-1",
                "-f",
                "opus",
                "-c:a",
                self.decision.encoder_name(),
                "-loglevel",
                "warning",
            ]
            .map(str::to_string),
        );

        if let CodecDecision::Reencode { bitrate_kbps } = self.decision {
            args.extend([
                "-ar".to_string(),
                TARGET_SAMPLE_RATE.to_string(),
                "-ac".to_string(),
                TARGET_CHANNELS.to_string(),
                "-b:a".to_string(),
                format!("{}k", bitrate_kbps),
            ]);
        }

        args.extend(self.options.iter().cloned());
        args.push("pipe:1".to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    #[test]
    fn passthrough_has_no_resampling_arguments() {
        let args = TranscodeArgs::new("http://media/a.m3u8", CodecDecision::PassthroughCopy).build();

        assert!(!has_flag(&args, "-ar"));
        assert!(!has_flag(&args, "-ac"));
        assert!(!has_flag(&args, "-b:a"));
        assert_eq!(
            args,
            [
                "-i",
                "http://media/a.m3u8",
                "-map_metadata",
                "-1",
                "-f",
                "opus",
                "-c:a",
                "copy",
                "-loglevel",
                "warning",
                "pipe:1"
            ]
        );
    }

    #[test]
    fn reencode_forces_rate_channels_and_bitrate() {
        let args = TranscodeArgs::new(
            "http://media/a.m3u8",
            CodecDecision::Reencode { bitrate_kbps: 96 },
        )
        .build();

        assert_eq!(&args[args.len() - 7..], ["-ar", "48000", "-ac", "2", "-b:a", "96k", "pipe:1"]);
        assert!(has_flag(&args, "libopus"));
    }

    #[test]
    fn metadata_is_always_stripped() {
        for decision in [
            CodecDecision::PassthroughCopy,
            CodecDecision::Reencode { bitrate_kbps: 128 },
        ] {
            let args = TranscodeArgs::new("x", decision).build();
            let pos = args.iter().position(|a| a == "-map_metadata").unwrap();
            assert_eq!(args[pos + 1], "-1");
        }
    }

    #[test]
    fn extra_options_surround_the_core_arguments() {
        let args = TranscodeArgs::new("-", CodecDecision::PassthroughCopy)
            .before_options(["-reconnect".to_string(), "1".to_string()])
            .options(["-vn".to_string()])
            .build();

        assert_eq!(&args[..4], ["-reconnect", "1", "-i", "-"]);
        assert_eq!(&args[args.len() - 2..], ["-vn", "pipe:1"]);
    }
}
