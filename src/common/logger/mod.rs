use std::{fs, path::Path};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::*;
pub use writer::*;

use crate::configs::{Config, LoggingConfig};

/// Builds the `EnvFilter` directive string from the logging section.
///
/// Noisy dependency targets are capped at `warn` unless the user asks for
/// them explicitly through `filters`.
pub fn filter_directives(logging: Option<&LoggingConfig>) -> String {
    let level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    let filters = logging.and_then(|l| l.filters.as_deref()).unwrap_or("");

    let mut directives = format!("{},hyper=warn,reqwest=warn", level);
    if !filters.is_empty() {
        directives.push(',');
        directives.push_str(filters);
    }
    directives
}

pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config.logging.as_ref())));

    let stdout_layer = fmt::layer()
        .event_format(LineFormatter::new(true))
        .with_ansi(true);

    let file_layer = config
        .logging
        .as_ref()
        .and_then(|l| l.file.as_ref())
        .map(|file_config| {
            if let Some(parent) = Path::new(&file_config.path).parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create log directory: {}", e);
                }
            }

            fmt::layer()
                .with_writer(TailFileWriter::new(&file_config.path, file_config.max_lines))
                .event_format(LineFormatter::new(false))
                .with_ansi(false)
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_use_info() {
        assert_eq!(filter_directives(None), "info,hyper=warn,reqwest=warn");
    }

    #[test]
    fn extra_filters_are_appended() {
        let logging = LoggingConfig {
            level: Some("debug".into()),
            filters: Some("jellywave::voice=trace".into()),
            file: None,
        };
        assert_eq!(
            filter_directives(Some(&logging)),
            "debug,hyper=warn,reqwest=warn,jellywave::voice=trace"
        );
    }
}
