use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// Append-only log file that trims itself back to its newest `max_lines`
/// lines once enough new lines have accumulated.
#[derive(Clone)]
pub struct TailFileWriter {
    path: PathBuf,
    max_lines: usize,
    state: Arc<Mutex<TailState>>,
}

struct TailState {
    file: Option<File>,
    lines_since_trim: usize,
}

impl TailFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
            state: Arc::new(Mutex::new(TailState {
                file: None,
                lines_since_trim: 0,
            })),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trim every tenth of the budget, but never more often than every 50 lines.
    fn trim_threshold(&self) -> usize {
        (self.max_lines / 10).max(50)
    }

    fn trim(&self, state: &mut TailState) -> io::Result<()> {
        // Close the append handle first so the rewrite is not interleaved.
        state.file = None;

        let lines: Vec<String> = match File::open(&self.path) {
            Ok(file) => BufReader::new(file).lines().collect::<Result<_, _>>()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if lines.len() <= self.max_lines {
            return Ok(());
        }

        let mut file = File::create(&self.path)?;
        for line in &lines[lines.len() - self.max_lines..] {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

impl io::Write for TailFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();

        if state.file.is_none() {
            state.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        if let Some(file) = state.file.as_mut() {
            file.write_all(buf)?;
        }

        state.lines_since_trim += buf.iter().filter(|&&b| b == b'\n').count();
        if state.lines_since_trim >= self.trim_threshold() {
            if let Err(e) = self.trim(&mut state) {
                eprintln!("Failed to trim log file {}: {}", self.path.display(), e);
            }
            state.lines_since_trim = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.state.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for TailFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
