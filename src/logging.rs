//! Logging pipeline (C10): structured `tracing` events, optionally spilled
//! to a size-rotated file sink under the configured log directory.
//!
//! The teacher wires `tracing` + `tracing-subscriber` with an `EnvFilter`
//! directly to stderr; we keep that wiring and add a small rotating file
//! writer on top, since nothing in the pack vendors `tracing-appender`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{PastaError, Result};

/// A `Write` implementation that rolls over to a freshly named file once the
/// current one exceeds `max_bytes`, keeping at most `backups` prior files.
pub struct RotatingWriter {
    directory: PathBuf,
    max_bytes: u64,
    backups: u32,
    current: File,
    written: u64,
}

impl RotatingWriter {
    pub fn new(directory: &Path, max_bytes: u64, backups: u32) -> Result<Self> {
        fs::create_dir_all(directory).map_err(|e| PastaError::IoFailure {
            descriptor: "log-directory",
            source: e,
        })?;
        let current = Self::open_new(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
            max_bytes: max_bytes.max(1),
            backups: backups.max(1),
            current,
            written: 0,
        })
    }

    fn open_new(directory: &Path) -> Result<File> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = directory.join(format!("{stamp}.log"));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PastaError::IoFailure {
                descriptor: "log-file",
                source: e,
            })
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.current = Self::open_new(&self.directory).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::Other, "failed to open rotated log file")
        })?;
        self.written = 0;
        self.prune()
    }

    fn prune(&self) -> std::io::Result<()> {
        let mut entries: Vec<_> = fs::read_dir(&self.directory)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|ext| ext == "log").unwrap_or(false))
            .collect();
        entries.sort_by_key(|e| e.file_name());
        while entries.len() > self.backups as usize {
            let oldest = entries.remove(0);
            let _ = fs::remove_file(oldest.path());
        }
        Ok(())
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written >= self.max_bytes {
            self.rotate()?;
        }
        let n = self.current.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.current.flush()
    }
}

/// A `tracing_subscriber` `MakeWriter` that clones from a shared, mutex-
/// guarded [`RotatingWriter`] — mirroring how `tracing-appender`'s own
/// non-blocking writer is structured, just without the background thread.
#[derive(Clone)]
pub struct SharedRotatingWriter(std::sync::Arc<Mutex<RotatingWriter>>);

impl SharedRotatingWriter {
    pub fn new(inner: RotatingWriter) -> Self {
        Self(std::sync::Arc::new(Mutex::new(inner)))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRotatingWriter {
    type Writer = SharedRotatingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRotatingWriterGuard(self.0.clone())
    }
}

pub struct SharedRotatingWriterGuard(std::sync::Arc<Mutex<RotatingWriter>>);

impl Write for SharedRotatingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

/// Install the global `tracing` subscriber. `level_override` wins over the
/// config file's `logging.level`; `dir_override` wins over
/// `logging.directory`. With no directory configured, events go to stderr.
pub fn init(config: &LoggingConfig, level_override: Option<&str>, dir_override: Option<&Path>) -> Result<()> {
    let level = level_override.unwrap_or(&config.level);
    let filter = EnvFilter::try_new(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let directory = dir_override
        .map(Path::to_path_buf)
        .or_else(|| config.directory.clone());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match directory {
        Some(dir) => {
            let writer = RotatingWriter::new(&dir, config.max_size * 1024 * 1024, config.backups)?;
            builder
                .with_writer(SharedRotatingWriter::new(writer))
                .with_ansi(false)
                .try_init()
                .map_err(|e| PastaError::InvalidConfig(e.to_string()))
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| PastaError::InvalidConfig(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_when_max_bytes_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingWriter::new(dir.path(), 8, 2).unwrap();
        writer.write_all(b"12345678").unwrap();
        writer.write_all(b"more").unwrap();

        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn prunes_to_backup_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingWriter::new(dir.path(), 1, 1).unwrap();
        for _ in 0..5 {
            writer.write_all(b"x").unwrap();
            std::thread::sleep(std::time::Duration::from_nanos(1));
        }
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert!(count <= 2, "expected at most 2 files, found {count}");
    }
}
