//! Rendered-line output to the log file or stdout
//!
//! The sink buffers lines itself so it can report exact file offsets and
//! decide when to flush: once the buffer reaches `flush_buffer_size`, once
//! the oldest buffered line is older than `flush_delay` (checked by the
//! poller through [`FileSink::tick`]), or right after a record at or above
//! `flush_on`.

use super::rotation::{rotate_files, RotationPolicy};
use crate::core::error::{LoggerError, Result};
use crate::core::log_level::LogLevel;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_FLUSH_BUFFER_SIZE: usize = 8 * 1024;
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(3);

struct OpenFile {
    path: PathBuf,
    file: File,
    /// Bytes in the file, including what is still buffered
    position: u64,
}

/// Where rendered lines currently go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    File(PathBuf),
    Stdout,
    Disabled,
}

pub struct FileSink {
    file: Option<OpenFile>,
    stdout_fallback: bool,
    /// Set by `close` and by write failures; cleared by `open` or by
    /// re-enabling stdout
    disabled: bool,
    buffer: Vec<u8>,
    oldest_unflushed: Option<Instant>,
    flush_buffer_size: usize,
    flush_delay: Duration,
    flush_on: LogLevel,
    rotation: Option<RotationPolicy>,
}

impl FileSink {
    pub fn new() -> Self {
        Self {
            file: None,
            stdout_fallback: true,
            disabled: false,
            buffer: Vec::with_capacity(DEFAULT_FLUSH_BUFFER_SIZE),
            oldest_unflushed: None,
            flush_buffer_size: DEFAULT_FLUSH_BUFFER_SIZE,
            flush_delay: DEFAULT_FLUSH_DELAY,
            flush_on: LogLevel::Off,
            rotation: None,
        }
    }

    pub fn set_flush_buffer_size(&mut self, size: usize) {
        self.flush_buffer_size = size;
    }

    pub fn set_flush_delay(&mut self, delay: Duration) {
        self.flush_delay = delay;
    }

    pub fn set_flush_on(&mut self, level: LogLevel) {
        self.flush_on = level;
    }

    pub fn set_rotation(&mut self, rotation: Option<RotationPolicy>) {
        self.rotation = rotation;
    }

    /// Route output to stdout whenever no file is open
    pub fn set_stdout_fallback(&mut self, enabled: bool) {
        self.stdout_fallback = enabled;
        if enabled && self.file.is_none() {
            self.disabled = false;
        }
    }

    pub fn target(&self) -> SinkTarget {
        match &self.file {
            Some(open) => SinkTarget::File(open.path.clone()),
            None if !self.disabled && self.stdout_fallback => SinkTarget::Stdout,
            None => SinkTarget::Disabled,
        }
    }

    /// Current write offset in the open file, or `None` without one
    pub fn position(&self) -> Option<u64> {
        self.file.as_ref().map(|open| open.position)
    }

    /// Switch to `path`, flushing whatever was buffered for the old target
    ///
    /// On failure the sink stays disabled until reconfigured.
    pub fn open(&mut self, path: impl AsRef<Path>, truncate: bool) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let flushed = self.flush();
        self.file = None;
        self.disabled = true;
        flushed?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let file = open_file(&path, truncate)?;
        let position = if truncate {
            0
        } else {
            file.metadata()
                .map_err(|e| {
                    LoggerError::file_sink(
                        path.display().to_string(),
                        format!("Cannot access file metadata: {}", e),
                    )
                })?
                .len()
        };
        self.file = Some(OpenFile {
            path,
            file,
            position,
        });
        self.disabled = false;
        Ok(())
    }

    /// Flush and close the file; stdout output stays off as well
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        self.file = None;
        self.disabled = true;
        flushed
    }

    /// Stop writing after a failure; buffered bytes are discarded
    pub fn disable(&mut self) {
        self.file = None;
        self.disabled = true;
        self.buffer.clear();
        self.oldest_unflushed = None;
    }

    /// Buffer one rendered line (a newline is appended)
    ///
    /// Returns the file offset the line starts at, or `None` when it was
    /// not written to a file.
    pub fn write_line(&mut self, line: &str, level: LogLevel) -> Result<Option<u64>> {
        if self.target() == SinkTarget::Disabled {
            return Ok(None);
        }
        let incoming = line.len() as u64 + 1;

        let rotate = match (&self.rotation, &self.file) {
            (Some(policy), Some(open)) => policy.should_rotate(open.position, incoming),
            _ => false,
        };
        if rotate {
            if let Err(e) = self.rotate() {
                if self.file.is_none() {
                    return Err(e);
                }
                eprintln!(
                    "[LOGGER WARNING] Log rotation failed: {}. Continuing with a fresh file.",
                    e
                );
            }
        }

        let pos = self.file.as_mut().map(|open| {
            let pos = open.position;
            open.position += incoming;
            pos
        });
        self.buffer.extend_from_slice(line.as_bytes());
        self.buffer.push(b'\n');
        if self.oldest_unflushed.is_none() {
            self.oldest_unflushed = Some(Instant::now());
        }

        if self.buffer.len() >= self.flush_buffer_size || level >= self.flush_on {
            self.flush()?;
        }
        Ok(pos)
    }

    /// Periodic check from the poller; `force` flushes unconditionally
    pub fn tick(&mut self, force: bool) -> Result<()> {
        let due = self
            .oldest_unflushed
            .is_some_and(|since| since.elapsed() >= self.flush_delay);
        if force || due {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let result = match &mut self.file {
            Some(open) => open
                .file
                .write_all(&self.buffer)
                .and_then(|_| open.file.flush())
                .map_err(|e| {
                    LoggerError::file_sink(
                        open.path.display().to_string(),
                        format!("Failed to write log file: {}", e),
                    )
                }),
            None => {
                let mut out = io::stdout().lock();
                out.write_all(&self.buffer)
                    .and_then(|_| out.flush())
                    .map_err(|e| LoggerError::io_operation("write stdout", "Failed to write log lines", e))
            }
        };
        self.buffer.clear();
        self.oldest_unflushed = None;
        result
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;
        let Some(policy) = self.rotation.clone() else {
            return Ok(());
        };
        let Some(open) = self.file.take() else {
            return Ok(());
        };
        let path = open.path;
        drop(open.file);

        let rotated = rotate_files(&path, &policy);
        // keep logging to a fresh file even if shifting backups failed
        let file = open_file(&path, true)?;
        self.file = Some(OpenFile {
            path,
            file,
            position: 0,
        });
        rotated
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("[LOGGER ERROR] Failed to flush log output on drop: {}", e);
        }
    }
}

fn open_file(path: &Path, truncate: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path).map_err(|e| {
        LoggerError::file_sink(path.display().to_string(), format!("Failed to open: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_target_is_stdout() {
        let mut sink = FileSink::new();
        assert_eq!(sink.target(), SinkTarget::Stdout);
        assert_eq!(sink.position(), None);
        sink.set_stdout_fallback(false);
        assert_eq!(sink.target(), SinkTarget::Disabled);
    }

    #[test]
    fn test_positions_track_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = FileSink::new();
        sink.open(&path, true).unwrap();

        assert_eq!(sink.write_line("first", LogLevel::Info).unwrap(), Some(0));
        assert_eq!(sink.write_line("second", LogLevel::Info).unwrap(), Some(6));
        assert_eq!(sink.position(), Some(13));
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_append_starts_at_file_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        fs::write(&path, "existing\n").unwrap();

        let mut sink = FileSink::new();
        sink.open(&path, false).unwrap();
        assert_eq!(sink.position(), Some(9));
        sink.write_line("more", LogLevel::Info).unwrap();
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "existing\nmore\n");

        sink.open(&path, true).unwrap();
        assert_eq!(sink.position(), Some(0));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_flush_triggers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = FileSink::new();
        sink.open(&path, true).unwrap();

        sink.write_line("buffered", LogLevel::Info).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        sink.set_flush_on(LogLevel::Warn);
        sink.write_line("urgent", LogLevel::Error).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "buffered\nurgent\n");

        sink.set_flush_on(LogLevel::Off);
        sink.set_flush_buffer_size(4);
        sink.write_line("big", LogLevel::Info).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "buffered\nurgent\nbig\n");

        sink.set_flush_buffer_size(DEFAULT_FLUSH_BUFFER_SIZE);
        sink.set_flush_delay(Duration::ZERO);
        sink.write_line("late", LogLevel::Info).unwrap();
        sink.tick(false).unwrap();
        assert!(fs::read_to_string(&path).unwrap().ends_with("late\n"));
    }

    #[test]
    fn test_close_disables_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = FileSink::new();
        sink.open(&path, true).unwrap();
        sink.write_line("kept", LogLevel::Info).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.target(), SinkTarget::Disabled);
        assert_eq!(sink.write_line("lost", LogLevel::Info).unwrap(), None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");

        sink.set_stdout_fallback(true);
        assert_eq!(sink.target(), SinkTarget::Stdout);
    }

    #[test]
    fn test_open_failure_disables() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new();
        // a directory cannot be opened as a file
        assert!(sink.open(dir.path(), false).is_err());
        assert_eq!(sink.target(), SinkTarget::Disabled);
    }

    #[test]
    fn test_rotation_on_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileSink::new();
        sink.set_rotation(Some(RotationPolicy::new(12).with_max_files(2)));
        sink.open(&path, true).unwrap();

        sink.write_line("aaaaa", LogLevel::Info).unwrap();
        sink.write_line("bbbbb", LogLevel::Info).unwrap();
        // would exceed 12 bytes: rotate first
        assert_eq!(sink.write_line("ccccc", LogLevel::Info).unwrap(), Some(0));
        sink.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "ccccc\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("app.log.1")).unwrap(),
            "aaaaa\nbbbbb\n"
        );
    }
}
