//! Size-based rotation of the log file
//!
//! On rotation the live file becomes `<name>.1`, the previous `<name>.1`
//! becomes `<name>.2`, and so on up to `max_files`; the oldest backup is
//! deleted. With compression enabled each fresh backup is gzipped to
//! `<name>.1.gz`.

use crate::core::error::{LoggerError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// When and how the log file is rotated
///
/// # Examples
///
/// ```
/// use deferred_logger::sinks::RotationPolicy;
///
/// let policy = RotationPolicy::new(50 * 1024 * 1024)
///     .with_max_files(7)
///     .with_compression(true);
/// assert_eq!(policy.max_files, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Rotate before a write would grow the file past this size
    pub max_bytes: u64,
    /// Number of backups kept
    pub max_files: usize,
    /// Gzip each backup
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
            compress: false,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Whether writing `incoming` more bytes to a file of `current` bytes
    /// should rotate first. An empty file is never rotated.
    pub fn should_rotate(&self, current: u64, incoming: u64) -> bool {
        current > 0 && current + incoming > self.max_bytes
    }
}

/// Path of the `index`-th backup, e.g. `app.log.2`
pub fn backup_path(base: &Path, index: usize) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app.log".to_string());
    base.with_file_name(format!("{}.{}", name, index))
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Shift backups and move the (closed) live file to `.1`
///
/// The caller reopens `base` afterwards.
pub fn rotate_files(base: &Path, policy: &RotationPolicy) -> Result<()> {
    if policy.max_files == 0 {
        return fs::remove_file(base).or_else(ignore_missing).map_err(|e| {
            LoggerError::file_rotation(base.display().to_string(), format!("Failed to remove log file: {}", e))
        });
    }

    let oldest = backup_path(base, policy.max_files);
    for stale in [gz_path(&oldest), oldest] {
        if let Err(e) = fs::remove_file(&stale).or_else(ignore_missing) {
            eprintln!(
                "[LOGGER WARNING] Failed to remove oldest backup {}: {}",
                stale.display(),
                e
            );
        }
    }

    for i in (1..policy.max_files).rev() {
        let from = backup_path(base, i);
        let to = backup_path(base, i + 1);
        for (from, to) in [(gz_path(&from), gz_path(&to)), (from, to)] {
            if from.exists() {
                fs::rename(&from, &to).map_err(|e| {
                    LoggerError::file_rotation(
                        from.display().to_string(),
                        format!("Failed to shift backup: {}", e),
                    )
                })?;
            }
        }
    }

    if base.exists() {
        let first = backup_path(base, 1);
        fs::rename(base, &first).map_err(|e| {
            LoggerError::file_rotation(
                base.display().to_string(),
                format!("Failed to rotate current log file: {}", e),
            )
        })?;
        if policy.compress {
            compress_file(&first)?;
        }
    }
    Ok(())
}

fn ignore_missing(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

/// Gzip `path` to `path.gz`, removing the original only on success
fn compress_file(path: &Path) -> Result<()> {
    let target = gz_path(path);
    let mut temp = target.clone().into_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let input = File::open(path).map_err(|e| {
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to open {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::with_capacity(64 * 1024, input);
    let output = File::create(&temp).map_err(|e| {
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to create {}", temp.display()),
            e,
        )
    })?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(64 * 1024, output),
        flate2::Compression::default(),
    );

    let streamed = (|| -> std::io::Result<()> {
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&chunk[..n])?;
        }
        encoder.finish()?.flush()
    })();

    if let Err(e) = streamed.and_then(|_| fs::rename(&temp, &target)) {
        let _ = fs::remove_file(&temp);
        return Err(LoggerError::io_operation(
            "compress log file",
            format!("Failed to compress {}", path.display()),
            e,
        ));
    }

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compressed {} but could not remove the original: {}",
            path.display(),
            e
        );
    }
    Ok(())
}
