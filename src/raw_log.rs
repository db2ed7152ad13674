/// Raw log file: an append-only copy of every accepted ping line.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Errors opening the raw log.
#[derive(Debug)]
pub enum RawLogError {
    /// Failed to create the parent directory.
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to open the file for appending.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for RawLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawLogError::CreateDir { path, source } => {
                write!(
                    f,
                    "failed to create raw log directory {}: {}",
                    path.display(),
                    source
                )
            }
            RawLogError::Open { path, source } => {
                write!(f, "failed to open raw log {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RawLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RawLogError::CreateDir { source, .. } => Some(source),
            RawLogError::Open { source, .. } => Some(source),
        }
    }
}

/// Open `path` for appending, creating it and its parent directory if needed.
///
/// The returned `File` is unbuffered, so every line lands on disk as it
/// is written.
pub fn open(path: &Path) -> Result<File, RawLogError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| RawLogError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RawLogError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
    tracing::info!(path = %path.display(), "raw log opened");
    Ok(file)
}
