use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::DurableStore;
use crate::types::error::{RecorderError, Result};

/// Flat-file store: one file per recorder, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Fsync a directory so a rename into it survives a crash.
///
/// Directories cannot be synced on Windows; there the rename is left to the OS.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

impl DurableStore for FileStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RecorderError::Persistence(format!(
                "Failed to read {:?}: {}",
                self.path, e
            ))),
        }
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        let dir = self.directory();
        fs::create_dir_all(dir).map_err(|e| {
            RecorderError::Persistence(format!("Failed to create {:?}: {}", dir, e))
        })?;

        // Write aside and rename so a crash never leaves a half-written file
        let temp = self.temp_path();
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp, &self.path)?;
            sync_dir(self.directory())
        };
        write().map_err(|e| {
            RecorderError::Persistence(format!("Failed to write {:?}: {}", self.path, e))
        })?;

        debug!("Saved {} bytes to {:?}", bytes.len(), self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
