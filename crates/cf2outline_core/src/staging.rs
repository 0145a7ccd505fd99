//! Locally staged export blobs.
//!
//! A [`StagedExport`] owns exactly one file under the staging directory. The
//! file lives for one page's export/import window: [`StagedExport::remove`]
//! deletes it on the success path and `Drop` deletes it on every other path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

#[derive(Debug)]
pub struct StagedExport {
    path: PathBuf,
    file_name: String,
    removed: bool,
}

impl StagedExport {
    pub fn write(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create staging dir {}", dir.display()))?;
        let staged = Self {
            path: dir.join(file_name),
            file_name: file_name.to_string(),
            removed: false,
        };
        // On failure `staged` drops here and takes the partial file with it.
        fs::write(&staged.path, bytes)
            .with_context(|| format!("failed to write {}", staged.path.display()))?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }

    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        remove_if_present(&self.path)
            .with_context(|| format!("failed to remove staged export {}", self.path.display()))
    }
}

impl Drop for StagedExport {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(error) = remove_if_present(&self.path) {
            warn!(path = %self.path.display(), %error, "failed to remove staged export");
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}
