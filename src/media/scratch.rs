//! Scratch files for downloaded media.
//!
//! Every probe request owns exactly one [`ScratchFile`]. The handle is
//! consumed by [`ScratchFile::release`], which deletes the file and swallows
//! any error. A handle that is dropped without being released (early return,
//! cancelled request, panic) still removes its file through the underlying
//! [`tempfile::TempPath`].

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Prefix given to every scratch file so stray files are easy to attribute.
pub const SCRATCH_PREFIX: &str = "mediaprobe-";

/// Directory in which scratch files are allocated.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Scratch space in the system temporary directory.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty, uniquely named file opened for binary write.
    ///
    /// File creation runs on the blocking pool.
    pub async fn acquire(&self) -> io::Result<ScratchFile> {
        let dir = self.dir.clone();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(SCRATCH_PREFIX)
                .tempfile_in(dir)
        })
        .await
        .map_err(io::Error::other)??;
        let (file, path) = named.into_parts();
        tracing::debug!(path = %path.display(), "allocated scratch file");
        Ok(ScratchFile {
            file: Some(File::from_std(file)),
            path,
        })
    }
}

impl Default for ScratchSpace {
    fn default() -> Self {
        Self::system()
    }
}

/// A scratch file owned by a single request.
#[derive(Debug)]
pub struct ScratchFile {
    file: Option<File>,
    path: TempPath,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `chunk` to the file.
    pub async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(io::Error::other("scratch file already closed for writing")),
        }
    }

    /// Flush buffered writes and close the write handle.
    ///
    /// The file stays on disk until [`release`](Self::release) so the
    /// analyzer can read it by path.
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Delete the file. Failures are logged and otherwise ignored.
    pub async fn release(mut self) {
        // Close our handle first; some platforms refuse to unlink open files.
        drop(self.file.take());
        let shown = self.path.display().to_string();
        let path = self.path;
        match tokio::task::spawn_blocking(move || path.close()).await {
            Ok(Ok(())) => tracing::debug!(path = %shown, "released scratch file"),
            Ok(Err(err)) => {
                tracing::warn!(path = %shown, error = %err, "failed to remove scratch file")
            }
            Err(err) => {
                tracing::warn!(path = %shown, error = %err, "scratch cleanup task failed")
            }
        }
    }
}
