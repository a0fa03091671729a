use crate::error::{BittorrentError, Result};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Keeps verified pieces in per-index temporaries beside the output file
/// until the whole file can be assembled.
///
/// Piece `i` of `out.bin` lives in `out.bin.piece-i`; assembly writes
/// `out.bin.part` and renames it over `out.bin`, so the output path only
/// ever holds a complete file.
#[derive(Debug, Clone)]
pub struct PieceStore {
    output: PathBuf,
}

impl PieceStore {
    pub fn new<P: AsRef<Path>>(output: P) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Temporary file holding one verified piece
    pub fn piece_path(&self, index: usize) -> PathBuf {
        self.with_suffix(&format!(".piece-{}", index))
    }

    fn part_path(&self) -> PathBuf {
        self.with_suffix(".part")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.output.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Write a verified piece to its temporary
    pub async fn write_piece(&self, index: usize, data: &[u8]) -> Result<()> {
        let path = self.piece_path(index);
        fs::write(&path, data)
            .await
            .map_err(|e| storage_error("writing", &path, e))?;

        debug!("Piece {} stored at {:?} ({} bytes)", index, path, data.len());
        Ok(())
    }

    /// Concatenate every piece temporary in index order into the output
    /// file, then remove the temporaries. Returns the number of bytes
    /// written.
    pub async fn assemble(&self, piece_count: usize) -> Result<u64> {
        let part = self.part_path();
        match self.write_part(&part, piece_count).await {
            Ok(written) => {
                fs::rename(&part, &self.output)
                    .await
                    .map_err(|e| storage_error("renaming", &part, e))?;
                self.remove_pieces(piece_count).await;

                info!("Assembled {} pieces into {:?} ({} bytes)", piece_count, self.output, written);
                Ok(written)
            }
            Err(e) => {
                self.cleanup(piece_count).await;
                Err(e)
            }
        }
    }

    async fn write_part(&self, part: &Path, piece_count: usize) -> Result<u64> {
        let mut file = File::create(part)
            .await
            .map_err(|e| storage_error("creating", part, e))?;

        let mut written = 0u64;
        for index in 0..piece_count {
            let path = self.piece_path(index);
            let data = fs::read(&path)
                .await
                .map_err(|e| storage_error("reading", &path, e))?;
            file.write_all(&data)
                .await
                .map_err(|e| storage_error("writing", part, e))?;
            written += data.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| storage_error("flushing", part, e))?;
        Ok(written)
    }

    /// Remove every temporary and the partial output, leaving nothing behind
    /// after a failed run.
    pub async fn cleanup(&self, piece_count: usize) {
        self.remove_pieces(piece_count).await;
        remove_if_present(&self.part_path()).await;
    }

    async fn remove_pieces(&self, piece_count: usize) {
        for index in 0..piece_count {
            remove_if_present(&self.piece_path(index)).await;
        }
    }
}

async fn remove_if_present(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> BittorrentError {
    BittorrentError::StorageError(format!("{} {}: {}", action, path.display(), err))
}
