use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::error::BenchError;

/// Anonymous temporary file that receives downloaded segment bodies.
///
/// The file has no name on disk, so the operating system reclaims it however
/// the process exits. It holds at most one segment at a time.
#[derive(Debug)]
pub struct ScratchFile {
    file: File,
}

impl ScratchFile {
    pub fn create() -> Result<Self, BenchError> {
        let file = tempfile::tempfile()?;
        debug!("Created anonymous scratch file for segment bodies");
        Ok(Self {
            file: File::from_std(file),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_file(file: std::fs::File) -> Self {
        Self {
            file: File::from_std(file),
        }
    }

    /// Truncates the file ahead of the next segment.
    pub async fn reset(&mut self) -> Result<(), BenchError> {
        self.file.set_len(0).await?;
        self.file.rewind().await?;
        Ok(())
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), BenchError> {
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), BenchError> {
        self.file.flush().await?;
        Ok(())
    }

    pub async fn size(&self) -> Result<u64, BenchError> {
        Ok(self.file.metadata().await?.len())
    }
}
