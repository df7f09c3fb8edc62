use crate::{IndexerError, Result};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const CAPTURE_LOCK_FILE: &str = "capture.lock";

/// Cross-process exclusive lock on a state directory; released on drop
pub struct CaptureLock {
    file: std::fs::File,
    path: PathBuf,
}

impl CaptureLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CaptureLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Block (off the runtime) until this process holds `<state_dir>/capture.lock`
pub async fn acquire_capture_lock(state_dir: &Path) -> Result<CaptureLock> {
    tokio::fs::create_dir_all(state_dir).await?;
    let path = state_dir.join(CAPTURE_LOCK_FILE);

    tokio::task::spawn_blocking(move || -> Result<CaptureLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                IndexerError::Other(format!("open capture lock {}: {err}", path.display()))
            })?;

        let start = Instant::now();
        file.lock_exclusive().map_err(|err| {
            IndexerError::Other(format!("acquire capture lock {}: {err}", path.display()))
        })?;
        let waited = start.elapsed();
        if waited.as_millis() > 0 {
            log::debug!("Waited {waited:?} for capture lock {}", path.display());
        }

        Ok(CaptureLock { file, path })
    })
    .await
    .map_err(|err| IndexerError::Other(format!("join capture lock task: {err}")))?
}
