use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tokio::fs;
use tracing::warn;

use crate::error::{ArmadaError, Result};

/// No healthy holder keeps the lock anywhere near this long, so a lock
/// older than the acquisition timeout is presumed orphaned by a crashed
/// process and is reclaimed.
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Cross-process advisory lock backed by a directory.
///
/// `mkdir` is atomic on every platform we care about, so whoever creates
/// `<target>.lock` first owns the lock. Works across unrelated processes,
/// which a tokio mutex cannot.
#[derive(Debug)]
pub struct FileLock {
    lock_dir: PathBuf,
}

impl FileLock {
    /// Acquire the lock guarding `target`, retrying until [`LOCK_TIMEOUT`].
    pub async fn acquire(target: &Path) -> Result<Self> {
        let lock_dir = target.with_extension("lock");
        let deadline = Instant::now() + LOCK_TIMEOUT;

        loop {
            match fs::create_dir(&lock_dir).await {
                Ok(()) => return Ok(Self { lock_dir }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&lock_dir).await {
                        warn!(lock = %lock_dir.display(), "reclaiming stale lock");
                        let _ = fs::remove_dir(&lock_dir).await;
                        continue;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Parent directory missing; let the caller surface it.
                    if let Some(parent) = lock_dir.parent() {
                        fs::create_dir_all(parent).await?;
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(ArmadaError::LockTimeout {
                    path: lock_dir,
                    timeout_ms: LOCK_TIMEOUT.as_millis() as u64,
                });
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    async fn is_stale(lock_dir: &Path) -> bool {
        let Ok(meta) = fs::metadata(lock_dir).await else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > LOCK_TIMEOUT)
            .unwrap_or(false)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Synchronous removal; Drop cannot await.
        if let Err(e) = std::fs::remove_dir(&self.lock_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(lock = %self.lock_dir.display(), error = %e, "failed to release lock");
            }
        }
    }
}
