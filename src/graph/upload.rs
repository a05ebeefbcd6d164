//! Local file source for drive uploads.
//!
//! `UploadContent` owns the open file for the whole upload and holds a
//! shared lock on it, so no writer can take the file while its bytes are
//! being streamed. Whoever ends up holding it (the session, the Graph
//! client, or the request body stream) releases the handle and the lock when
//! it drops, on success and failure alike. Each session counts its live
//! upload handles so leaks are observable.

use std::fs::TryLockError;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::trace;

use super::GraphError;

#[derive(Debug)]
pub struct UploadContent {
    file: File,
    len: u64,
    path: PathBuf,
    open_handles: Arc<AtomicUsize>,
}

impl UploadContent {
    /// Open `path` for locked reading and register the handle with `open_handles`.
    pub async fn open(path: &Path, open_handles: Arc<AtomicUsize>) -> Result<Self, GraphError> {
        let owned = path.to_path_buf();
        let (file, len) = tokio::task::spawn_blocking(move || open_locked(&owned))
            .await
            .map_err(|e| GraphError::Io {
                context: format!("failed to open {}", path.display()),
                source: io::Error::other(e),
            })??;

        open_handles.fetch_add(1, Ordering::SeqCst);
        trace!(path = %path.display(), len, "upload source opened");
        Ok(UploadContent {
            file: File::from_std(file),
            len,
            path: path.to_path_buf(),
            open_handles,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open read-only and take a shared lock; the lock goes away with the handle.
fn open_locked(path: &Path) -> Result<(std::fs::File, u64), GraphError> {
    let io_err = |action: &str, source: io::Error| GraphError::Io {
        context: format!("failed to {action} {}", path.display()),
        source,
    };
    let file = std::fs::File::open(path).map_err(|e| io_err("open", e))?;
    file.try_lock_shared().map_err(|e| {
        let source = match e {
            TryLockError::WouldBlock => io::Error::new(
                io::ErrorKind::WouldBlock,
                "file is locked for writing by another process",
            ),
            TryLockError::Error(inner) => inner,
        };
        io_err("lock", source)
    })?;
    let len = file.metadata().map_err(|e| io_err("stat", e))?.len();
    Ok((file, len))
}

impl AsyncRead for UploadContent {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl Drop for UploadContent {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
        trace!(path = %self.path.display(), "upload source released");
    }
}
