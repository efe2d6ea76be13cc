//! Download handler: large binaries streamed straight to disk.

use crate::blob::{BlobStore, NamedBlob};
use crate::error::{BridgeError, Result};
use crate::message::DownloadEvent;
use crate::path::PathResolver;
use std::path::Path;
use tokio::fs::{File, OpenOptions};

/// Apply one download event.
///
/// `begin` creates (or truncates) the local file with the announced
/// permissions, `data` appends the payload, `end` closes the file and drops
/// the session from the store.
///
/// # Errors
///
/// - [`BridgeError::UnknownSession`] / [`BridgeError::WrongBlobKind`] for
///   `data` and `end` on a session that is not an open download
/// - [`BridgeError::SessionInUse`] if `begin` reuses an open download's key
/// - [`BridgeError::PathOutsideBase`] / [`BridgeError::Io`] from path
///   resolution and file operations
pub async fn handle_download(
    resolver: &PathResolver,
    store: &mut BlobStore,
    event: DownloadEvent,
    data: Option<Vec<u8>>,
) -> Result<()> {
    match event {
        DownloadEvent::Begin {
            session,
            filename,
            stat,
        } => {
            store.check_begin(&session)?;

            let path = resolver.resolve(&filename).await?;
            let file = create_with_mode(&path, stat.permissions()).await?;

            tracing::debug!(
                "download {} begin: {} -> {} (mode {:o})",
                session,
                filename,
                path.display(),
                stat.permissions()
            );

            store.begin_named(session, NamedBlob::new(filename, path, file))
        }
        DownloadEvent::Data { session } => {
            let blob = store.named_mut(&session)?;
            if let Some(data) = data {
                blob.write(&data).await?;
            }
            Ok(())
        }
        DownloadEvent::End { session } => {
            let blob = store.take_named(&session)?;
            let filename = blob.filename().to_string();
            let written = blob.close().await?;

            tracing::info!("Downloaded {} ({} bytes)", filename, written);
            Ok(())
        }
        DownloadEvent::Other => {
            tracing::debug!("Ignoring unknown download event");
            Ok(())
        }
    }
}

/// Create or truncate `path` for writing with exactly `mode` permissions
async fn create_with_mode(path: &Path, mode: u32) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let file = options
        .open(path)
        .await
        .map_err(|e| BridgeError::io(path, e))?;

    // open(2) filters the mode through the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| BridgeError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(file)
}
