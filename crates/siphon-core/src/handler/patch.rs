//! Patch handler: positioned writes into already downloaded files.

use crate::blob::{Blob, BlobKind, BlobStore};
use crate::error::{BridgeError, Result};
use crate::message::{PatchRequest, PatchSource};
use crate::path::PathResolver;
use std::io::{self, SeekFrom};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Write the patch source at `request.offset` into the target file.
///
/// The target must already exist. The source blob stays in the store. The
/// file is closed on every path out of this function, including failures.
/// Zero runs are streamed, so the announced size never has to fit in memory.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// - [`BridgeError::BlobNotFound`] if the named blob does not exist
/// - [`BridgeError::WrongBlobKind`] if the named blob is a download
/// - [`BridgeError::PatchSourceMissing`] if neither blob nor size is usable
/// - [`BridgeError::PathOutsideBase`] / [`BridgeError::Io`] from path
///   resolution and file operations
pub async fn handle_patch(
    resolver: &PathResolver,
    store: &BlobStore,
    request: &PatchRequest,
) -> Result<u64> {
    let path = resolver.resolve(&request.filename).await?;
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .await
        .map_err(|e| BridgeError::io(&path, e))?;

    let source = patch_bytes(store, request)?;

    file.seek(SeekFrom::Start(request.offset))
        .await
        .map_err(|e| BridgeError::io(&path, e))?;

    let written = match source {
        PatchBytes::Buffer(buffer) => {
            file.write_all(&buffer)
                .await
                .map_err(|e| BridgeError::io(&path, e))?;
            buffer.len() as u64
        }
        PatchBytes::Zeroes(size) => {
            let written = tokio::io::copy(&mut tokio::io::repeat(0).take(size), &mut file)
                .await
                .map_err(|e| BridgeError::io(&path, e))?;
            if written != size {
                return Err(BridgeError::io(
                    &path,
                    io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("zero fill stopped after {written} of {size} bytes"),
                    ),
                ));
            }
            written
        }
    };
    file.flush().await.map_err(|e| BridgeError::io(&path, e))?;

    tracing::debug!(
        "Patched {} bytes at offset {:#x} of {}",
        written,
        request.offset,
        request.filename
    );

    Ok(written)
}

/// Resolved patch contents
enum PatchBytes {
    Buffer(Vec<u8>),
    Zeroes(u64),
}

fn patch_bytes(store: &BlobStore, request: &PatchRequest) -> Result<PatchBytes> {
    match request.source() {
        Some(PatchSource::Blob(session)) => match store.get(&session) {
            Some(Blob::Unnamed(blob)) => {
                let buffer = blob.assemble();
                if buffer.len() as u64 != blob.declared_size() {
                    tracing::warn!(
                        "Blob {} announced {} bytes but holds {}",
                        session,
                        blob.declared_size(),
                        buffer.len()
                    );
                }
                Ok(PatchBytes::Buffer(buffer))
            }
            Some(other) => Err(BridgeError::wrong_kind(
                &session,
                BlobKind::Unnamed,
                other.kind(),
            )),
            None => Err(BridgeError::BlobNotFound(session)),
        },
        Some(PatchSource::Zeroes(size)) => Ok(PatchBytes::Zeroes(size)),
        None => Err(BridgeError::PatchSourceMissing {
            filename: request.filename.clone(),
        }),
    }
}
