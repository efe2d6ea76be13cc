//! Chunk-copy handler: small binaries assembled in memory.

use crate::blob::BlobStore;
use crate::error::Result;
use crate::message::MemcpyEvent;

/// Apply one chunk-copy event to the store.
///
/// `begin` (re)starts the blob; `data` appends the payload as the next chunk.
/// There is no end event: a later patch reads the chunks as they stand.
///
/// # Errors
///
/// - [`crate::BridgeError::UnknownSession`] if `data` names no blob
/// - [`crate::BridgeError::WrongBlobKind`] if the session is a download
/// - [`crate::BridgeError::OutOfOrderChunk`] if the index is not the next one
/// - [`crate::BridgeError::SessionInUse`] if `begin` hits an open download
pub fn handle_memcpy(
    store: &mut BlobStore,
    event: MemcpyEvent,
    data: Option<Vec<u8>>,
) -> Result<()> {
    match event {
        MemcpyEvent::Begin { session, size } => {
            tracing::debug!("memcpy {} begin ({} bytes)", session, size);
            store.begin_unnamed(session, size)
        }
        MemcpyEvent::Data { session, index } => {
            tracing::trace!(
                "memcpy {} chunk {} ({} bytes)",
                session,
                index,
                data.as_ref().map_or(0, Vec::len)
            );
            store
                .unnamed_mut(&session)?
                .accept_chunk(&session, index, data)
        }
        MemcpyEvent::Other => {
            tracing::debug!("Ignoring unknown memcpy event");
            Ok(())
        }
    }
}
