//! Socket read streams.
//!
//! Each accepted socket's read half becomes a stream of [`ReadEvent`]s
//! tagged with its connection id. The server merges all of them into one
//! `SelectAll` and waits on it alongside the listener, so a single task
//! observes readiness on every socket.

// ============================================================================
// Imports
// ============================================================================

use std::io;

use futures_util::stream::{self, AbortHandle, BoxStream, StreamExt, abortable};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::identifiers::ConnectionId;

// ============================================================================
// Types
// ============================================================================

/// Outcome of one read.
#[derive(Debug)]
pub(crate) enum ReadEvent {
    /// Bytes received.
    Data(Vec<u8>),
    /// Zero-length read: the peer closed its side.
    Eof,
    /// The read failed.
    Failed(io::Error),
}

/// Read stream of one connection.
pub(crate) type ReadStream = BoxStream<'static, (ConnectionId, ReadEvent)>;

// ============================================================================
// Constructor
// ============================================================================

/// Turns a read half into a stream of chunks of at most `chunk_size` bytes.
///
/// The stream ends after `Eof` or `Failed`, or once the returned handle
/// is aborted.
pub(crate) fn read_stream<R>(
    id: ConnectionId,
    reader: R,
    chunk_size: usize,
) -> (ReadStream, AbortHandle)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunks = stream::unfold(Some(reader), move |state| async move {
        let mut reader = state?;
        let mut buffer = vec![0u8; chunk_size];

        match reader.read(&mut buffer).await {
            Ok(0) => Some((ReadEvent::Eof, None)),
            Ok(n) => {
                buffer.truncate(n);
                Some((ReadEvent::Data(buffer), Some(reader)))
            }
            Err(e) => Some((ReadEvent::Failed(e), None)),
        }
    });

    let (chunks, handle) = abortable(chunks);
    (chunks.map(move |event| (id, event)).boxed(), handle)
}

// ============================================================================
// Tests
// ============================================================================
