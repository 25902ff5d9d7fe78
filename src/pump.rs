use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::stream::{PumpBody, PumpSink};

/// Bytes read from the source per iteration of the copy loop.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Observer tied to the lifetime of one transfer, typically used to release
/// whatever produced the source (a transcoder process, a lock on a file).
pub trait LifecycleListener: Send + Sync {
    /// Called when the transfer is handed to the pump.
    fn start(&self) {}

    /// Called exactly once after the sink has been closed, whatever the outcome.
    fn stop(&self);
}

/// Copies sources into sinks on dedicated tokio tasks.
#[derive(Debug, Clone, Copy)]
pub struct StreamPump {
    chunk_size: usize,
}

impl Default for StreamPump {
    fn default() -> Self {
        StreamPump { chunk_size: CHUNK_SIZE }
    }
}

impl StreamPump {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        StreamPump { chunk_size: chunk_size.max(1) }
    }

    /// An in-memory pipe whose write half feeds a response body. `length`
    /// is advertised as the body size hint when known.
    pub fn channel(&self, length: Option<u64>) -> (PumpSink, PumpBody) {
        let (writer, reader) = tokio::io::duplex(self.chunk_size);
        (PumpSink::new(writer), PumpBody::new(reader, length, self.chunk_size))
    }

    /// Starts copying `source` into `sink` and returns without waiting.
    ///
    /// Must be called from within a tokio runtime. The transfer ends at EOF,
    /// on the first read or write error, or when the sink's reader goes away.
    /// Either way both ends are closed and `listener` is stopped once.
    pub fn start<R, W>(
        &self,
        source: R,
        sink: W,
        listener: Option<Arc<dyn LifecycleListener>>,
    ) -> TransferTask
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if let Some(listener) = &listener {
            listener.start();
        }
        let sent = Arc::new(AtomicU64::new(0));
        let guard = StopGuard(listener);
        let handle = tokio::spawn(copy(guard, source, sink, self.chunk_size, sent.clone()));
        TransferTask { sent, handle }
    }
}

/// Handle to one in-flight transfer. Dropping it detaches the transfer, it
/// does not cancel it.
pub struct TransferTask {
    sent: Arc<AtomicU64>,
    handle: JoinHandle<u64>,
}

impl TransferTask {
    /// Bytes written to the sink so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the transfer to end and returns the number of bytes sent.
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(sent) => sent,
            Err(_) => self.sent.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("bytes_sent", &self.bytes_sent())
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct StopGuard(Option<Arc<dyn LifecycleListener>>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        if let Some(listener) = self.0.take() {
            listener.stop();
        }
    }
}

// `guard` is the first parameter so that it is dropped after `source` and
// `sink` even if the task unwinds.
async fn copy<R, W>(guard: StopGuard, mut source: R, mut sink: W, chunk_size: usize, sent: Arc<AtomicU64>) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; chunk_size];
    let outcome = async {
        loop {
            let n = source.read(&mut buffer).await?;
            if n == 0 {
                return Ok::<_, std::io::Error>(());
            }
            sink.write_all(&buffer[..n]).await?;
            sink.flush().await?;
            sent.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
    .await;

    let total = sent.load(Ordering::Relaxed);
    match outcome {
        Ok(()) => debug!(bytes_sent = total, "stream sent"),
        Err(e) => trace!(bytes_sent = total, error = %e, "sending stream with premature end"),
    }

    drop(source);
    let _ = sink.shutdown().await;
    drop(sink);
    drop(guard);
    total
}
