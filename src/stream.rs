use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{Response, IntoResponse};
use bytes::{Bytes, BytesMut};
use http_body::{Body, SizeHint, Frame};
use futures::Stream;
use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Write half of a pump channel. Implements [`AsyncWrite`].
///
/// Writes fail with [`io::ErrorKind::BrokenPipe`] once the paired
/// [`PumpBody`] has been dropped.
#[pin_project]
#[derive(Debug)]
pub struct PumpSink {
    #[pin]
    pipe: DuplexStream,
}

impl PumpSink {
    pub(crate) fn new(pipe: DuplexStream) -> Self {
        PumpSink { pipe }
    }
}

impl AsyncWrite for PumpSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().pipe.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().pipe.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().pipe.poll_shutdown(cx)
    }
}

/// Response body fed by a pump. Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[pin_project]
#[derive(Debug)]
pub struct PumpBody {
    buffer: BytesMut,
    buffer_size: usize,
    length: Option<u64>,
    #[pin]
    pipe: DuplexStream,
}

impl PumpBody {
    pub(crate) fn new(pipe: DuplexStream, length: Option<u64>, buffer_size: usize) -> Self {
        PumpBody {
            buffer: BytesMut::with_capacity(buffer_size),
            buffer_size,
            length,
            pipe,
        }
    }

    /// Number of bytes this body will yield, when known.
    pub fn length(&self) -> Option<u64> {
        self.length
    }
}

impl IntoResponse for PumpBody {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for PumpBody {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        match self.length {
            Some(length) => SizeHint::with_exact(length),
            None => SizeHint::default(),
        }
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for PumpBody {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.project();
        let buffer = this.buffer;
        let uninit = buffer.spare_capacity_mut();
        let mut read_buf = ReadBuf::uninit(uninit);

        match this.pipe.poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Ok(())) => {
                match read_buf.filled().len() {
                    0 => Poll::Ready(None),
                    n => {
                        // SAFETY: poll_read has filled the buffer with `n`
                        // additional bytes. `buffer.len` should always be
                        // 0 here, but include it for rigorous correctness
                        unsafe { buffer.set_len(buffer.len() + n); }

                        // replace state buffer and take this one to return
                        let chunk = mem::replace(buffer, BytesMut::with_capacity(*this.buffer_size));
                        Poll::Ready(Some(Ok(chunk.freeze())))
                    }
                }
            }
        }
    }
}
