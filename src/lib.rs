//! # axum-media-transfer
//!
//! Range-aware media delivery for [`axum`][1].
//!
//! A request for a media resource goes through an [`AccessGate`], has its
//! `Range` header resolved into a [`Range`], and is answered by a
//! [`RangedResponse`] whose body is fed by a [`StreamPump`]. The pump copies
//! bytes on its own tokio task, so the handler returns as soon as the
//! status and headers are known, however long the playback lasts.
//!
//! [`MimeKind`] decides whether a source can be sent as is or has to go
//! through a [`Transcoder`] first.
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use axum_media_transfer::{MediaService, Readiness, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ServerConfig::default());
//!     let readiness = Readiness::new(true);
//!     let app = MediaService::new(config, readiness, "/srv/media").router();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! [1]: https://docs.rs/axum

mod access;
mod config;
mod error;
mod file;
mod mime;
mod pump;
mod range;
mod request;
mod service;
mod stream;

use std::path::Path;
use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek};

pub use access::{AccessGate, AddressFilter, IpFilter, Readiness};
pub use config::{ServerConfig, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use error::{Error, ParseError, RangeNotSatisfiable};
pub use file::KnownSize;
pub use mime::{MimeKind, MP4_DIRECT_LEVEL_LIMIT, TRANSCODE_TARGET, needs_transcode_for_mp4, transcode_target_mime};
pub use pump::{CHUNK_SIZE, LifecycleListener, StreamPump, TransferTask};
pub use range::{ByteRange, Range, parse_range, resolve};
pub use request::{DEFAULT_ID, Principal, decode_id, get_cookie, get_id, get_query_var, strip, user_name};
pub use service::{MediaService, Transcoded, Transcoder};
pub use stream::{PumpBody, PumpSink};

const OCTET_STREAM: &str = "application/octet-stream";

/// A ranged response waiting to be started: the resolved [`Range`] over a
/// [`KnownSize`] source.
pub struct Ranged<B> {
    range: Range,
    body: KnownSize<B>,
    content_type: Option<HeaderValue>,
    listener: Option<Arc<dyn LifecycleListener>>,
}

impl<B: AsyncRead + AsyncSeek + Unpin + Send + 'static> Ranged<B> {
    /// Construct a ranged response over a [`KnownSize`] source and the
    /// range resolved from the request.
    pub fn new(range: Range, body: KnownSize<B>, content_type: Option<HeaderValue>) -> Self {
        Ranged { range, body, content_type, listener: None }
    }

    /// Attach a listener stopped when the transfer ends.
    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Computes the headers, positions the source and starts the pump.
    /// Returns [`Error::NotSatisfiable`] if the range starts past the end.
    pub async fn try_respond(self, pump: &StreamPump) -> Result<RangedResponse, Error> {
        let total_bytes = self.body.byte_size();
        let span = self.range.window(total_bytes)?;

        let content_range = if span.is_full(total_bytes) {
            None
        } else {
            let content_range = ContentRange::bytes(span.start..span.end_exclusive, total_bytes)
                .map_err(|_| RangeNotSatisfiable::for_length(total_bytes))?;
            Some(content_range)
        };

        let source = self.body.into_window(span).await?;
        let (sink, stream) = pump.channel(Some(span.len()));
        let transfer = pump.start(source, sink, self.listener);

        Ok(RangedResponse {
            content_range,
            content_length: Some(ContentLength(span.len())),
            content_type: self.content_type.unwrap_or_else(|| HeaderValue::from_static(OCTET_STREAM)),
            stream,
            transfer,
        })
    }
}

impl<B> std::fmt::Debug for Ranged<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ranged")
            .field("range", &self.range)
            .field("body", &self.body)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Computed headers and the body of a response whose transfer has already
/// started. Implements [`IntoResponse`].
///
/// The status is `206 Partial Content` when `content_range` is set and
/// `200 OK` otherwise. Sources of unknown length carry no `Content-Length`.
#[derive(Debug)]
pub struct RangedResponse {
    pub content_range: Option<ContentRange>,
    pub content_length: Option<ContentLength>,
    pub content_type: HeaderValue,
    pub stream: PumpBody,
    pub transfer: TransferTask,
}

impl IntoResponse for RangedResponse {
    fn into_response(self) -> Response {
        let status = match self.content_range {
            Some(_) => StatusCode::PARTIAL_CONTENT,
            None => StatusCode::OK,
        };
        let accept_ranges = self.content_length.map(|_| TypedHeader(AcceptRanges::bytes()));
        let content_range = self.content_range.map(TypedHeader);
        let content_length = self.content_length.map(TypedHeader);
        let content_type = [(CONTENT_TYPE, self.content_type)];

        (status, accept_ranges, content_range, content_length, content_type, self.stream).into_response()
    }
}

/// Serves a file, honoring the request's `Range` header.
///
/// A missing file fails with [`Error::NotFound`] and a malformed range with
/// [`Error::Range`], both before anything is committed to the client.
pub async fn serve_file(path: impl AsRef<Path>, headers: &HeaderMap, pump: &StreamPump) -> Result<RangedResponse, Error> {
    let path = path.as_ref();
    let body = KnownSize::open(path).await?;
    let range = parse_range(Some(headers), body.byte_size())?;
    tracing::debug!(path = %path.display(), size = body.byte_size(), ?range, "serving file");
    Ranged::new(range, body, Some(content_type_for(path)))
        .try_respond(pump)
        .await
}

/// Serves an in-memory buffer in full, e.g. a bundled image.
pub fn serve_bytes(bytes: Bytes, content_type: HeaderValue, pump: &StreamPump) -> RangedResponse {
    let length = bytes.len() as u64;
    let (sink, stream) = pump.channel(Some(length));
    let transfer = pump.start(std::io::Cursor::new(bytes), sink, None);
    RangedResponse {
        content_range: None,
        content_length: Some(ContentLength(length)),
        content_type,
        stream,
        transfer,
    }
}

/// Serves a source of unknown length, e.g. transcoder output.
pub fn serve_stream<R>(
    source: R,
    content_type: HeaderValue,
    listener: Option<Arc<dyn LifecycleListener>>,
    pump: &StreamPump,
) -> RangedResponse
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (sink, stream) = pump.channel(None);
    let transfer = pump.start(source, sink, listener);
    RangedResponse {
        content_range: None,
        content_length: None,
        content_type,
        stream,
        transfer,
    }
}

fn content_type_for(path: &Path) -> HeaderValue {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref()).unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM))
}
