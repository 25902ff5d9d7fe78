use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::access::{AccessGate, Readiness};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::mime::{MimeKind, TRANSCODE_TARGET, needs_transcode_for_mp4};
use crate::pump::{LifecycleListener, StreamPump};
use crate::file::KnownSize;
use crate::range::parse_range;
use crate::request::{decode_id, get_id, user_name};
use crate::{Ranged, RangedResponse, content_type_for, serve_stream};

/// Output of a transcoder: the converted byte stream and whatever has to be
/// released once the transfer is over.
pub struct Transcoded {
    pub stream: Box<dyn AsyncRead + Send + Unpin>,
    pub listener: Option<Arc<dyn LifecycleListener>>,
}

/// The external collaborator that converts sources which cannot be sent as is.
pub trait Transcoder: Send + Sync {
    /// AVC level of an MP4 source, `0` when unknown.
    fn avc_level(&self, _path: &Path) -> u32 {
        0
    }

    /// Starts converting `path` into `target`.
    fn transcode(&self, path: &Path, target: MimeKind) -> io::Result<Transcoded>;
}

/// Serves the files under `root` below a route prefix, gated by the
/// configured ip filter and server readiness.
#[derive(Clone)]
pub struct MediaService {
    config: Arc<ServerConfig>,
    readiness: Readiness,
    gate: AccessGate,
    root: PathBuf,
    prefix: String,
    pump: StreamPump,
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl MediaService {
    pub fn new(config: Arc<ServerConfig>, readiness: Readiness, root: impl Into<PathBuf>) -> Self {
        let gate = AccessGate::new(Arc::new(config.ip_filter()));
        MediaService {
            config,
            readiness,
            gate,
            root: root.into(),
            prefix: "/media/".to_string(),
            pump: StreamPump::default(),
            transcoder: None,
        }
    }

    /// Route prefix the resource id follows. Must start and end with `/`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn with_pump(mut self, pump: StreamPump) -> Self {
        self.pump = pump;
        self
    }

    /// A router answering `GET {prefix}{id}`. Serve it with
    /// `into_make_service_with_connect_info::<SocketAddr>()` so the client
    /// address reaches the gate.
    pub fn router(self) -> Router {
        let route = format!("{}{{*id}}", self.prefix);
        Router::new().route(&route, get(media)).with_state(self)
    }

    /// Runs one request through the gate, resolves the resource and starts
    /// its transfer.
    pub async fn handle(&self, remote: IpAddr, parts: &Parts) -> Result<RangedResponse, Error> {
        if !self.gate.allowed(remote, self.readiness.is_ready()) {
            return Err(Error::AccessDenied);
        }

        let raw_id = get_id(parts.uri.path(), &self.prefix);
        let decoded = decode_id(raw_id).ok_or_else(|| Error::NotFound(raw_id.to_string()))?;
        let id: &str = &decoded;
        let path = self.resolve_path(id)?;
        let length = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                debug!(path = %path.display(), "no such media file");
                return Err(Error::NotFound(id.to_string()));
            }
        };
        // A malformed header is rejected whichever way the resource is sent.
        let range = parse_range(Some(&parts.headers), length)?;
        let kind = MimeKind::from_path(&path);
        debug!(user = user_name(&parts.extensions), %remote, id, %kind, ?range, "media request");

        if self.is_direct(kind, &path) {
            let body = KnownSize::open(&path).await?;
            return Ranged::new(range, body, Some(content_type_for(&path)))
                .try_respond(&self.pump)
                .await;
        }

        let Some(transcoder) = &self.transcoder else {
            return Err(Error::TranscodeUnavailable(kind.to_string()));
        };

        info!(id, from = %kind, to = %TRANSCODE_TARGET, "transcoding");
        let transcoded = transcoder.transcode(&path, TRANSCODE_TARGET)?;
        Ok(serve_stream(
            transcoded.stream,
            HeaderValue::from_static(TRANSCODE_TARGET.mime()),
            transcoded.listener,
            &self.pump,
        ))
    }

    fn is_direct(&self, kind: MimeKind, path: &Path) -> bool {
        if !kind.is_direct() {
            return false;
        }
        let avc_level = match (&self.transcoder, kind) {
            (Some(transcoder), MimeKind::Mp4) => transcoder.avc_level(path),
            _ => 0,
        };
        !needs_transcode_for_mp4(kind, avc_level, self.config.web_mp4_trans)
    }

    // Only plain relative ids are served, anything reaching outside the
    // root is reported as missing.
    fn resolve_path(&self, id: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(id);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if id.is_empty() || !plain {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl fmt::Debug for MediaService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaService")
            .field("root", &self.root)
            .field("prefix", &self.prefix)
            .field("ready", &self.readiness.is_ready())
            .finish_non_exhaustive()
    }
}

async fn media(
    State(service): State<MediaService>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, _body) = request.into_parts();
    match service.handle(remote.ip(), &parts).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            debug!(%remote, path = parts.uri.path(), error = %e, "media request rejected");
            e.into_response()
        }
    }
}
