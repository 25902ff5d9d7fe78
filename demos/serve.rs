use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use axum_media_transfer::{MediaService, Readiness, ServerConfig, StreamPump, serve_bytes};
use bytes::Bytes;
use tracing_subscriber::EnvFilter;

const LOGO: &[u8] = b"\x89PNG\r\n\x1a\n";

// usage: serve [media-root] [ip-filter]
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let mut args = std::env::args().skip(1);
    let root = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("test"));
    let config = ServerConfig {
        ip_filter: args.next().unwrap_or_default(),
        ..Default::default()
    };
    tracing::info!(root = %root.display(), filter = %config.ip_filter, width = config.web_width(), height = config.web_height(), "starting");

    let readiness = Readiness::new(false);
    let media = MediaService::new(Arc::new(config), readiness.clone(), root).router();
    let router = Router::new()
        .route("/logo", get(logo))
        .merge(media);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    readiness.set_ready(true);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}

async fn logo() -> impl IntoResponse {
    serve_bytes(Bytes::from_static(LOGO), HeaderValue::from_static("image/png"), &StreamPump::default())
}
