use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum_media_transfer::{
    LifecycleListener, MediaService, MimeKind, Readiness, ServerConfig, Transcoded, Transcoder,
};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};

struct Release(Arc<AtomicUsize>);

impl LifecycleListener for Release {
    fn stop(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Produces an endless stream, like a live transcode the client abandons.
struct EndlessTranscoder {
    stops: Arc<AtomicUsize>,
}

impl Transcoder for EndlessTranscoder {
    fn transcode(&self, _path: &Path, _target: MimeKind) -> io::Result<Transcoded> {
        Ok(Transcoded {
            stream: Box::new(tokio::io::repeat(b'o')),
            listener: Some(Arc::new(Release(self.stops.clone()))),
        })
    }
}

async fn spawn_server(service: MediaService) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = service.router().into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn media_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let movie: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();
    std::fs::write(root.path().join("movie.mp4"), movie).unwrap();
    std::fs::write(root.path().join("voice.wav"), b"RIFF....WAVE").unwrap();
    root
}

#[tokio::test]
async fn test_full_and_partial_over_http() {
    let root = media_root();
    let service = MediaService::new(Arc::new(ServerConfig::default()), Readiness::new(true), root.path());
    let base = spawn_server(service).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/media/movie.mp4")).send().await.unwrap();
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!("bytes", response.headers()[ACCEPT_RANGES]);
    assert_eq!("video/mp4", response.headers()[CONTENT_TYPE]);
    assert_eq!("200000", response.headers()[CONTENT_LENGTH]);
    let body = response.bytes().await.unwrap();
    assert_eq!(200_000, body.len());
    assert_eq!(255, body[255]);

    let response = client
        .get(format!("{base}/media/movie.mp4"))
        .header(RANGE, "bytes=100000-100009")
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
    assert_eq!("bytes 100000-100009/200000", response.headers()[CONTENT_RANGE]);
    let body = response.bytes().await.unwrap();
    let expected: Vec<u8> = (100_000..100_010u32).map(|i| (i % 256) as u8).collect();
    assert_eq!(expected, body.to_vec());
}

#[tokio::test]
async fn test_error_statuses_over_http() {
    let root = media_root();
    let readiness = Readiness::new(false);
    let service = MediaService::new(Arc::new(ServerConfig::default()), readiness.clone(), root.path());
    let base = spawn_server(service).await;
    let client = reqwest::Client::new();
    let get = |path: &str, range: Option<&str>| {
        let mut request = client.get(format!("{base}{path}"));
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        request.send()
    };

    assert_eq!(StatusCode::FORBIDDEN, get("/media/movie.mp4", None).await.unwrap().status());
    readiness.set_ready(true);
    assert_eq!(StatusCode::OK, get("/media/movie.mp4", Some("bytes=0-")).await.unwrap().status());
    assert_eq!(StatusCode::BAD_REQUEST, get("/media/movie.mp4", Some("bytes=a-b")).await.unwrap().status());
    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, get("/media/movie.mp4", Some("bytes=300000-")).await.unwrap().status());
    assert_eq!(StatusCode::NOT_FOUND, get("/media/nothing.mp4", None).await.unwrap().status());
    assert_eq!(StatusCode::UNSUPPORTED_MEDIA_TYPE, get("/media/voice.wav", None).await.unwrap().status());

    let missing = get("/media/nothing.mkv", None).await.unwrap();
    assert_eq!(StatusCode::NOT_FOUND, missing.status());
    let body = missing.text().await.unwrap();
    assert!(!body.contains(&*root.path().to_string_lossy()), "{body}");
}

#[tokio::test]
async fn test_encoded_names_over_http() {
    let root = media_root();
    std::fs::write(root.path().join("my clip.webm"), b"spaced out").unwrap();
    let service = MediaService::new(Arc::new(ServerConfig::default()), Readiness::new(true), root.path());
    let base = spawn_server(service).await;

    let response = reqwest::get(format!("{base}/media/my%20clip.webm")).await.unwrap();
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!("spaced out", response.text().await.unwrap());
}

#[tokio::test]
async fn test_client_disconnect_releases_transcode() {
    let root = media_root();
    let stops = Arc::new(AtomicUsize::new(0));
    let service = MediaService::new(Arc::new(ServerConfig::default()), Readiness::new(true), root.path())
        .with_transcoder(Arc::new(EndlessTranscoder { stops: stops.clone() }));
    let base = spawn_server(service).await;

    let response = reqwest::get(format!("{base}/media/voice.wav")).await.unwrap();
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!("video/ogg", response.headers()[CONTENT_TYPE]);
    assert!(response.headers().get(CONTENT_LENGTH).is_none());

    let mut stream = response.bytes_stream();
    let mut received = 0;
    while received < 100_000 {
        received += stream.next().await.unwrap().unwrap().len();
    }
    assert_eq!(0, stops.load(Ordering::SeqCst));
    drop(stream);

    tokio::time::timeout(Duration::from_secs(10), async {
        while stops.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("transcode listener should be stopped after the client went away");
    assert_eq!(1, stops.load(Ordering::SeqCst));
}
