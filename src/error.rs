use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::ContentRange;

/// A `Range` header or size string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("missing '=' in range header: {0:?}")]
    MissingUnit(String),
    #[error("invalid number {value:?} in {input:?}")]
    InvalidNumber { input: String, value: String },
    #[error("range start {start} is past range end {end}")]
    Inverted { start: u64, end: u64 },
    #[error("range header is not valid text")]
    NotText,
}

/// Errors surfaced to the request handler before any response header is committed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed range: {0}")]
    Range(#[from] ParseError),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("access denied")]
    AccessDenied,
    #[error("no transcoder available for {0}")]
    TranscodeUnavailable(String),
    #[error(transparent)]
    NotSatisfiable(#[from] RangeNotSatisfiable),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Server-side paths and io details stay in the logs.
        let (status, body) = match self {
            Error::NotSatisfiable(e) => return e.into_response(),
            e @ Error::Range(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "resource not found".to_string()),
            e @ Error::AccessDenied => (StatusCode::FORBIDDEN, e.to_string()),
            e @ Error::TranscodeUnavailable(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string()),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string()),
        };
        (status, body).into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("range not satisfiable")]
pub struct RangeNotSatisfiable(pub ContentRange);

impl RangeNotSatisfiable {
    pub(crate) fn for_length(total_bytes: u64) -> Self {
        RangeNotSatisfiable(ContentRange::unsatisfied_bytes(total_bytes))
    }
}

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.0);
        (status, header, ()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_of(error: Error) -> (StatusCode, String) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert_eq!(StatusCode::BAD_REQUEST, body_of(ParseError::NotText.into()).await.0);
        assert_eq!(StatusCode::FORBIDDEN, body_of(Error::AccessDenied).await.0);
        let (status, body) = body_of(Error::TranscodeUnavailable("audio/wav".to_string())).await;
        assert_eq!(StatusCode::UNSUPPORTED_MEDIA_TYPE, status);
        assert!(body.contains("audio/wav"));

        let response = Error::from(RangeNotSatisfiable::for_length(54)).into_response();
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert_eq!("bytes */54", response.headers()["content-range"]);
    }

    #[tokio::test]
    async fn test_bodies_hide_server_paths() {
        let (status, body) = body_of(Error::NotFound("/srv/media/private/clip.webm".to_string())).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
        assert!(!body.contains("/srv/media"), "{body}");

        let io = io::Error::new(io::ErrorKind::PermissionDenied, "/srv/media/private: permission denied");
        let (status, body) = body_of(io.into()).await;
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert!(!body.contains("/srv/media"), "{body}");
    }
}
