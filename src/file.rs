use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, Take};
use tracing::debug;

use crate::error::Error;
use crate::range::ByteRange;

/// A seekable source with a fixed byte size, the input of a ranged response.
pub struct KnownSize<B> {
    byte_size: u64,
    body: B,
}

impl<B> std::fmt::Debug for KnownSize<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownSize")
            .field("byte_size", &self.byte_size)
            .finish()
    }
}

impl KnownSize<tokio::fs::File> {
    /// Opens `path` and reads its size from the file metadata. A missing
    /// file is reported as [`Error::NotFound`] carrying only the file name,
    /// so that nothing has been committed to the response yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<KnownSize<tokio::fs::File>, Error> {
        let path = path.as_ref();
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(path)),
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(not_found(path));
        }
        Ok(KnownSize { byte_size: metadata.len(), body: file })
    }
}

fn not_found(path: &Path) -> Error {
    debug!(path = %path.display(), "no such file");
    let name = path.file_name().unwrap_or(path.as_os_str());
    Error::NotFound(name.to_string_lossy().into_owned())
}

impl<B> KnownSize<B> {
    /// The total size of the underlying source.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin> KnownSize<B> {
    /// Uses `seek` to determine size by seeking to the end and getting stream position.
    pub async fn seek(mut body: B) -> io::Result<KnownSize<B>> {
        let byte_size = body.seek(io::SeekFrom::End(0)).await?;
        Ok(KnownSize { byte_size, body })
    }

    /// Positions the source at the start of `span` and limits it to the span's length.
    pub async fn into_window(mut self, span: ByteRange) -> io::Result<Take<B>> {
        self.body.seek(io::SeekFrom::Start(span.start)).await?;
        Ok(self.body.take(span.len()))
    }
}
