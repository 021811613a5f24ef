use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::range::{parse_range_header, ByteRange, RangeError};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

const CHANNEL_CAPACITY: usize = 32;

/// Reads at most `remaining` bytes from `inner` in fixed-size chunks.
pub struct ChunkReader<R> {
    inner: R,
    remaining: u64,
    chunk_size: usize,
}

impl ChunkReader<File> {
    pub fn open(path: &Path, start: u64, len: u64, chunk_size: usize) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }
        Ok(Self::new(file, len, chunk_size))
    }
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, len: u64, chunk_size: usize) -> Self {
        Self {
            inner,
            remaining: len,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let want = (self.chunk_size as u64).min(self.remaining) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0usize;
        while filled < want {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.remaining = 0;
                    return Some(Err(err));
                }
            }
        }
        if filled == 0 {
            // EOF before the requested length.
            self.remaining = 0;
            return None;
        }
        buf.truncate(filled);
        self.remaining -= filled as u64;
        Some(Ok(Bytes::from(buf)))
    }
}

#[derive(Debug)]
pub enum StreamError {
    NotFound,
    Io(io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::NotFound => write!(f, "file not found"),
            StreamError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            StreamError::NotFound
        } else {
            StreamError::Io(err)
        }
    }
}

/// Streams `path`, honouring an optional `Range` header.
///
/// The size is read from the filesystem on every call. Without a range the
/// whole file is sent with 200; a range yields 206 with `Content-Range`, and a
/// start past the end of the file yields 416.
pub async fn stream_file(
    path: &Path,
    range_header: Option<&str>,
    chunk_size: usize,
    fallback_mime: &str,
) -> Result<Response, StreamError> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(StreamError::NotFound);
    }
    let size = metadata.len();
    let mime = mime_guess::from_path(path).first_raw().unwrap_or(fallback_mime);

    let (status, range) = match range_header {
        Some(value) => match parse_range_header(value, size) {
            Ok(range) => (StatusCode::PARTIAL_CONTENT, Some(range)),
            Err(RangeError::Unsatisfiable) => {
                debug!("Unsatisfiable range {:?} for {:?} ({} bytes)", value, path, size);
                return Ok(unsatisfiable_response(size));
            }
        },
        None => (StatusCode::OK, ByteRange::full(size)),
    };

    let (start, len) = range.map(|r| (r.start, r.len())).unwrap_or((0, 0));
    let owned = path.to_path_buf();
    let reader = tokio::task::spawn_blocking(move || ChunkReader::open(&owned, start, len, chunk_size))
        .await
        .map_err(|err| StreamError::Io(io::Error::new(io::ErrorKind::Other, err)))??;

    let mut response = Response::new(reader_body(reader, path));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime).unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    if status == StatusCode::PARTIAL_CONTENT {
        if let Some(range) = range {
            if let Ok(value) = HeaderValue::from_str(&range.content_range(size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
    }
    Ok(response)
}

fn unsatisfiable_response(size: u64) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}

fn reader_body<R>(reader: ChunkReader<R>, path: &Path) -> Body
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_CAPACITY);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        for chunk in reader {
            let failed = chunk.is_err();
            if let Err(err) = &chunk {
                warn!("Read failed while streaming {:?}: {}", path, err);
            }
            if tx.blocking_send(chunk).is_err() {
                debug!("Client stopped reading {:?}", path);
                return;
            }
            if failed {
                return;
            }
        }
    });
    Body::from_stream(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write(dir: &Path, name: &str, len: usize) -> std::path::PathBuf {
        let path = dir.join(name);
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn chunk_reader_splits_and_stops_at_length() {
        let reader = ChunkReader::new(Cursor::new(vec![7u8; 20]), 10, 4);
        let sizes: Vec<usize> = reader.map(|chunk| chunk.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn chunk_reader_stops_early_on_eof() {
        let reader = ChunkReader::new(Cursor::new(vec![1u8; 5]), 100, 4);
        let total: usize = reader.map(|chunk| chunk.unwrap().len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn chunk_reader_seeks_to_start() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "a.mp3", 100);
        let chunks: Vec<Bytes> = ChunkReader::open(&path, 90, 10, 8)
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect();
        let data: Vec<u8> = chunks.concat();
        assert_eq!(data, (90..100).map(|i| i as u8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn full_file_without_range() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "song.mp3", 20_000);

        let response = stream_file(&path, None, DEFAULT_CHUNK_SIZE, DEFAULT_AUDIO_MIME)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("20000"));
        assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
        assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("audio/mpeg"));
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(body_bytes(response).await, std::fs::read(&path).unwrap());
    }

    #[tokio::test]
    async fn partial_content_for_range() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "song.flac", 1000);

        let response = stream_file(&path, Some("bytes=0-99"), 16, DEFAULT_AUDIO_MIME)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header_str(&response, header::CONTENT_RANGE), Some("bytes 0-99/1000"));
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
        assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
        assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("audio/flac"));
        let body = body_bytes(response).await;
        assert_eq!(body, std::fs::read(&path).unwrap()[..100].to_vec());
    }

    #[tokio::test]
    async fn open_ended_range_runs_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "song.mp3", 100);

        let response = stream_file(&path, Some("bytes=10-"), 8, DEFAULT_AUDIO_MIME)
            .await
            .unwrap();
        assert_eq!(header_str(&response, header::CONTENT_RANGE), Some("bytes 10-99/100"));
        assert_eq!(body_bytes(response).await.len(), 90);
    }

    #[tokio::test]
    async fn start_past_end_is_unsatisfiable() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "song.mp3", 100);

        let response = stream_file(&path, Some("bytes=100-"), 8, DEFAULT_AUDIO_MIME)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header_str(&response, header::CONTENT_RANGE), Some("bytes */100"));
    }

    #[tokio::test]
    async fn unknown_extension_uses_fallback_mime() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "cover", 10);

        let response = stream_file(&path, None, 8, "image/jpeg").await.unwrap();
        assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn empty_file_streams_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let path = write(temp.path(), "empty.mp3", 0);

        let response = stream_file(&path, None, 8, DEFAULT_AUDIO_MIME).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("0"));
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let err = stream_file(&temp.path().join("gone.mp3"), None, 8, DEFAULT_AUDIO_MIME)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::NotFound));
    }
}
