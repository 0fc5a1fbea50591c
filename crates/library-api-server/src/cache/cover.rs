//! Read-through disk cache for remote cover images.
//!
//! A request resolves the manga, then either redirects to the placeholder
//! (no remote cover), serves the cached file, or downloads the cover into
//! the cache first. Downloads land in a temporary sibling file that is
//! renamed into place only once complete, so a reader never observes a
//! partial file at the final path. Concurrent misses for the same URL are
//! not deduplicated: each writer renames its own complete copy and the last
//! rename wins.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use rand::RngCore;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use super::fetcher::{CoverFetcher, FetchError};
use super::key::cache_path;
use crate::library::{parse_id, Library};
use crate::utils::error::ApiError;

/// Read/write buffer size for streaming covers.
const BUFFER_SIZE: usize = 4 * 1024;

/// Leading bytes inspected when sniffing the content type.
const SNIFF_SIZE: usize = 8 * 1024;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum CoverError {
    #[error("invalid manga id {0:?}")]
    InvalidId(String),

    #[error("manga {0} does not exist")]
    NotFound(i64),

    #[error("cache directory unavailable: {0}")]
    Storage(#[source] std::io::Error),

    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("cached cover {path} unreadable: {source}")]
    SendFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<CoverError> for ApiError {
    fn from(err: CoverError) -> Self {
        match err {
            CoverError::InvalidId(_) => {
                ApiError::Validation("MangaID must be specified!".to_string())
            }
            CoverError::NotFound(_) => {
                ApiError::NotFound("The specified manga does not exist!".to_string())
            }
            CoverError::Storage(e) => {
                ApiError::Internal(format!("Failed to prepare cover cache: {}", e))
            }
            CoverError::DownloadFailed { .. } => {
                ApiError::DownloadFailed("Failed to download cover image!".to_string())
            }
            CoverError::SendFailed { .. } => {
                ApiError::SendFailed("Error sending cached cover!".to_string())
            }
        }
    }
}

/// Outcome of a cover lookup.
#[derive(Debug)]
pub enum CoverResponse {
    /// The manga has no remote cover; redirect here with 302.
    Placeholder(String),
    Image(CachedCover),
}

impl IntoResponse for CoverResponse {
    fn into_response(self) -> Response {
        match self {
            CoverResponse::Placeholder(location) => {
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
            CoverResponse::Image(cover) => cover.into_response(),
        }
    }
}

/// An opened cache file positioned at its start, with its sniffed type.
#[derive(Debug)]
pub struct CachedCover {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub len: u64,
    file: File,
}

impl IntoResponse for CachedCover {
    fn into_response(self) -> Response {
        let path = self.path;
        let stream = ReaderStream::with_capacity(self.file, BUFFER_SIZE).inspect_err(move |e| {
            error!("Error streaming cached cover {}: {}", path.display(), e);
        });

        let mut response = Body::from_stream(stream).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.len));
        response
    }
}

pub struct CoverCache {
    root: PathBuf,
    placeholder: String,
    fetcher: Arc<dyn CoverFetcher>,
}

impl CoverCache {
    pub fn new(root: PathBuf, placeholder: String, fetcher: Arc<dyn CoverFetcher>) -> Self {
        info!("Cover cache rooted at {}", root.display());
        Self {
            root,
            placeholder,
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache file location for a remote URL.
    pub fn path_for(&self, url: &str) -> PathBuf {
        cache_path(&self.root, url)
    }

    /// Resolve the cover of `raw_id`, filling the cache on a miss.
    pub async fn fetch(
        &self,
        library: &dyn Library,
        raw_id: &str,
    ) -> Result<CoverResponse, CoverError> {
        let manga_id = parse_id(raw_id).ok_or_else(|| CoverError::InvalidId(raw_id.to_string()))?;
        let manga = library.manga(manga_id).ok_or(CoverError::NotFound(manga_id))?;

        let Some(url) = manga.cover_url() else {
            debug!("Manga {} has no cover, redirecting to placeholder", manga_id);
            return Ok(CoverResponse::Placeholder(self.placeholder.clone()));
        };

        let path = self.path_for(url);
        if let Some(parent) = path.parent() {
            // create_dir_all succeeds if another request created it first
            fs::create_dir_all(parent).await.map_err(CoverError::Storage)?;
        }

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Cover cache hit for manga {}", manga_id);
        } else {
            debug!("Cover cache miss for manga {}", manga_id);
            self.download(url, &path).await?;
        }

        open_cached(&path).await.map(CoverResponse::Image)
    }

    /// Download `url` into `path` through a temporary sibling file.
    async fn download(&self, url: &str, path: &Path) -> Result<u64, CoverError> {
        let part = part_path(path);

        let result = match self.write_part(url, &part).await {
            Ok(written) => fs::rename(&part, path)
                .await
                .map(|_| written)
                .map_err(|e| e.to_string()),
            Err(reason) => Err(reason),
        };

        match result {
            Ok(written) => {
                info!("Cached cover {} ({} bytes)", url, written);
                Ok(written)
            }
            Err(reason) => {
                if let Err(e) = fs::remove_file(&part).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial cover {}: {}", part.display(), e);
                    }
                }
                warn!("Failed to download cover {}: {}", url, reason);
                Err(CoverError::DownloadFailed {
                    url: url.to_string(),
                    reason,
                })
            }
        }
    }

    /// Stream the remote body into `part`. Both the network stream and the
    /// file handle are dropped when this returns, on every path.
    async fn write_part(&self, url: &str, part: &Path) -> Result<u64, String> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(part)
            .await
            .map_err(|e| format!("cannot create {}: {}", part.display(), e))?;

        let mut body = self.fetcher.fetch(url).await.map_err(|e| e.to_string())?;

        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(|e: FetchError| e.to_string())? {
            file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            written += chunk.len() as u64;
        }

        if written == 0 {
            return Err("remote returned an empty body".to_string());
        }

        file.flush().await.map_err(|e| e.to_string())?;
        file.sync_all().await.map_err(|e| e.to_string())?;
        Ok(written)
    }
}

/// Unique temporary name next to `path`, e.g. `.<key>.<nonce>.part`.
fn part_path(path: &Path) -> PathBuf {
    let mut nonce = [0u8; 8];
    rand::rng().fill_bytes(&mut nonce);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, hex::encode(nonce)))
}

/// Open a cached cover and sniff its content type from the leading bytes.
async fn open_cached(path: &Path) -> Result<CachedCover, CoverError> {
    let send_failed = |source| CoverError::SendFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(send_failed)?;
    let len = file.metadata().await.map_err(send_failed)?.len();

    let mut head = vec![0u8; SNIFF_SIZE.min(len as usize)];
    file.read_exact(&mut head).await.map_err(send_failed)?;
    file.seek(SeekFrom::Start(0)).await.map_err(send_failed)?;

    let content_type = infer::get(&head)
        .map(|kind| kind.mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE);

    Ok(CachedCover {
        path: path.to_path_buf(),
        content_type,
        len,
        file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetcher::ByteStream;
    use crate::library::{LibraryLock, Manga, MockLibrary};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// Serves a fixed body (or a mid-stream failure) and counts calls.
    struct StaticFetcher {
        chunks: Vec<Bytes>,
        fail_after_first_chunk: bool,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(body: &[u8]) -> Self {
            Self {
                chunks: body.chunks(3).map(Bytes::copy_from_slice).collect(),
                fail_after_first_chunk: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_midway(body: &[u8]) -> Self {
            Self {
                fail_after_first_chunk: true,
                ..Self::new(body)
            }
        }
    }

    #[async_trait]
    impl CoverFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<ByteStream, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut items: Vec<Result<Bytes, FetchError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            if self.fail_after_first_chunk {
                items.truncate(1);
                items.push(Err(FetchError::Other("connection reset".to_string())));
            }
            Ok(futures::stream::iter(items).boxed())
        }
    }

    const PLACEHOLDER: &str = "/img/no-cover.png";

    fn cache_in(root: &Path, fetcher: StaticFetcher) -> CoverCache {
        CoverCache::new(root.into(), PLACEHOLDER.into(), Arc::new(fetcher))
    }

    fn png_body() -> Vec<u8> {
        let mut body = PNG_HEADER.to_vec();
        body.extend((0..100u8).collect::<Vec<_>>());
        body
    }

    fn library_with(manga: Option<Manga>) -> MockLibrary {
        let mut library = MockLibrary::new();
        library.expect_manga().returning(move |_| manga.clone());
        library.expect_master_lock().returning(|| LibraryLock::Unlocked);
        library
    }

    fn manga(url: Option<&str>) -> Manga {
        Manga {
            id: 1,
            title: "Test".to_string(),
            thumbnail_url: url.map(str::to_string),
        }
    }

    async fn read_all(cover: CachedCover) -> Vec<u8> {
        let response = cover.into_response();
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_invalid_id() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), StaticFetcher::new(b"x"));
        let library = MockLibrary::new();

        let err = cache.fetch(&library, "abc").await.unwrap_err();
        assert!(matches!(err, CoverError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_missing_manga() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), StaticFetcher::new(b"x"));

        let err = cache.fetch(&library_with(None), "9").await.unwrap_err();
        assert!(matches!(err, CoverError::NotFound(9)));
    }

    #[tokio::test]
    async fn test_placeholder_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(b"x"));
        let cache = CoverCache::new(dir.path().into(), PLACEHOLDER.into(), fetcher.clone());

        for url in [None, Some("")] {
            match cache.fetch(&library_with(Some(manga(url))), "1").await.unwrap() {
                CoverResponse::Placeholder(location) => assert_eq!(location, "/img/no-cover.png"),
                other => panic!("expected placeholder, got {:?}", other),
            }
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let body = png_body();
        let fetcher = Arc::new(StaticFetcher::new(&body));
        let cache = CoverCache::new(dir.path().into(), PLACEHOLDER.into(), fetcher.clone());
        let library = library_with(Some(manga(Some("http://covers/1.png"))));

        let CoverResponse::Image(first) = cache.fetch(&library, "1").await.unwrap() else {
            panic!("expected image");
        };
        assert_eq!(first.content_type, "image/png");
        assert_eq!(first.len, body.len() as u64);
        assert_eq!(read_all(first).await, body);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(cache.path_for("http://covers/1.png").exists());

        let CoverResponse::Image(second) = cache.fetch(&library, "1").await.unwrap() else {
            panic!("expected image");
        };
        assert_eq!(read_all(second).await, body);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_content_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), StaticFetcher::new(b"plain bytes, not an image"));
        let library = library_with(Some(manga(Some("http://covers/1.png"))));

        let CoverResponse::Image(cover) = cache.fetch(&library, "1").await.unwrap() else {
            panic!("expected image");
        };
        // The URL says .png but the bytes decide
        assert_eq!(cover.content_type, FALLBACK_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StaticFetcher::failing_midway(&png_body()));
        let cache = CoverCache::new(dir.path().into(), PLACEHOLDER.into(), fetcher.clone());
        let library = library_with(Some(manga(Some("http://covers/1.png"))));

        let err = cache.fetch(&library, "1").await.unwrap_err();
        assert!(matches!(err, CoverError::DownloadFailed { .. }));

        let path = cache.path_for("http://covers/1.png");
        assert!(!path.exists());
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);

        // A retry downloads again instead of serving a truncated hit
        let _ = cache.fetch(&library, "1").await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_body_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), StaticFetcher::new(b""));
        let library = library_with(Some(manga(Some("http://covers/empty.png"))));

        let err = cache.fetch(&library, "1").await.unwrap_err();
        assert!(matches!(err, CoverError::DownloadFailed { .. }));
        assert!(!cache.path_for("http://covers/empty.png").exists());
    }

    #[test]
    fn test_error_messages() {
        let cases = [
            (CoverError::InvalidId("x".into()), "MangaID must be specified!"),
            (CoverError::NotFound(1), "The specified manga does not exist!"),
            (
                CoverError::DownloadFailed { url: "u".into(), reason: "r".into() },
                "Failed to download cover image!",
            ),
            (
                CoverError::SendFailed {
                    path: PathBuf::from("p"),
                    source: std::io::Error::other("boom"),
                },
                "Error sending cached cover!",
            ),
        ];
        for (err, message) in cases {
            assert_eq!(ApiError::from(err).to_string(), message);
        }
    }
}
