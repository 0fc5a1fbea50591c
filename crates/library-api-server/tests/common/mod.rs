#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use library_api_server::{
    cache::{ByteStream, CoverFetcher, FetchError},
    config::Settings,
    library::{Chapter, LibraryLock, Manga, MemoryLibrary},
    state::ServerContext,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

pub const COVER_URL: &str = "https://covers.example.com/1.png";

/// PNG signature followed by filler, large enough to span many chunks.
pub fn png_body() -> Vec<u8> {
    let mut body = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    body.extend((0..20_000u32).map(|i| (i % 251) as u8));
    body
}

/// Fake network: serves `body` in small chunks and counts fetches.
pub struct CountingFetcher {
    body: Vec<u8>,
    fail: bool,
    chunk_delay: Option<Duration>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            fail: false,
            chunk_delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn slow(body: Vec<u8>, chunk_delay: Duration) -> Self {
        Self {
            chunk_delay: Some(chunk_delay),
            ..Self::new(body)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoverFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<ByteStream, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Other("host unreachable".to_string()));
        }

        let chunks: Vec<Bytes> = self.body.chunks(1024).map(Bytes::copy_from_slice).collect();
        let delay = self.chunk_delay;
        Ok(futures::stream::iter(chunks)
            .then(move |chunk| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(chunk)
            })
            .boxed())
    }
}

pub fn settings(root: &Path, auth_enabled: bool) -> Settings {
    let mut settings = Settings::defaults().expect("default settings");
    settings.auth.enabled = auth_enabled;
    settings.cache.root = root.join("covers");
    settings.server.static_dir = root.join("static");
    settings
}

pub fn library(lock: LibraryLock) -> MemoryLibrary {
    let library = MemoryLibrary::new(lock);
    library.insert(Manga {
        id: 1,
        title: "With cover".to_string(),
        thumbnail_url: Some(COVER_URL.to_string()),
    });
    library.insert(Manga {
        id: 2,
        title: "Without cover".to_string(),
        thumbnail_url: None,
    });
    library.insert_chapter(Chapter {
        id: 10,
        manga_id: 1,
        name: "Chapter 1".to_string(),
    });
    library
}

pub fn context(
    settings: Settings,
    library: MemoryLibrary,
    fetcher: Arc<CountingFetcher>,
) -> ServerContext {
    ServerContext::new(settings, Arc::new(library), fetcher)
}

pub fn get(uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, format!("session={}", session));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Value of the `session` cookie set by the response, if any.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("session="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}
