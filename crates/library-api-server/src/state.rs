use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CoverCache, CoverFetcher, HttpFetcher};
use crate::config::Settings;
use crate::download::{ChapterDownloads, MemoryDownloads};
use crate::library::{Library, LibraryLock, MemoryLibrary};
use crate::session::SessionStore;

/// Server context shared across handlers. Built once at startup and
/// handed to the router as state.
#[derive(Clone)]
pub struct ServerContext {
    pub settings: Arc<Settings>,
    pub sessions: SessionStore,
    pub library: Arc<dyn Library>,
    pub covers: Arc<CoverCache>,
    pub downloads: Arc<dyn ChapterDownloads>,
}

impl ServerContext {
    pub fn new(
        settings: Settings,
        library: Arc<dyn Library>,
        fetcher: Arc<dyn CoverFetcher>,
    ) -> Self {
        let sessions = SessionStore::new(settings.auth.enabled);
        let covers = Arc::new(CoverCache::new(
            settings.cache.root.clone(),
            settings.cache.placeholder_path.clone(),
            fetcher,
        ));

        Self {
            settings: Arc::new(settings),
            sessions,
            library,
            covers,
            downloads: Arc::new(MemoryDownloads::new()),
        }
    }

    /// Replace the download backend.
    pub fn with_downloads(mut self, downloads: Arc<dyn ChapterDownloads>) -> Self {
        self.downloads = downloads;
        self
    }

    /// Build the default collaborators: in-memory library (seeded if
    /// configured) and the HTTP cover fetcher.
    pub fn bootstrap(settings: Settings) -> Result<Self> {
        let lock = if settings.library.master_lock {
            LibraryLock::exclusive()
        } else {
            LibraryLock::Unlocked
        };

        let library = match &settings.library.seed_path {
            Some(path) => MemoryLibrary::from_seed(path, lock)?,
            None => {
                info!("No library seed configured, starting with an empty library");
                MemoryLibrary::new(lock)
            }
        };

        let fetcher = HttpFetcher::new(&settings.cache)?;

        Ok(Self::new(settings, Arc::new(library), Arc::new(fetcher)))
    }

    /// Teardown hook run after the server stops accepting requests.
    pub fn shutdown(&self) {
        let dropped = self.sessions.clear();
        if let Some(stats) = self.library.master_lock().stats() {
            info!(
                "Library lock acquired {} times, released {} times",
                stats.acquired, stats.released
            );
        }
        info!("Server context shut down ({} sessions dropped)", dropped);
    }
}
