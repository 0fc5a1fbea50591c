//! Library model consumed by the gateway: entity lookup plus the master lock.

pub mod lock;

pub use lock::{LibraryLock, LockStats, MasterLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manga {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub manga_id: i64,
    pub name: String,
}

impl Manga {
    /// Remote cover URL, treating an empty string as absent.
    pub fn cover_url(&self) -> Option<&str> {
        self.thumbnail_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Library: Send + Sync {
    fn manga(&self, id: i64) -> Option<Manga>;

    fn chapter(&self, id: i64) -> Option<Chapter>;

    fn master_lock(&self) -> LibraryLock;
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to read library seed {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid library seed {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Lenient id parsing: surrounding whitespace is ignored.
pub fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Seed file layout: `{"manga": [...], "chapters": [...]}`.
#[derive(Debug, Deserialize)]
struct LibrarySeed {
    #[serde(default)]
    manga: Vec<Manga>,
    #[serde(default)]
    chapters: Vec<Chapter>,
}

/// In-memory catalog. Mutation goes through `insert`/`remove`; callers that
/// need ordering with request handlers run inside `master_lock()`.
pub struct MemoryLibrary {
    manga: DashMap<i64, Manga>,
    chapters: DashMap<i64, Chapter>,
    lock: LibraryLock,
}

impl MemoryLibrary {
    pub fn new(lock: LibraryLock) -> Self {
        Self {
            manga: DashMap::new(),
            chapters: DashMap::new(),
            lock,
        }
    }

    /// Load manga and chapters from a JSON seed file.
    pub fn from_seed(path: &Path, lock: LibraryLock) -> Result<Self, LibraryError> {
        let seed_path = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: seed_path.clone(),
            source,
        })?;
        let seed: LibrarySeed =
            serde_json::from_str(&raw).map_err(|source| LibraryError::Parse {
                path: seed_path.clone(),
                source,
            })?;

        let library = Self::new(lock);
        for manga in seed.manga {
            library.insert(manga);
        }
        for chapter in seed.chapters {
            library.insert_chapter(chapter);
        }
        info!(
            "Loaded {} manga and {} chapters from {}",
            library.len(),
            library.chapters.len(),
            path.display()
        );
        Ok(library)
    }

    pub fn insert(&self, manga: Manga) -> Option<Manga> {
        self.manga.insert(manga.id, manga)
    }

    pub fn insert_chapter(&self, chapter: Chapter) -> Option<Chapter> {
        self.chapters.insert(chapter.id, chapter)
    }

    pub fn remove(&self, id: i64) -> Option<Manga> {
        self.manga.remove(&id).map(|(_, manga)| manga)
    }

    pub fn len(&self) -> usize {
        self.manga.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manga.is_empty()
    }
}

impl Library for MemoryLibrary {
    fn manga(&self, id: i64) -> Option<Manga> {
        self.manga.get(&id).map(|entry| entry.value().clone())
    }

    fn chapter(&self, id: i64) -> Option<Chapter> {
        self.chapters.get(&id).map(|entry| entry.value().clone())
    }

    fn master_lock(&self) -> LibraryLock {
        self.lock.clone()
    }
}
