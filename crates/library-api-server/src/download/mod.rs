//! Chapter download requests: queue a chapter for download or delete a
//! downloaded one, after validating ids and the current download state.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info};

use crate::library::{parse_id, Chapter, Library, Manga};
use crate::utils::error::ApiError;

/// Download backend consumed by the download route.
#[cfg_attr(test, mockall::automock)]
pub trait ChapterDownloads: Send + Sync {
    /// The chapter is queued or in progress.
    fn is_downloading(&self, chapter: &Chapter) -> bool;

    fn is_downloaded(&self, manga: &Manga, chapter: &Chapter) -> bool;

    /// Queue the chapter and make sure downloads are running.
    fn enqueue(&self, manga: &Manga, chapter: &Chapter);

    /// Remove a downloaded chapter. Running downloads are paused around the
    /// deletion and resumed afterwards.
    fn delete(&self, manga: &Manga, chapter: &Chapter) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterState {
    Queued,
    Downloaded,
}

/// In-memory download bookkeeping. A worker (or a test) reports finished
/// chapters with `mark_downloaded`.
#[derive(Default)]
pub struct MemoryDownloads {
    chapters: DashMap<i64, ChapterState>,
    running: AtomicBool,
}

impl MemoryDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, chapter_id: i64) -> Option<ChapterState> {
        self.chapters.get(&chapter_id).map(|entry| *entry.value())
    }

    pub fn mark_downloaded(&self, chapter_id: i64) {
        self.chapters.insert(chapter_id, ChapterState::Downloaded);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl ChapterDownloads for MemoryDownloads {
    fn is_downloading(&self, chapter: &Chapter) -> bool {
        self.state(chapter.id) == Some(ChapterState::Queued)
    }

    fn is_downloaded(&self, _manga: &Manga, chapter: &Chapter) -> bool {
        self.state(chapter.id) == Some(ChapterState::Downloaded)
    }

    fn enqueue(&self, manga: &Manga, chapter: &Chapter) {
        self.chapters.insert(chapter.id, ChapterState::Queued);
        self.running.store(true, Ordering::SeqCst);
        debug!("Queued chapter {} of manga {}", chapter.id, manga.id);
    }

    fn delete(&self, manga: &Manga, chapter: &Chapter) -> std::io::Result<()> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.chapters.remove(&chapter.id);
        if was_running {
            self.running.store(true, Ordering::SeqCst);
        }
        debug!("Deleted chapter {} of manga {}", chapter.id, manga.id);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid manga id {0:?}")]
    InvalidMangaId(String),

    #[error("invalid chapter id {0:?}")]
    InvalidChapterId(String),

    #[error("manga {0} does not exist")]
    MangaNotFound(i64),

    #[error("chapter {0} does not exist")]
    ChapterNotFound(i64),

    #[error("chapter {chapter_id} is queued or downloading")]
    InProgress { chapter_id: i64, delete: bool },

    #[error("chapter {0} is already downloaded")]
    AlreadyDownloaded(i64),

    #[error("chapter {0} is not downloaded")]
    NotDownloaded(i64),

    #[error("failed to delete chapter {chapter_id}: {source}")]
    Storage {
        chapter_id: i64,
        #[source]
        source: std::io::Error,
    },
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        let validation = |message: &str| ApiError::Validation(message.to_string());
        let not_found = |message: &str| ApiError::NotFound(message.to_string());

        match err {
            DownloadError::InvalidMangaId(_) => validation("MangaID must be specified!"),
            DownloadError::InvalidChapterId(_) => validation("ChapterID must be specified!"),
            DownloadError::MangaNotFound(_) => not_found("The specified manga does not exist!"),
            DownloadError::ChapterNotFound(_) => {
                not_found("The specified chapter does not exist!")
            }
            DownloadError::InProgress { delete: true, .. } => {
                validation("This chapter is currently being downloaded!")
            }
            DownloadError::InProgress { delete: false, .. } => {
                validation("This chapter is already being downloaded!")
            }
            DownloadError::AlreadyDownloaded(_) => {
                validation("This chapter is already downloaded!")
            }
            DownloadError::NotDownloaded(_) => validation("This chapter is not downloaded!"),
            DownloadError::Storage { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

/// Queue (or with `delete`, remove) the download of a chapter.
pub fn request_chapter(
    library: &dyn Library,
    downloads: &dyn ChapterDownloads,
    raw_manga_id: &str,
    raw_chapter_id: &str,
    delete: bool,
) -> Result<(), DownloadError> {
    let manga_id = parse_id(raw_manga_id)
        .ok_or_else(|| DownloadError::InvalidMangaId(raw_manga_id.to_string()))?;
    let chapter_id = parse_id(raw_chapter_id)
        .ok_or_else(|| DownloadError::InvalidChapterId(raw_chapter_id.to_string()))?;

    let manga = library.manga(manga_id).ok_or(DownloadError::MangaNotFound(manga_id))?;
    let chapter = library
        .chapter(chapter_id)
        .filter(|chapter| chapter.manga_id == manga.id)
        .ok_or(DownloadError::ChapterNotFound(chapter_id))?;

    if downloads.is_downloading(&chapter) {
        return Err(DownloadError::InProgress { chapter_id, delete });
    }

    let downloaded = downloads.is_downloaded(&manga, &chapter);
    match (delete, downloaded) {
        (false, true) => Err(DownloadError::AlreadyDownloaded(chapter_id)),
        (true, false) => Err(DownloadError::NotDownloaded(chapter_id)),
        (true, true) => {
            downloads
                .delete(&manga, &chapter)
                .map_err(|source| DownloadError::Storage { chapter_id, source })?;
            info!("Deleted download of chapter {} ({})", chapter_id, chapter.name);
            Ok(())
        }
        (false, false) => {
            downloads.enqueue(&manga, &chapter);
            info!("Queued download of chapter {} ({})", chapter_id, chapter.name);
            Ok(())
        }
    }
}
