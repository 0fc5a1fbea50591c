use crate::download::request_chapter;
use crate::state::ServerContext;
use crate::utils::{error::ApiError, response::Envelope};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub delete: Option<String>,
}

impl DownloadParams {
    /// Only a case-insensitive `true` requests deletion.
    fn delete(&self) -> bool {
        self.delete
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}

/// GET /api/download/{manga_id}/{chapter_id}[?delete=true] - queue a
/// chapter download, or delete a downloaded chapter.
pub async fn download_chapter(
    State(ctx): State<ServerContext>,
    Path((manga_id, chapter_id)): Path<(String, String)>,
    Query(params): Query<DownloadParams>,
) -> Result<Json<Envelope>, ApiError> {
    let delete = params.delete();
    debug!(
        "Download request for chapter {} of manga {} (delete: {})",
        chapter_id, manga_id, delete
    );

    request_chapter(
        ctx.library.as_ref(),
        ctx.downloads.as_ref(),
        &manga_id,
        &chapter_id,
        delete,
    )?;
    Ok(Json(Envelope::ok()))
}
