use crate::state::ServerContext;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// GET /api/cover/{manga_id} - cached cover image, or a 302 to the
/// placeholder when the manga has no remote cover.
pub async fn cover_handler(
    State(ctx): State<ServerContext>,
    Path(manga_id): Path<String>,
) -> Result<Response, ApiError> {
    debug!("Cover request for manga {}", manga_id);

    let cover = ctx.covers.fetch(ctx.library.as_ref(), &manga_id).await?;
    Ok(cover.into_response())
}
