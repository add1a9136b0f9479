//! Vote and comment API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, success, uncancellable, ApiResult};
use crate::auth::CurrentUser;
use crate::models::{Aggregates, Comment, CommentRequest, VoteDirection, VoteOutcome, VoteRequest};
use crate::AppState;

/// POST /api/bots/:id/vote - Toggle the caller's vote.
pub async fn cast_vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<VoteOutcome> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let catalog = state.catalog.clone();
    let result =
        uncancellable(async move { catalog.cast_vote(&user, &id, &request.direction).await })
            .await;

    match result {
        Ok(outcome) => {
            let new_revision = state
                .catalog
                .current_revision()
                .await
                .unwrap_or(revision_id);
            success(outcome, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/bots/:id/vote - The caller's current vote, or null.
pub async fn get_my_vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Option<VoteDirection>> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    match state.catalog.my_vote(&user, &id).await {
        Ok(vote) => success(vote, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/bots/:id/comments - Append a comment.
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Comment> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let catalog = state.catalog.clone();
    let result =
        uncancellable(async move { catalog.add_comment(&user, &id, &request.text).await }).await;

    match result {
        Ok(comment) => {
            let new_revision = state
                .catalog
                .current_revision()
                .await
                .unwrap_or(revision_id);
            success(comment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/bots/:id/interactions - Likes, dislikes and comments.
pub async fn get_interactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Aggregates> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    match state.catalog.aggregates_for(&id).await {
        Ok(aggregates) => success(aggregates, revision_id),
        Err(e) => error(e, revision_id),
    }
}
