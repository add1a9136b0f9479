//! Bot API endpoints.

use axum::extract::{Multipart, Path, Query, State};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{error, success, uncancellable, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    parse_status, Bot, BotForm, BotPatchForm, BrowseFilter, CatalogEntry, DeploymentHost,
};
use crate::storage::AssetUpload;
use crate::AppState;

/// Query parameters of the listing endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseQuery {
    pub status: Option<String>,
    pub host: Option<String>,
    pub posted_by: Option<String>,
    pub q: Option<String>,
}

impl BrowseQuery {
    fn into_filter(self) -> Result<BrowseFilter, AppError> {
        let status = self.status.as_deref().map(parse_status).transpose()?;
        let host = match self.host.as_deref() {
            Some(raw) => Some(DeploymentHost::parse(raw).ok_or_else(|| {
                AppError::Validation(format!("Unknown deployment host '{}'", raw))
            })?),
            None => None,
        };
        Ok(BrowseFilter {
            status,
            host,
            posted_by: self.posted_by.filter(|s| !s.trim().is_empty()),
            query: self.q,
        })
    }
}

/// A multipart submission: the `bot` JSON part plus optional files.
struct Submission<F> {
    form: F,
    image: Option<AssetUpload>,
    archive: Option<AssetUpload>,
}

async fn read_submission<F: DeserializeOwned>(
    mut multipart: Multipart,
) -> Result<Submission<F>, AppError> {
    let mut form = None;
    let mut image = None;
    let mut archive = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "bot" => {
                let text = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read bot details: {}", e))
                })?;
                form = Some(serde_json::from_str::<F>(&text)?);
            }
            "image" | "archive" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read {} upload: {}", field_name, e))
                })?;

                // Browsers send an empty part for an untouched file input
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }

                let upload = AssetUpload {
                    bytes: bytes.to_vec(),
                    content_type,
                    file_name: if file_name.is_empty() {
                        field_name.clone()
                    } else {
                        file_name
                    },
                };
                if field_name == "image" {
                    image = Some(upload);
                } else {
                    archive = Some(upload);
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let form = form.ok_or_else(|| AppError::BadRequest("Missing 'bot' part".to_string()))?;
    Ok(Submission {
        form,
        image,
        archive,
    })
}

/// GET /api/bots - List bots, optionally filtered or searched.
pub async fn list_bots(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Vec<CatalogEntry>> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let filter = match query.into_filter() {
        Ok(filter) => filter,
        Err(e) => return error(e, revision_id),
    };

    match state.catalog.browse(&filter).await {
        Ok(entries) => success(entries, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/bots/:id - Get a single bot with its profile and aggregates.
pub async fn get_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CatalogEntry> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    match state.catalog.entry(&id).await {
        Ok(entry) => success(entry, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/bots/by-name/:name - Look a bot up by its display name.
pub async fn get_bot_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CatalogEntry> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    match state.catalog.entry_by_name(&name).await {
        Ok(entry) => success(entry, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/bots - Publish a new bot.
pub async fn publish_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<Bot> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let submission = match read_submission::<BotForm>(multipart).await {
        Ok(submission) => submission,
        Err(e) => return error(e, revision_id),
    };

    let catalog = state.catalog.clone();
    let result = uncancellable(async move {
        catalog
            .publish_bot(&user, submission.form, submission.image, submission.archive)
            .await
    })
    .await;

    match result {
        Ok(bot) => {
            let new_revision = state
                .catalog
                .current_revision()
                .await
                .unwrap_or(revision_id);
            success(bot, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/bots/:id - Update an owned bot.
pub async fn edit_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Bot> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let submission = match read_submission::<BotPatchForm>(multipart).await {
        Ok(submission) => submission,
        Err(e) => return error(e, revision_id),
    };

    let catalog = state.catalog.clone();
    let result = uncancellable(async move {
        catalog
            .edit_bot(
                &user,
                &id,
                submission.form,
                submission.image,
                submission.archive,
            )
            .await
    })
    .await;

    match result {
        Ok(bot) => {
            let new_revision = state
                .catalog
                .current_revision()
                .await
                .unwrap_or(revision_id);
            success(bot, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/bots/:id - Delete an owned bot.
pub async fn delete_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let catalog = state.catalog.clone();
    match uncancellable(async move { catalog.delete_bot(&user, &id).await }).await {
        Ok(()) => {
            let new_revision = state
                .catalog
                .current_revision()
                .await
                .unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
