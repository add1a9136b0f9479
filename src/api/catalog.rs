//! Catalog-wide endpoints: revision polling and live events.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};

use super::{success, ApiResult};
use crate::errors::AppErrorWithRevision;
use crate::models::RevisionInfo;
use crate::service::BotEvent;
use crate::AppState;

/// GET /api/catalog/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info = state
        .catalog
        .revision_info()
        .await
        .map_err(|e| AppErrorWithRevision {
            error: e,
            revision_id: 0,
        })?;

    success(revision_info.clone(), revision_info.revision_id)
}

/// GET /api/bots/:id/events - Server-sent events for one bot.
pub async fn bot_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppErrorWithRevision> {
    let revision_id = state.catalog.current_revision().await.unwrap_or(0);

    let subscription = state
        .catalog
        .subscribe(&id)
        .await
        .map_err(|e| AppErrorWithRevision {
            error: e,
            revision_id,
        })?;
    tracing::debug!(bot_id = %id, "Event stream opened");

    // The stream ends after the bot's deletion has been delivered
    let events = stream::unfold(Some(subscription), |subscription| async move {
        let mut subscription = subscription?;
        let event = subscription.next().await?;
        let sse = Event::default()
            .event(event.kind())
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        let next = match event {
            BotEvent::Deleted { .. } => None,
            _ => Some(subscription),
        };
        Some((Ok::<Event, Infallible>(sse), next))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
