//! Read models served to listing and detail pages.

use serde::{Deserialize, Serialize};

use super::{Aggregates, Bot, BotStatus, DeploymentHost, DeveloperProfile};

/// One bot joined with its profile and interaction aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub bot: Bot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer: Option<DeveloperProfile>,
    pub aggregates: Aggregates,
    /// Search relevance, present only for free-text queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Optional narrowing of a browse request.
#[derive(Debug, Clone, Default)]
pub struct BrowseFilter {
    pub status: Option<BotStatus>,
    pub host: Option<DeploymentHost>,
    pub posted_by: Option<String>,
    pub query: Option<String>,
}

impl BrowseFilter {
    /// Structured part of the filter; the free-text part is handled by search.
    pub fn matches(&self, bot: &Bot) -> bool {
        self.status.map_or(true, |s| bot.status == s)
            && self
                .host
                .map_or(true, |h| bot.deployment_hosts.contains(&h))
            && self
                .posted_by
                .as_deref()
                .map_or(true, |owner| bot.posted_by == owner)
    }
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
