//! Catalog service.
//!
//! The only entry point used by the HTTP layer. It strings together asset
//! uploads, row writes, developer profiles, the search index and the change
//! feed for each user-facing operation.

mod observer;

pub use observer::{BotEvent, BotSubscription, ChangeFeed};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{CatalogRepository, InteractionLedger};
use crate::errors::AppError;
use crate::models::{
    Aggregates, Bot, BotForm, BotPatchForm, BrowseFilter, CatalogEntry, Comment,
    DeveloperFields, DeveloperProfile, RevisionInfo, VoteDirection, VoteOutcome,
};
use crate::search::SearchIndex;
use crate::storage::{AssetCategory, AssetUpload, StorageGateway};

#[derive(Clone)]
pub struct CatalogService {
    repo: CatalogRepository,
    ledger: InteractionLedger,
    gateway: Arc<StorageGateway>,
    search: Arc<SearchIndex>,
    feed: ChangeFeed,
}

impl CatalogService {
    pub fn new(gateway: Arc<StorageGateway>, search: Arc<SearchIndex>) -> Self {
        Self {
            repo: CatalogRepository::new(gateway.clone()),
            ledger: InteractionLedger::new(gateway.clone()),
            gateway,
            search,
            feed: ChangeFeed::new(),
        }
    }

    // ==================== MUTATIONS ====================

    /// Publish a new bot owned by `owner`.
    ///
    /// Assets are uploaded before the row is written. If the row write fails
    /// the uploaded assets stay behind and are logged as orphans. Once the row
    /// exists the call succeeds; a failed profile write is only logged.
    pub async fn publish_bot(
        &self,
        owner: &str,
        form: BotForm,
        image: Option<AssetUpload>,
        archive: Option<AssetUpload>,
    ) -> Result<Bot, AppError> {
        let mut new_bot = form.validate()?;
        check_uploads(image.as_ref(), archive.as_ref())?;

        let mut uploaded = Vec::new();
        if let Some(upload) = &image {
            let url = self.upload(AssetCategory::Image, upload, &uploaded).await?;
            new_bot.image_url = Some(url.clone());
            uploaded.push(url);
        }
        if let Some(upload) = &archive {
            let url = self.upload(AssetCategory::Archive, upload, &uploaded).await?;
            new_bot.archive_url = Some(url.clone());
            uploaded.push(url);
        }

        let bot = match self.repo.publish(owner, &new_bot).await {
            Ok(bot) => bot,
            Err(e) => {
                warn_orphans(&uploaded, &e);
                return Err(e);
            }
        };

        let profile = self.save_developer(&bot, form.developer.as_ref()).await;
        self.index(&bot, profile.as_ref()).await;
        self.feed.emit(BotEvent::Updated { bot: bot.clone() });

        Ok(bot)
    }

    /// Apply an owner's partial update, optionally replacing assets.
    ///
    /// Replaced assets are released against the row the update actually
    /// merged with, so concurrent edits never leak an intermediate upload.
    pub async fn edit_bot(
        &self,
        owner: &str,
        bot_id: &str,
        form: BotPatchForm,
        image: Option<AssetUpload>,
        archive: Option<AssetUpload>,
    ) -> Result<Bot, AppError> {
        // Nothing is uploaded on behalf of a non-owner
        self.repo.owned(bot_id, owner).await?;
        let mut patch = form.validate()?;
        check_uploads(image.as_ref(), archive.as_ref())?;

        let mut uploaded = Vec::new();
        if let Some(upload) = &image {
            let url = self.upload(AssetCategory::Image, upload, &uploaded).await?;
            patch.image_url = Some(Some(url.clone()));
            uploaded.push(url);
        }
        if let Some(upload) = &archive {
            let url = self.upload(AssetCategory::Archive, upload, &uploaded).await?;
            patch.archive_url = Some(Some(url.clone()));
            uploaded.push(url);
        }

        let update = match self.repo.update(bot_id, owner, &patch).await {
            Ok(update) => update,
            Err(e) => {
                warn_orphans(&uploaded, &e);
                return Err(e);
            }
        };
        let bot = update.bot;

        for (old, new) in [
            (&update.previous.image_url, &bot.image_url),
            (&update.previous.archive_url, &bot.archive_url),
        ] {
            if let Some(old) = old {
                if new.as_ref() != Some(old) {
                    self.gateway.release_asset(old).await;
                }
            }
        }

        let profile = match self.save_developer(&bot, form.developer.as_ref()).await {
            Some(profile) => Some(profile),
            None => self
                .repo
                .developer_profile(&bot.bot_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(bot_id = %bot.bot_id, "Failed to load developer profile: {}", e);
                    None
                }),
        };
        self.index(&bot, profile.as_ref()).await;
        self.feed.emit(BotEvent::Updated { bot: bot.clone() });

        Ok(bot)
    }

    /// Delete an owned bot and release its assets.
    pub async fn delete_bot(&self, owner: &str, bot_id: &str) -> Result<(), AppError> {
        let bot = self.repo.remove(bot_id, owner).await?;

        if let Err(e) = self.search.remove_bot(&bot.bot_id).await {
            tracing::warn!(bot_id, "Failed to remove bot from index: {}", e);
        }
        self.feed.emit(BotEvent::Deleted { bot_id: bot.bot_id });

        Ok(())
    }

    /// Toggle the caller's vote. `direction` must be `like` or `dislike`.
    pub async fn cast_vote(
        &self,
        user_id: &str,
        bot_id: &str,
        direction: &str,
    ) -> Result<VoteOutcome, AppError> {
        let direction = VoteDirection::parse(direction)?;
        self.require_bot(bot_id).await?;

        let outcome = self.ledger.vote(bot_id, user_id, direction).await?;
        self.feed.emit(BotEvent::Voted {
            bot_id: bot_id.to_string(),
            outcome: outcome.clone(),
        });

        Ok(outcome)
    }

    pub async fn add_comment(
        &self,
        user_id: &str,
        bot_id: &str,
        text: &str,
    ) -> Result<Comment, AppError> {
        self.require_bot(bot_id).await?;

        let comment = self.ledger.comment(bot_id, user_id, text).await?;
        self.feed.emit(BotEvent::Commented {
            comment: comment.clone(),
        });

        Ok(comment)
    }

    // ==================== READS ====================

    /// The caller's current vote on a bot.
    pub async fn my_vote(
        &self,
        user_id: &str,
        bot_id: &str,
    ) -> Result<Option<VoteDirection>, AppError> {
        self.require_bot(bot_id).await?;
        let record = self.ledger.vote_record(bot_id, user_id).await?;
        Ok(record.and_then(|r| r.current()))
    }

    /// All bots matching the filter with profiles and aggregates.
    ///
    /// Newest first, or by relevance when a free-text query is given.
    pub async fn browse(&self, filter: &BrowseFilter) -> Result<Vec<CatalogEntry>, AppError> {
        let rows = self.repo.list_all().await?;
        let mut aggregates = self.ledger.all_aggregates().await?;

        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let scores: Option<HashMap<String, f32>> = match query {
            Some(q) => Some(
                self.search
                    .search(q, rows.len().max(1))?
                    .into_iter()
                    .map(|r| (r.bot_id, r.score))
                    .collect(),
            ),
            None => None,
        };

        let mut entries: Vec<CatalogEntry> = rows
            .into_iter()
            .filter(|(bot, _)| filter.matches(bot))
            .filter_map(|(bot, developer)| {
                let score = match &scores {
                    Some(scores) => Some(*scores.get(&bot.bot_id)?),
                    None => None,
                };
                let aggregates = aggregates.remove(&bot.bot_id).unwrap_or_default();
                Some(CatalogEntry {
                    bot,
                    developer,
                    aggregates,
                    score,
                })
            })
            .collect();

        if scores.is_some() {
            // Stable sort keeps newest first among equal scores
            entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        }

        Ok(entries)
    }

    /// Detail page data for one bot.
    pub async fn entry(&self, bot_id: &str) -> Result<CatalogEntry, AppError> {
        let bot = self.require_bot(bot_id).await?;
        self.entry_for(bot).await
    }

    pub async fn entry_by_name(&self, name: &str) -> Result<CatalogEntry, AppError> {
        let bot = self
            .repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bot {} not found", name)))?;
        self.entry_for(bot).await
    }

    pub async fn aggregates_for(&self, bot_id: &str) -> Result<Aggregates, AppError> {
        self.require_bot(bot_id).await?;
        self.ledger.aggregates_for(bot_id).await
    }

    /// Live events of one existing bot.
    pub async fn subscribe(&self, bot_id: &str) -> Result<BotSubscription, AppError> {
        self.require_bot(bot_id).await?;
        Ok(self.feed.subscribe(bot_id))
    }

    pub async fn current_revision(&self) -> Result<i64, AppError> {
        self.gateway.current_revision().await
    }

    pub async fn revision_info(&self) -> Result<RevisionInfo, AppError> {
        self.gateway.revision_info().await
    }

    /// Rebuild the search index from the stored catalog. Returns the bot count.
    pub async fn rebuild_search(&self) -> Result<usize, AppError> {
        let rows = self.repo.list_all().await?;
        self.search.rebuild(&rows).await?;
        Ok(rows.len())
    }

    // ==================== HELPERS ====================

    async fn require_bot(&self, bot_id: &str) -> Result<Bot, AppError> {
        self.repo
            .get(bot_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bot {} not found", bot_id)))
    }

    async fn entry_for(&self, bot: Bot) -> Result<CatalogEntry, AppError> {
        let developer = self.repo.developer_profile(&bot.bot_id).await?;
        let aggregates = self.ledger.aggregates_for(&bot.bot_id).await?;
        Ok(CatalogEntry {
            bot,
            developer,
            aggregates,
            score: None,
        })
    }

    async fn upload(
        &self,
        category: AssetCategory,
        upload: &AssetUpload,
        already_uploaded: &[String],
    ) -> Result<String, AppError> {
        self.gateway
            .upload_asset(category, upload)
            .await
            .inspect_err(|e| warn_orphans(already_uploaded, e))
    }

    /// Upsert the profile if any field was given. Failures are logged.
    async fn save_developer(
        &self,
        bot: &Bot,
        fields: Option<&DeveloperFields>,
    ) -> Option<DeveloperProfile> {
        let fields = fields.filter(|f| f.has_any())?;
        match self.repo.upsert_developer_profile(&bot.name, fields).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(bot_id = %bot.bot_id, "Failed to save developer profile: {}", e);
                None
            }
        }
    }

    async fn index(&self, bot: &Bot, profile: Option<&DeveloperProfile>) {
        if let Err(e) = self.search.index_bot(bot, profile).await {
            tracing::warn!(bot_id = %bot.bot_id, "Failed to index bot: {}", e);
        }
    }
}

fn check_uploads(
    image: Option<&AssetUpload>,
    archive: Option<&AssetUpload>,
) -> Result<(), AppError> {
    if let Some(upload) = image {
        upload.check_category(AssetCategory::Image)?;
    }
    if let Some(upload) = archive {
        upload.check_category(AssetCategory::Archive)?;
    }
    Ok(())
}

fn warn_orphans(urls: &[String], cause: &AppError) {
    for url in urls {
        tracing::warn!(%url, "Uploaded asset left orphaned: {}", cause);
    }
}
