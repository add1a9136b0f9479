//! Catalog repository: bots and their developer profiles.
//!
//! Ownership is checked here against the stored `posted_by`, never against
//! anything the client claims. `posted_by` is immutable once published.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::Row;

use super::now_timestamp;
use crate::errors::AppError;
use crate::models::{
    Bot, BotPatch, BotStatus, DeploymentHost, DeveloperFields, DeveloperProfile, NewBot,
};
use crate::storage::{Collection, StorageGateway};

const BOT_COLUMNS: &str = "bot_id, name, developer_name, version, description, status, \
     deployment_hosts, image_url, archive_url, github_url, developer_site, posted_by, \
     created_at, updated_at, revision";

const DEVELOPER_COLUMNS: &str = "bot_id, bot_name, developer_name, description, github_link, \
     website, channel_link, group_link, contact, updated_at";

/// Result of an update: the row it merged against and the row now stored.
#[derive(Debug, Clone)]
pub struct BotUpdate {
    pub previous: Bot,
    pub bot: Bot,
}

/// Repository for bot rows and developer profiles.
#[derive(Clone)]
pub struct CatalogRepository {
    gateway: Arc<StorageGateway>,
}

impl CatalogRepository {
    pub fn new(gateway: Arc<StorageGateway>) -> Self {
        Self { gateway }
    }

    // ==================== BOT OPERATIONS ====================

    /// List all bots, newest first, each with its developer profile.
    pub async fn list_all(&self) -> Result<Vec<(Bot, Option<DeveloperProfile>)>, AppError> {
        let sql = format!(
            "SELECT {} FROM bots ORDER BY created_at DESC, rowid DESC",
            BOT_COLUMNS
        );
        let rows = self
            .gateway
            .run("list_bots", sqlx::query(&sql).fetch_all(self.gateway.pool()))
            .await?;

        let mut profiles = self.list_developer_profiles().await?;

        Ok(rows
            .iter()
            .map(bot_from_row)
            .map(|bot| {
                let profile = profiles.remove(&bot.bot_id);
                (bot, profile)
            })
            .collect())
    }

    /// Get a bot by ID.
    pub async fn get(&self, bot_id: &str) -> Result<Option<Bot>, AppError> {
        let sql = format!("SELECT {} FROM bots WHERE bot_id = ?", BOT_COLUMNS);
        let row = self
            .gateway
            .run(
                "get_bot",
                sqlx::query(&sql)
                    .bind(bot_id)
                    .fetch_optional(self.gateway.pool()),
            )
            .await?;

        Ok(row.as_ref().map(bot_from_row))
    }

    /// Get a bot by its display name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Bot>, AppError> {
        let sql = format!("SELECT {} FROM bots WHERE name = ?", BOT_COLUMNS);
        let row = self
            .gateway
            .run(
                "get_bot_by_name",
                sqlx::query(&sql)
                    .bind(name.trim())
                    .fetch_optional(self.gateway.pool()),
            )
            .await?;

        Ok(row.as_ref().map(bot_from_row))
    }

    /// Insert a new bot owned by `owner`.
    pub async fn publish(&self, owner: &str, bot: &NewBot) -> Result<Bot, AppError> {
        let bot_id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();
        let hosts_json = serde_json::to_string(&bot.deployment_hosts)?;

        self.gateway
            .run(
                "insert_bot",
                sqlx::query(
                    r#"INSERT INTO bots (
                        bot_id, name, developer_name, version, description, status,
                        deployment_hosts, image_url, archive_url, github_url, developer_site,
                        posted_by, created_at, updated_at, revision
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)"#,
                )
                .bind(&bot_id)
                .bind(&bot.name)
                .bind(&bot.developer_name)
                .bind(&bot.version)
                .bind(&bot.description)
                .bind(bot.status.as_str())
                .bind(&hosts_json)
                .bind(&bot.image_url)
                .bind(&bot.archive_url)
                .bind(&bot.github_url)
                .bind(&bot.developer_site)
                .bind(owner)
                .bind(&now)
                .bind(&now)
                .execute(self.gateway.pool()),
            )
            .await
            .map_err(|e| duplicate_name(e, &bot.name))?;

        self.gateway.bump_revision().await?;
        tracing::info!(bot_id = %bot_id, name = %bot.name, owner, "Bot published");

        Ok(Bot {
            bot_id,
            name: bot.name.clone(),
            developer_name: bot.developer_name.clone(),
            version: bot.version.clone(),
            description: bot.description.clone(),
            status: bot.status,
            deployment_hosts: bot.deployment_hosts.clone(),
            image_url: bot.image_url.clone(),
            archive_url: bot.archive_url.clone(),
            github_url: bot.github_url.clone(),
            developer_site: bot.developer_site.clone(),
            posted_by: owner.to_string(),
            created_at: now.clone(),
            updated_at: now,
            revision: 1,
        })
    }

    /// Load a bot and confirm `owner` posted it.
    pub async fn owned(&self, bot_id: &str, owner: &str) -> Result<Bot, AppError> {
        let bot = self
            .get(bot_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bot {} not found", bot_id)))?;

        if bot.posted_by != owner {
            tracing::warn!(bot_id, owner, "Rejected change by non-owner");
            return Err(AppError::NotOwner(format!(
                "Only the owner can change bot {}",
                bot.name
            )));
        }
        Ok(bot)
    }

    /// Apply a partial update with ownership and optimistic concurrency checks.
    pub async fn update(
        &self,
        bot_id: &str,
        owner: &str,
        patch: &BotPatch,
    ) -> Result<BotUpdate, AppError> {
        let existing = self.owned(bot_id, owner).await?;

        // Check revision for optimistic concurrency
        if let Some(expected) = patch.expected_revision {
            if existing.revision != expected {
                return Err(AppError::VersionMismatch {
                    message: format!(
                        "Revision mismatch: expected {}, current {}",
                        expected, existing.revision
                    ),
                    current_revision: existing.revision,
                });
            }
        }

        let mut merged = patch.apply(&existing);
        merged.updated_at = now_timestamp();
        merged.revision = existing.revision + 1;
        let hosts_json = serde_json::to_string(&merged.deployment_hosts)?;

        let mut tx = self
            .gateway
            .run("begin_update_bot", self.gateway.pool().begin())
            .await?;

        // Conditional UPDATE guards against a concurrent writer
        let result = self
            .gateway
            .run(
                "update_bot",
                sqlx::query(
                    r#"UPDATE bots SET
                        name = ?, developer_name = ?, version = ?, description = ?, status = ?,
                        deployment_hosts = ?, image_url = ?, archive_url = ?, github_url = ?,
                        developer_site = ?, updated_at = ?, revision = ?
                    WHERE bot_id = ? AND posted_by = ? AND revision = ?"#,
                )
                .bind(&merged.name)
                .bind(&merged.developer_name)
                .bind(&merged.version)
                .bind(&merged.description)
                .bind(merged.status.as_str())
                .bind(&hosts_json)
                .bind(&merged.image_url)
                .bind(&merged.archive_url)
                .bind(&merged.github_url)
                .bind(&merged.developer_site)
                .bind(&merged.updated_at)
                .bind(merged.revision)
                .bind(bot_id)
                .bind(owner)
                .bind(existing.revision)
                .execute(&mut *tx),
            )
            .await
            .map_err(|e| duplicate_name(e, &merged.name))?;

        if result.rows_affected() == 0 {
            drop(tx);
            let current = self.get(bot_id).await?;
            return Err(AppError::VersionMismatch {
                message: "Concurrent modification detected".to_string(),
                current_revision: current.map(|b| b.revision).unwrap_or(0),
            });
        }

        if merged.name != existing.name {
            self.gateway
                .run(
                    "rename_developer_link",
                    sqlx::query("UPDATE developers SET bot_name = ? WHERE bot_id = ?")
                        .bind(&merged.name)
                        .bind(bot_id)
                        .execute(&mut *tx),
                )
                .await?;
        }

        self.gateway.run("commit_update_bot", tx.commit()).await?;
        self.gateway.bump_revision().await?;
        tracing::info!(bot_id, revision = merged.revision, "Bot updated");

        Ok(BotUpdate {
            previous: existing,
            bot: merged,
        })
    }

    /// Delete an owned bot, then release its assets.
    ///
    /// Asset releases are independent and best effort; the row is gone even if
    /// both fail.
    pub async fn remove(&self, bot_id: &str, owner: &str) -> Result<Bot, AppError> {
        let bot = self.owned(bot_id, owner).await?;

        self.gateway.delete_row(Collection::Bots, bot_id).await?;
        self.gateway.bump_revision().await?;
        tracing::info!(bot_id, name = %bot.name, "Bot deleted");

        let release_image = async {
            if let Some(url) = &bot.image_url {
                self.gateway.release_asset(url).await;
            }
        };
        let release_archive = async {
            if let Some(url) = &bot.archive_url {
                self.gateway.release_asset(url).await;
            }
        };
        futures::join!(release_image, release_archive);

        Ok(bot)
    }

    // ==================== DEVELOPER PROFILE OPERATIONS ====================

    /// Create or replace the profile of the bot currently named `bot_name`.
    pub async fn upsert_developer_profile(
        &self,
        bot_name: &str,
        fields: &DeveloperFields,
    ) -> Result<DeveloperProfile, AppError> {
        let bot = self
            .get_by_name(bot_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bot {} not found", bot_name)))?;

        let fields = fields.cleaned();
        let now = now_timestamp();

        self.gateway
            .run(
                "upsert_developer",
                sqlx::query(
                    r#"INSERT INTO developers (
                        bot_id, bot_name, developer_name, description, github_link, website,
                        channel_link, group_link, contact, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(bot_id) DO UPDATE SET
                        bot_name = excluded.bot_name,
                        developer_name = excluded.developer_name,
                        description = excluded.description,
                        github_link = excluded.github_link,
                        website = excluded.website,
                        channel_link = excluded.channel_link,
                        group_link = excluded.group_link,
                        contact = excluded.contact,
                        updated_at = excluded.updated_at"#,
                )
                .bind(&bot.bot_id)
                .bind(&bot.name)
                .bind(&fields.developer_name)
                .bind(&fields.description)
                .bind(&fields.github_link)
                .bind(&fields.website)
                .bind(&fields.channel_link)
                .bind(&fields.group_link)
                .bind(&fields.contact)
                .bind(&now)
                .execute(self.gateway.pool()),
            )
            .await?;

        self.gateway.bump_revision().await?;

        Ok(DeveloperProfile {
            bot_id: bot.bot_id,
            bot_name: bot.name,
            developer_name: fields.developer_name,
            description: fields.description,
            github_link: fields.github_link,
            website: fields.website,
            channel_link: fields.channel_link,
            group_link: fields.group_link,
            contact: fields.contact,
            updated_at: now,
        })
    }

    /// Get the profile linked to a bot.
    pub async fn developer_profile(
        &self,
        bot_id: &str,
    ) -> Result<Option<DeveloperProfile>, AppError> {
        let sql = format!("SELECT {} FROM developers WHERE bot_id = ?", DEVELOPER_COLUMNS);
        let row = self
            .gateway
            .run(
                "get_developer",
                sqlx::query(&sql)
                    .bind(bot_id)
                    .fetch_optional(self.gateway.pool()),
            )
            .await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    async fn list_developer_profiles(
        &self,
    ) -> Result<HashMap<String, DeveloperProfile>, AppError> {
        let sql = format!("SELECT {} FROM developers", DEVELOPER_COLUMNS);
        let rows = self
            .gateway
            .run(
                "list_developers",
                sqlx::query(&sql).fetch_all(self.gateway.pool()),
            )
            .await?;

        Ok(rows
            .iter()
            .map(profile_from_row)
            .map(|p| (p.bot_id.clone(), p))
            .collect())
    }
}

fn duplicate_name(err: AppError, name: &str) -> AppError {
    match err {
        AppError::Conflict(_) => AppError::Conflict(format!("Bot name '{}' already exists", name)),
        other => other,
    }
}

// Helper functions for row conversion

fn bot_from_row(row: &sqlx::sqlite::SqliteRow) -> Bot {
    let status: String = row.get("status");
    let hosts: String = row.get("deployment_hosts");
    Bot {
        bot_id: row.get("bot_id"),
        name: row.get("name"),
        developer_name: row.get("developer_name"),
        version: row.get("version"),
        description: row.get("description"),
        status: BotStatus::parse(&status).unwrap_or_default(),
        deployment_hosts: serde_json::from_str::<Vec<DeploymentHost>>(&hosts).unwrap_or_default(),
        image_url: row.get("image_url"),
        archive_url: row.get("archive_url"),
        github_url: row.get("github_url"),
        developer_site: row.get("developer_site"),
        posted_by: row.get("posted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        revision: row.get("revision"),
    }
}

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> DeveloperProfile {
    DeveloperProfile {
        bot_id: row.get("bot_id"),
        bot_name: row.get("bot_name"),
        developer_name: row.get("developer_name"),
        description: row.get("description"),
        github_link: row.get("github_link"),
        website: row.get("website"),
        channel_link: row.get("channel_link"),
        group_link: row.get("group_link"),
        contact: row.get("contact"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BotForm;
    use crate::test_support::test_gateway;

    fn new_bot(name: &str) -> NewBot {
        BotForm {
            name: name.to_string(),
            deployment_hosts: vec!["Render".to_string()],
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_rejects_duplicate_name() {
        let (gateway, _store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        repo.publish("ada", &new_bot("EchoBot")).await.unwrap();
        let err = repo.publish("bob", &new_bot("EchoBot")).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("EchoBot")));
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_by_non_owner_leaves_row_unchanged() {
        let (gateway, _store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        let bot = repo.publish("ada", &new_bot("EchoBot")).await.unwrap();
        let before = repo.get(&bot.bot_id).await.unwrap().unwrap();

        let patch = BotPatch {
            description: Some(Some("hijacked".to_string())),
            status: Some(BotStatus::Online),
            ..Default::default()
        };
        let err = repo.update(&bot.bot_id, "mallory", &patch).await.unwrap_err();
        assert!(matches!(err, AppError::NotOwner(_)));

        let after = repo.get(&bot.bot_id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_update_checks_revision_and_renames_profile_link() {
        let (gateway, _store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        let bot = repo.publish("ada", &new_bot("EchoBot")).await.unwrap();
        repo.upsert_developer_profile(
            "EchoBot",
            &DeveloperFields {
                developer_name: Some("Ada".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let stale = BotPatch {
            expected_revision: Some(7),
            ..Default::default()
        };
        assert!(matches!(
            repo.update(&bot.bot_id, "ada", &stale).await,
            Err(AppError::VersionMismatch {
                current_revision: 1,
                ..
            })
        ));

        let rename = BotPatch {
            name: Some("EchoBot2".to_string()),
            expected_revision: Some(1),
            ..Default::default()
        };
        let updated = repo.update(&bot.bot_id, "ada", &rename).await.unwrap();
        assert_eq!(updated.previous.name, "EchoBot");
        assert_eq!(updated.previous.revision, 1);
        assert_eq!(updated.bot.name, "EchoBot2");
        assert_eq!(updated.bot.revision, 2);

        let profile = repo.developer_profile(&bot.bot_id).await.unwrap().unwrap();
        assert_eq!(profile.bot_name, "EchoBot2");
        assert_eq!(profile.developer_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_conflicts() {
        let (gateway, _store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        repo.publish("ada", &new_bot("EchoBot")).await.unwrap();
        let other = repo.publish("ada", &new_bot("PingBot")).await.unwrap();

        let rename = BotPatch {
            name: Some("EchoBot".to_string()),
            ..Default::default()
        };
        let err = repo.update(&other.bot_id, "ada", &rename).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            repo.get(&other.bot_id).await.unwrap().unwrap().name,
            "PingBot"
        );
    }

    #[tokio::test]
    async fn test_upsert_profile_is_last_write_wins() {
        let (gateway, _store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);
        let bot = repo.publish("ada", &new_bot("EchoBot")).await.unwrap();

        repo.upsert_developer_profile(
            "EchoBot",
            &DeveloperFields {
                developer_name: Some("Ada".to_string()),
                website: Some("https://ada.dev".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        repo.upsert_developer_profile(
            "EchoBot",
            &DeveloperFields {
                developer_name: Some("Ada L.".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let profile = repo.developer_profile(&bot.bot_id).await.unwrap().unwrap();
        assert_eq!(profile.developer_name.as_deref(), Some("Ada L."));
        assert!(profile.website.is_none());

        let missing = repo
            .upsert_developer_profile("NoSuchBot", &DeveloperFields::default())
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_releases_assets_even_when_one_fails() {
        let (gateway, store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        let mut bot = new_bot("EchoBot");
        bot.image_url = Some(store.seed("images", "1_logo.png"));
        bot.archive_url = Some(store.seed("archives", "1_bot.zip"));
        let image_url = bot.image_url.clone().unwrap();
        let archive_url = bot.archive_url.clone().unwrap();
        store.fail_deletes_of(&image_url);

        let published = repo.publish("ada", &bot).await.unwrap();
        repo.upsert_developer_profile(
            "EchoBot",
            &DeveloperFields {
                developer_name: Some("Ada".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        repo.remove(&published.bot_id, "ada").await.unwrap();

        assert!(repo.get(&published.bot_id).await.unwrap().is_none());
        let mut attempts = store.delete_attempts();
        attempts.sort();
        let mut expected = vec![image_url.clone(), archive_url.clone()];
        expected.sort();
        assert_eq!(attempts, expected);
        assert!(store.contains(&image_url));
        assert!(!store.contains(&archive_url));

        // The profile is left behind
        assert!(repo
            .developer_profile(&published.bot_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_remove_by_non_owner_is_rejected() {
        let (gateway, store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        let bot = repo.publish("ada", &new_bot("EchoBot")).await.unwrap();
        let err = repo.remove(&bot.bot_id, "mallory").await.unwrap_err();

        assert!(matches!(err, AppError::NotOwner(_)));
        assert!(repo.get(&bot.bot_id).await.unwrap().is_some());
        assert!(store.delete_attempts().is_empty());

        let missing = repo.remove("nope", "ada").await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_all_is_newest_first() {
        let (gateway, _store, _dir) = test_gateway().await;
        let repo = CatalogRepository::new(gateway);

        repo.publish("ada", &new_bot("First")).await.unwrap();
        repo.publish("ada", &new_bot("Second")).await.unwrap();

        let names: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|(bot, _)| bot.name)
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }
}
