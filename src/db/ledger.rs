//! Interaction ledger: votes and comments per bot.
//!
//! A vote is one upsert keyed by (bot, user); the toggle happens inside the
//! statement so repeated clicks from the same user cannot lose an update.
//! Comments are separate append-only rows numbered per (bot, user).

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::Row;

use super::now_timestamp;
use crate::errors::AppError;
use crate::models::{
    validate_comment, Aggregates, Comment, InteractionRecord, VoteDirection, VoteOutcome,
};
use crate::storage::StorageGateway;

#[derive(Clone)]
pub struct InteractionLedger {
    gateway: Arc<StorageGateway>,
}

impl InteractionLedger {
    pub fn new(gateway: Arc<StorageGateway>) -> Self {
        Self { gateway }
    }

    /// Toggle a vote and return the new counts.
    ///
    /// Same direction as the stored vote clears it; the opposite direction
    /// replaces it.
    pub async fn vote(
        &self,
        bot_id: &str,
        user_id: &str,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, AppError> {
        let (like, dislike) = match direction {
            VoteDirection::Like => (1_i64, 0_i64),
            VoteDirection::Dislike => (0, 1),
        };

        let row = self
            .gateway
            .run(
                "upsert_vote",
                sqlx::query(
                    r#"INSERT INTO bot_interactions (bot_id, user_id, liked, disliked, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(bot_id, user_id) DO UPDATE SET
                        liked = CASE WHEN excluded.liked = 1 THEN 1 - bot_interactions.liked ELSE 0 END,
                        disliked = CASE WHEN excluded.disliked = 1 THEN 1 - bot_interactions.disliked ELSE 0 END,
                        updated_at = excluded.updated_at
                    RETURNING liked, disliked"#,
                )
                .bind(bot_id)
                .bind(user_id)
                .bind(like)
                .bind(dislike)
                .bind(now_timestamp())
                .fetch_one(self.gateway.pool()),
            )
            .await?;

        let liked: i64 = row.get("liked");
        let disliked: i64 = row.get("disliked");
        let current = match (liked != 0, disliked != 0) {
            (true, _) => Some(VoteDirection::Like),
            (_, true) => Some(VoteDirection::Dislike),
            _ => None,
        };

        self.gateway.bump_revision().await?;
        let (likes, dislikes) = self.tally(bot_id).await?;
        tracing::debug!(bot_id, user_id, ?current, likes, dislikes, "Vote recorded");

        Ok(VoteOutcome {
            likes,
            dislikes,
            current,
        })
    }

    /// The stored vote row of one user, if any.
    pub async fn vote_record(
        &self,
        bot_id: &str,
        user_id: &str,
    ) -> Result<Option<InteractionRecord>, AppError> {
        let row = self
            .gateway
            .run(
                "get_vote",
                sqlx::query(
                    "SELECT bot_id, user_id, liked, disliked, updated_at FROM bot_interactions WHERE bot_id = ? AND user_id = ?",
                )
                .bind(bot_id)
                .bind(user_id)
                .fetch_optional(self.gateway.pool()),
            )
            .await?;

        Ok(row.map(|row| {
            let liked: i64 = row.get("liked");
            let disliked: i64 = row.get("disliked");
            InteractionRecord {
                bot_id: row.get("bot_id"),
                user_id: row.get("user_id"),
                liked: liked != 0,
                disliked: disliked != 0,
                updated_at: row.get("updated_at"),
            }
        }))
    }

    /// Append a comment.
    pub async fn comment(
        &self,
        bot_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<Comment, AppError> {
        let text = validate_comment(text)?;
        let comment_id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        // seq is computed in the same statement as the insert
        let row = self
            .gateway
            .run(
                "insert_comment",
                sqlx::query(
                    r#"INSERT INTO bot_comments (comment_id, bot_id, user_id, seq, body, created_at)
                    VALUES (?, ?, ?,
                        (SELECT COALESCE(MAX(seq), 0) + 1 FROM bot_comments WHERE bot_id = ? AND user_id = ?),
                        ?, ?)
                    RETURNING seq"#,
                )
                .bind(&comment_id)
                .bind(bot_id)
                .bind(user_id)
                .bind(bot_id)
                .bind(user_id)
                .bind(&text)
                .bind(&now)
                .fetch_one(self.gateway.pool()),
            )
            .await?;

        self.gateway.bump_revision().await?;

        Ok(Comment {
            comment_id,
            bot_id: bot_id.to_string(),
            user_id: user_id.to_string(),
            seq: row.get("seq"),
            text,
            created_at: now,
        })
    }

    /// Likes, dislikes and comments (oldest first) of one bot.
    pub async fn aggregates_for(&self, bot_id: &str) -> Result<Aggregates, AppError> {
        let (likes, dislikes) = self.tally(bot_id).await?;
        let rows = self
            .gateway
            .run(
                "list_comments",
                sqlx::query(
                    "SELECT comment_id, bot_id, user_id, seq, body, created_at FROM bot_comments WHERE bot_id = ? ORDER BY created_at, rowid",
                )
                .bind(bot_id)
                .fetch_all(self.gateway.pool()),
            )
            .await?;

        Ok(Aggregates {
            likes,
            dislikes,
            comments: rows.iter().map(comment_from_row).collect(),
        })
    }

    /// Aggregates of every bot that has any interaction.
    pub async fn all_aggregates(&self) -> Result<HashMap<String, Aggregates>, AppError> {
        let tallies = self
            .gateway
            .run(
                "tally_all",
                sqlx::query(
                    "SELECT bot_id, COALESCE(SUM(liked), 0) AS likes, COALESCE(SUM(disliked), 0) AS dislikes FROM bot_interactions GROUP BY bot_id",
                )
                .fetch_all(self.gateway.pool()),
            )
            .await?;

        let comments = self
            .gateway
            .run(
                "list_all_comments",
                sqlx::query(
                    "SELECT comment_id, bot_id, user_id, seq, body, created_at FROM bot_comments ORDER BY created_at, rowid",
                )
                .fetch_all(self.gateway.pool()),
            )
            .await?;

        let mut aggregates: HashMap<String, Aggregates> = HashMap::new();
        for row in &tallies {
            let entry = aggregates.entry(row.get("bot_id")).or_default();
            entry.likes = row.get("likes");
            entry.dislikes = row.get("dislikes");
        }
        for comment in comments.iter().map(comment_from_row) {
            aggregates
                .entry(comment.bot_id.clone())
                .or_default()
                .comments
                .push(comment);
        }

        Ok(aggregates)
    }

    async fn tally(&self, bot_id: &str) -> Result<(i64, i64), AppError> {
        let row = self
            .gateway
            .run(
                "tally_votes",
                sqlx::query(
                    "SELECT COALESCE(SUM(liked), 0) AS likes, COALESCE(SUM(disliked), 0) AS dislikes FROM bot_interactions WHERE bot_id = ?",
                )
                .bind(bot_id)
                .fetch_one(self.gateway.pool()),
            )
            .await?;

        Ok((row.get("likes"), row.get("dislikes")))
    }
}

fn comment_from_row(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        comment_id: row.get("comment_id"),
        bot_id: row.get("bot_id"),
        user_id: row.get("user_id"),
        seq: row.get("seq"),
        text: row.get("body"),
        created_at: row.get("created_at"),
    }
}
