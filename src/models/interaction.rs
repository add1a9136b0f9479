//! Votes, comments and their aggregates.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Maximum accepted comment length, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Like,
    Dislike,
}

impl VoteDirection {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(VoteDirection::Like),
            "dislike" => Ok(VoteDirection::Dislike),
            other => Err(AppError::Validation(format!(
                "Vote direction must be 'like' or 'dislike', got '{}'",
                other
            ))),
        }
    }
}

/// One user's vote row for one bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub bot_id: String,
    pub user_id: String,
    pub liked: bool,
    pub disliked: bool,
    pub updated_at: String,
}

impl InteractionRecord {
    pub fn current(&self) -> Option<VoteDirection> {
        match (self.liked, self.disliked) {
            (true, _) => Some(VoteDirection::Like),
            (_, true) => Some(VoteDirection::Dislike),
            _ => None,
        }
    }
}

/// Result of casting a vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub likes: i64,
    pub dislikes: i64,
    /// The caller's vote after the toggle, if any
    pub current: Option<VoteDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: String,
    pub bot_id: String,
    pub user_id: String,
    pub seq: i64,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub likes: i64,
    pub dislikes: i64,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub direction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

/// Trim and bound comment text.
pub fn validate_comment(text: &str) -> Result<String, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment exceeds {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!(VoteDirection::parse("LIKE").unwrap(), VoteDirection::Like);
        assert_eq!(
            VoteDirection::parse(" dislike ").unwrap(),
            VoteDirection::Dislike
        );
        assert!(matches!(
            VoteDirection::parse("meh"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_comment_validation() {
        assert!(validate_comment("   \n").is_err());
        assert_eq!(validate_comment("  nice bot ").unwrap(), "nice bot");
        assert!(validate_comment(&"x".repeat(MAX_COMMENT_CHARS + 1)).is_err());
    }
}
