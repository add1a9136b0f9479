//! Developer profile attached to a bot.

use serde::{Deserialize, Serialize};

use super::clean_text;

/// Extended author information, one per bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperProfile {
    pub bot_id: String,
    pub bot_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_link: Option<String>,
    /// Phone number or messaging handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub updated_at: String,
}

/// Developer fields supplied alongside a bot form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperFields {
    #[serde(default)]
    pub developer_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub github_link: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub channel_link: Option<String>,
    #[serde(default)]
    pub group_link: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl DeveloperFields {
    /// Trimmed copy with blank values dropped.
    pub fn cleaned(&self) -> Self {
        Self {
            developer_name: clean_text(&self.developer_name),
            description: clean_text(&self.description),
            github_link: clean_text(&self.github_link),
            website: clean_text(&self.website),
            channel_link: clean_text(&self.channel_link),
            group_link: clean_text(&self.group_link),
            contact: clean_text(&self.contact),
        }
    }

    /// True when the owner filled in at least one field.
    pub fn has_any(&self) -> bool {
        let c = self.cleaned();
        [
            &c.developer_name,
            &c.description,
            &c.github_link,
            &c.website,
            &c.channel_link,
            &c.group_link,
            &c.contact,
        ]
        .iter()
        .any(|f| f.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_any_ignores_blank_fields() {
        let blank = DeveloperFields {
            developer_name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!blank.has_any());

        let filled = DeveloperFields {
            contact: Some("@ada".to_string()),
            ..Default::default()
        };
        assert!(filled.has_any());
    }
}
