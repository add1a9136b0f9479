//! Bot model and the forms used to publish and edit one.

use serde::{Deserialize, Serialize};

use super::DeveloperFields;
use crate::errors::AppError;

/// Operational status shown on the catalog card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Online,
    #[default]
    Offline,
    Maintenance,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Online => "online",
            BotStatus::Offline => "offline",
            BotStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Some(BotStatus::Online),
            "offline" => Some(BotStatus::Offline),
            "maintenance" => Some(BotStatus::Maintenance),
            _ => None,
        }
    }
}

/// Hosting platforms a bot can be tagged with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeploymentHost {
    Heroku,
    Render,
    Replit,
    Railway,
    Vercel,
    Katabump,
    #[serde(rename = "Own hosting")]
    OwnHosting,
}

impl DeploymentHost {
    pub const ALL: [DeploymentHost; 7] = [
        DeploymentHost::Heroku,
        DeploymentHost::Render,
        DeploymentHost::Replit,
        DeploymentHost::Railway,
        DeploymentHost::Vercel,
        DeploymentHost::Katabump,
        DeploymentHost::OwnHosting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentHost::Heroku => "Heroku",
            DeploymentHost::Render => "Render",
            DeploymentHost::Replit => "Replit",
            DeploymentHost::Railway => "Railway",
            DeploymentHost::Vercel => "Vercel",
            DeploymentHost::Katabump => "Katabump",
            DeploymentHost::OwnHosting => "Own hosting",
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|h| h.as_str().eq_ignore_ascii_case(wanted))
    }
}

/// Parse host names into a deduplicated list, keeping first-seen order.
pub fn parse_hosts(raw: &[String]) -> Result<Vec<DeploymentHost>, AppError> {
    let mut hosts = Vec::with_capacity(raw.len());
    for name in raw {
        let host = DeploymentHost::parse(name).ok_or_else(|| {
            AppError::Validation(format!("Unknown deployment host: {}", name))
        })?;
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    Ok(hosts)
}

pub fn parse_status(raw: &str) -> Result<BotStatus, AppError> {
    BotStatus::parse(raw).ok_or_else(|| AppError::Validation(format!("Invalid status: {}", raw)))
}

/// A published catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub bot_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: BotStatus,
    pub deployment_hosts: Vec<DeploymentHost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_site: Option<String>,
    pub posted_by: String,
    pub created_at: String,
    pub updated_at: String,
    /// Internal revision for optimistic concurrency control
    #[serde(default)]
    pub revision: i64,
}

/// Owner-submitted fields for a new bot.
///
/// Asset URLs are never taken from the client; they only come from uploads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotForm {
    pub name: String,
    #[serde(default)]
    pub developer_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deployment_hosts: Vec<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub developer_site: Option<String>,
    #[serde(default)]
    pub developer: Option<DeveloperFields>,
}

/// Partial update: absent fields are left alone, blank optional text clears.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotPatchForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub developer_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deployment_hosts: Option<Vec<String>>,
    /// Drop the current image. Ignored when a new image is uploaded.
    #[serde(default)]
    pub remove_image: bool,
    #[serde(default)]
    pub remove_archive: bool,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub developer_site: Option<String>,
    #[serde(default)]
    pub developer: Option<DeveloperFields>,
    /// Expected revision for optimistic concurrency control
    #[serde(default)]
    pub expected_revision: Option<i64>,
}

/// Validated row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewBot {
    pub name: String,
    pub developer_name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub status: BotStatus,
    pub deployment_hosts: Vec<DeploymentHost>,
    pub image_url: Option<String>,
    pub archive_url: Option<String>,
    pub github_url: Option<String>,
    pub developer_site: Option<String>,
}

/// Validated partial update. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct BotPatch {
    pub name: Option<String>,
    pub developer_name: Option<Option<String>>,
    pub version: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub status: Option<BotStatus>,
    pub deployment_hosts: Option<Vec<DeploymentHost>>,
    pub image_url: Option<Option<String>>,
    pub archive_url: Option<Option<String>>,
    pub github_url: Option<Option<String>>,
    pub developer_site: Option<Option<String>>,
    pub expected_revision: Option<i64>,
}

impl BotPatch {
    /// Apply the patch on top of an existing row.
    pub fn apply(&self, existing: &Bot) -> Bot {
        let pick = |patch: &Option<Option<String>>, current: &Option<String>| match patch {
            Some(value) => value.clone(),
            None => current.clone(),
        };

        Bot {
            bot_id: existing.bot_id.clone(),
            name: self.name.clone().unwrap_or_else(|| existing.name.clone()),
            developer_name: pick(&self.developer_name, &existing.developer_name),
            version: pick(&self.version, &existing.version),
            description: pick(&self.description, &existing.description),
            status: self.status.unwrap_or(existing.status),
            deployment_hosts: self
                .deployment_hosts
                .clone()
                .unwrap_or_else(|| existing.deployment_hosts.clone()),
            image_url: pick(&self.image_url, &existing.image_url),
            archive_url: pick(&self.archive_url, &existing.archive_url),
            github_url: pick(&self.github_url, &existing.github_url),
            developer_site: pick(&self.developer_site, &existing.developer_site),
            posted_by: existing.posted_by.clone(),
            created_at: existing.created_at.clone(),
            updated_at: existing.updated_at.clone(),
            revision: existing.revision,
        }
    }
}

/// Trim optional input; blank becomes `None`.
pub fn clean_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Patch variant of [`clean_text`]: absent stays absent, blank clears.
pub fn patch_text(value: &Option<String>) -> Option<Option<String>> {
    value.as_ref().map(|_| clean_text(value))
}

impl BotForm {
    pub fn validate(&self) -> Result<NewBot, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Bot name is required".to_string()));
        }

        let status = match clean_text(&self.status) {
            Some(raw) => parse_status(&raw)?,
            None => BotStatus::default(),
        };

        Ok(NewBot {
            name: name.to_string(),
            developer_name: clean_text(&self.developer_name),
            version: clean_text(&self.version),
            description: clean_text(&self.description),
            status,
            deployment_hosts: parse_hosts(&self.deployment_hosts)?,
            image_url: None,
            archive_url: None,
            github_url: clean_text(&self.github_url),
            developer_site: clean_text(&self.developer_site),
        })
    }
}

impl BotPatchForm {
    pub fn validate(&self) -> Result<BotPatch, AppError> {
        let name = match &self.name {
            Some(raw) if raw.trim().is_empty() => {
                return Err(AppError::Validation("Bot name cannot be empty".to_string()))
            }
            Some(raw) => Some(raw.trim().to_string()),
            None => None,
        };

        let status = self.status.as_deref().map(parse_status).transpose()?;
        let deployment_hosts = self
            .deployment_hosts
            .as_deref()
            .map(parse_hosts)
            .transpose()?;

        Ok(BotPatch {
            name,
            developer_name: patch_text(&self.developer_name),
            version: patch_text(&self.version),
            description: patch_text(&self.description),
            status,
            deployment_hosts,
            image_url: self.remove_image.then_some(None),
            archive_url: self.remove_archive.then_some(None),
            github_url: patch_text(&self.github_url),
            developer_site: patch_text(&self.developer_site),
            expected_revision: self.expected_revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_closed() {
        assert_eq!(BotStatus::parse("Online"), Some(BotStatus::Online));
        assert_eq!(BotStatus::parse("maintenance"), Some(BotStatus::Maintenance));
        assert_eq!(BotStatus::parse("retired"), None);
    }

    #[test]
    fn test_hosts_deduplicate_and_reject_unknown() {
        let hosts = parse_hosts(&[
            "Render".to_string(),
            "vercel".to_string(),
            "Render".to_string(),
            "own hosting".to_string(),
        ])
        .unwrap();
        assert_eq!(
            hosts,
            vec![
                DeploymentHost::Render,
                DeploymentHost::Vercel,
                DeploymentHost::OwnHosting
            ]
        );

        let err = parse_hosts(&["Netlify".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_form_requires_name_and_defaults_offline() {
        let blank = BotForm {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));

        let form = BotForm {
            name: "  EchoBot ".to_string(),
            description: Some("".to_string()),
            ..Default::default()
        };
        let bot = form.validate().unwrap();
        assert_eq!(bot.name, "EchoBot");
        assert_eq!(bot.status, BotStatus::Offline);
        assert!(bot.description.is_none());
    }

    #[test]
    fn test_patch_keeps_absent_and_clears_blank() {
        let existing = Bot {
            bot_id: "b1".to_string(),
            name: "EchoBot".to_string(),
            developer_name: Some("Ada".to_string()),
            version: Some("1.0".to_string()),
            description: Some("echoes".to_string()),
            status: BotStatus::Offline,
            deployment_hosts: vec![DeploymentHost::Render],
            image_url: None,
            archive_url: None,
            github_url: Some("https://github.com/ada/echo".to_string()),
            developer_site: None,
            posted_by: "ada@example.com".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            revision: 1,
        };

        let patch = BotPatchForm {
            version: Some("2.0".to_string()),
            github_url: Some(" ".to_string()),
            status: Some("online".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();

        let merged = patch.apply(&existing);
        assert_eq!(merged.version.as_deref(), Some("2.0"));
        assert_eq!(merged.github_url, None);
        assert_eq!(merged.description.as_deref(), Some("echoes"));
        assert_eq!(merged.status, BotStatus::Online);
        assert_eq!(merged.posted_by, existing.posted_by);
    }

    #[test]
    fn test_forms_ignore_client_asset_urls() {
        let form: BotForm = serde_json::from_value(serde_json::json!({
            "name": "EvilBot",
            "imageUrl": "memory://assets/images/1_logo.png",
            "archiveUrl": "memory://assets/archives/1_bot.zip"
        }))
        .unwrap();
        let bot = form.validate().unwrap();
        assert!(bot.image_url.is_none());
        assert!(bot.archive_url.is_none());

        let patch: BotPatchForm = serde_json::from_value(serde_json::json!({
            "imageUrl": "memory://assets/images/1_logo.png",
            "removeArchive": true
        }))
        .unwrap();
        let patch = patch.validate().unwrap();
        assert_eq!(patch.image_url, None);
        assert_eq!(patch.archive_url, Some(None));
    }

    #[test]
    fn test_patch_rejects_invalid_status() {
        let patch = BotPatchForm {
            status: Some("sleeping".to_string()),
            ..Default::default()
        };
        assert!(matches!(patch.validate(), Err(AppError::Validation(_))));
    }
}
