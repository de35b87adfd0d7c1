//! User configuration for marginalia.
//!
//! Read from `$XDG_CONFIG_HOME/marginalia/config.toml` (or
//! `~/.config/marginalia/config.toml`). Every field has a default, and a
//! missing or malformed file is a soft failure: the problem is logged and
//! defaults are used.

use std::path::{Path, PathBuf};

use marginalia_core::{CommentPermission, LayoutMetrics, User};
use serde::Deserialize;
use tracing::warn;

/// Returns the path to the marginalia config file.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("marginalia").join("config.toml")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: String,
    pub db_path: PathBuf,
    /// Who may write comments.
    pub comment_permission: CommentPermission,
    /// Who may see comments.
    pub view_permission: CommentPermission,
    /// Organisation owning the docs, for `team` permissions.
    pub repo_owner: String,
    pub user: UserConfig,
    /// Delete rows on resolve instead of flagging them.
    pub delete_on_resolve: bool,
    /// Open the sidebar when a page loads.
    pub auto_show_comments: bool,
    pub layout: LayoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "catppuccin-mocha".to_owned(),
            db_path: PathBuf::from(".marginalia/comments.db"),
            comment_permission: CommentPermission::Anon,
            view_permission: CommentPermission::Anon,
            repo_owner: String::new(),
            user: UserConfig::default(),
            delete_on_resolve: false,
            auto_show_comments: true,
            layout: LayoutConfig::default(),
        }
    }
}

/// The signed-in reader. An empty name means nobody is signed in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub orgs: Vec<String>,
}

/// Card placement in terminal rows.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Height assumed for a card before it is first drawn.
    pub card_height: u16,
    pub spacing: u16,
    /// Rows a card is pulled above its anchor line.
    pub offset: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            card_height: 5,
            spacing: 1,
            offset: 0,
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults on any error.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return Self::default(),
        };
        Self::parse(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "config parse error, using defaults");
            Self::default()
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn user(&self) -> Option<User> {
        let name = self.user.name.trim();
        if name.is_empty() {
            return None;
        }
        Some(User {
            name: name.to_owned(),
            orgs: self.user.orgs.clone(),
        })
    }

    pub fn metrics(&self) -> LayoutMetrics {
        LayoutMetrics {
            offset: f64::from(self.layout.offset),
            spacing: f64::from(self.layout.spacing),
            fallback_height: f64::from(self.layout.card_height.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.theme, "catppuccin-mocha");
        assert_eq!(config.db_path, PathBuf::from(".marginalia/comments.db"));
        assert_eq!(config.comment_permission, CommentPermission::Anon);
        assert!(config.auto_show_comments);
        assert!(config.user().is_none());
        assert_eq!(config.metrics().fallback_height, 5.0);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            comment_permission = "team"
            repo_owner = "acme"
            delete_on_resolve = true

            [user]
            name = "ada"
            orgs = ["Acme"]

            [layout]
            spacing = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.comment_permission, CommentPermission::Team);
        assert_eq!(config.view_permission, CommentPermission::Anon);
        assert!(config.delete_on_resolve);
        let user = config.user().unwrap();
        assert!(user.is_in_org("acme"));
        let metrics = config.metrics();
        assert_eq!(metrics.spacing, 2.0);
        assert_eq!(metrics.offset, 0.0);
        assert_eq!(metrics.fallback_height, 5.0);
    }

    #[test]
    fn unknown_permission_level_is_an_error() {
        assert!(Config::parse(r#"comment_permission = "admins""#).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/marginalia/config.toml"));
        assert_eq!(config.theme, "catppuccin-mocha");
    }
}
