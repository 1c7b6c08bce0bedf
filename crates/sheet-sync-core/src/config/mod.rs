//! Client sync configuration.
//!
//! Provides `SyncConfig`, loaded from a JSON file and then overridden by
//! environment variables, used by the CLI and any embedding client.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Role;
use crate::util::normalize_text_option;

pub const ENV_EDITOR: &str = "SHEET_SYNC_EDITOR";
pub const ENV_ROLE: &str = "SHEET_SYNC_ROLE";
pub const ENV_RESUBMIT: &str = "SHEET_SYNC_RESUBMIT";

const DEFAULT_EDITOR: &str = "player";
const DEFAULT_HISTORY_LIMIT: usize = 200;

/// How a "keep my change" resolution is sent back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResubmitPolicy {
    /// Unconditional write; last writer wins
    #[default]
    Override,
    /// Conditional on the conflicting version, so a third concurrent writer
    /// produces a fresh conflict instead of being overwritten
    Chained,
}

impl FromStr for ResubmitPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "override" => Ok(Self::Override),
            "chained" => Ok(Self::Chained),
            other => Err(Error::Config(format!(
                "unknown resubmit policy '{other}' (expected override or chained)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Name this client edits under; the server echoes it back on
    /// confirmed updates
    #[serde(default = "default_editor")]
    pub editor: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub resubmit_policy: ResubmitPolicy,
    /// Applied edits kept per open sheet
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Send the current sheet version with each edit so the server can
    /// refuse writes to fields that changed underneath
    #[serde(default = "default_true")]
    pub send_expected_version: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            editor: default_editor(),
            role: Role::default(),
            resubmit_policy: ResubmitPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            send_expected_version: true,
        }
    }
}

fn default_editor() -> String {
    DEFAULT_EDITOR.to_string()
}

const fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

const fn default_true() -> bool {
    true
}

impl SyncConfig {
    pub fn for_editor(editor: impl Into<String>, role: Role) -> Self {
        Self {
            editor: editor.into(),
            role,
            ..Self::default()
        }
    }

    /// Load config from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|error| {
            Error::Config(format!("Failed to parse config at {}: {error}", path.display()))
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config = serde_json::from_str::<Self>(raw)?;
        config.normalize()?;
        Ok(config)
    }

    /// Apply `SHEET_SYNC_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(editor) = normalize_text_option(lookup(ENV_EDITOR)) {
            self.editor = editor;
        }
        if let Some(role) = normalize_text_option(lookup(ENV_ROLE)) {
            self.role = role.parse()?;
        }
        if let Some(policy) = normalize_text_option(lookup(ENV_RESUBMIT)) {
            self.resubmit_policy = policy.parse()?;
        }
        self.normalize()?;
        Ok(self)
    }

    fn normalize(&mut self) -> Result<()> {
        self.editor = normalize_text_option(Some(std::mem::take(&mut self.editor)))
            .ok_or_else(|| Error::Config("editor must not be empty".to_string()))?;
        Ok(())
    }
}
