use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::merge_style::MergeStyle;

/// A repository on disk plus its pull-request settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    pub id: i64,
    pub owner_id: i64,
    pub owner_name: String,
    pub name: String,
    /// Path to the (usually bare) repository
    pub path: PathBuf,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub settings: RepoSettings,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner_name, self.name)
    }
}

/// Per-repository pull request configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepoSettings {
    /// Detect pull requests merged by a plain push to the base branch
    pub autodetect_manual_merge: bool,
    pub allowed_merge_styles: Vec<MergeStyle>,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            autodetect_manual_merge: false,
            allowed_merge_styles: MergeStyle::ALL.to_vec(),
        }
    }
}

impl RepoSettings {
    pub fn is_style_allowed(&self, style: MergeStyle) -> bool {
        self.allowed_merge_styles.contains(&style)
    }
}

/// An account that can author, review and merge pull requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// GPG key id used to sign commits created on this user's behalf
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

/// Access level of a user on the base repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    None,
    Read,
    Write,
    Admin,
}

/// Resolved capability of one user on one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permission {
    pub access: AccessMode,
}

impl Permission {
    pub fn new(access: AccessMode) -> Self {
        Self { access }
    }

    pub fn can_write(&self) -> bool {
        self.access >= AccessMode::Write
    }

    pub fn is_admin(&self) -> bool {
        self.access == AccessMode::Admin
    }
}
