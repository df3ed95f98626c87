use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// Protection rule for one or more branches of a repository.
///
/// `rule_name` is either an exact branch name or a glob (`release/*`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProtectedBranch {
    pub id: i64,
    pub repo_id: i64,
    pub rule_name: String,

    pub enable_merge_whitelist: bool,
    pub merge_whitelist_user_ids: Vec<i64>,

    pub enable_status_check: bool,
    /// Glob patterns; every one must be matched by a successful status
    pub status_check_contexts: Vec<String>,

    pub required_approvals: u32,
    pub enable_approvals_whitelist: bool,
    pub approvals_whitelist_user_ids: Vec<i64>,
    pub dismiss_stale_approvals: bool,

    pub block_on_rejected_reviews: bool,
    pub block_on_outdated_branch: bool,
    pub block_on_unresolved_conversations: bool,

    pub require_signed_commits: bool,
    /// Semicolon-separated glob list in the UI; stored split
    pub protected_file_patterns: Vec<String>,
}

/// Case-insensitive, `/`-aware glob options used for file and branch rules.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

impl ProtectedBranch {
    pub fn new(repo_id: i64, rule_name: impl Into<String>) -> Self {
        Self {
            repo_id,
            rule_name: rule_name.into(),
            ..Default::default()
        }
    }

    /// Does this rule apply to `branch`?
    pub fn matches(&self, branch: &str) -> bool {
        if self.rule_name == branch {
            return true;
        }
        Pattern::new(&self.rule_name)
            .map(|p| p.matches_with(branch, match_options()))
            .unwrap_or(false)
    }

    /// Exact-name rules win over glob rules.
    pub fn is_exact(&self) -> bool {
        !self.rule_name.contains(['*', '?', '['])
    }

    fn file_patterns(&self) -> Vec<Pattern> {
        self.protected_file_patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter_map(|p| Pattern::new(p).ok())
            .collect()
    }

    /// Subset of `files` that match a protected file pattern.
    pub fn protected_files<'a>(&self, files: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let patterns = self.file_patterns();
        if patterns.is_empty() {
            return Vec::new();
        }
        files
            .into_iter()
            .filter(|f| patterns.iter().any(|p| p.matches_with(f, match_options())))
            .map(str::to_string)
            .collect()
    }

    pub fn can_user_merge(&self, user_id: i64) -> bool {
        !self.enable_merge_whitelist || self.merge_whitelist_user_ids.contains(&user_id)
    }

    /// Whether an approval from `user_id` counts towards `required_approvals`.
    pub fn is_approver(&self, user_id: i64) -> bool {
        !self.enable_approvals_whitelist || self.approvals_whitelist_user_ids.contains(&user_id)
    }
}

/// Pick the rule that applies to `branch`: an exact-name rule first, else
/// the first matching glob.
pub fn rule_for_branch<'a>(
    rules: impl IntoIterator<Item = &'a ProtectedBranch>,
    branch: &str,
) -> Option<&'a ProtectedBranch> {
    let mut glob_match = None;
    for rule in rules {
        if rule.is_exact() {
            if rule.rule_name == branch {
                return Some(rule);
            }
        } else if glob_match.is_none() && rule.matches(branch) {
            glob_match = Some(rule);
        }
    }
    glob_match
}

/// True when `context` matches the required status-check pattern.
pub fn context_matches(pattern: &str, context: &str) -> bool {
    if pattern == context {
        return true;
    }
    Pattern::new(pattern)
        .map(|p| p.matches(context))
        .unwrap_or(false)
}
