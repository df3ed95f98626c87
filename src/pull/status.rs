//! Status aggregation for the head commit of a pull request

use std::collections::HashMap;

use super::MergeService;
use crate::error::Result;
use crate::models::protected_branch::context_matches;
use crate::models::{CommitStatus, CommitStatusState};

/// Latest report per context, ordered by context name.
pub fn latest_per_context<'a>(statuses: &[&'a CommitStatus]) -> Vec<&'a CommitStatus> {
    let mut latest: HashMap<&str, &'a CommitStatus> = HashMap::new();
    for &status in statuses {
        latest
            .entry(status.context.as_str())
            .and_modify(|current| {
                if status.index > current.index {
                    *current = status;
                }
            })
            .or_insert(status);
    }
    let mut out: Vec<&CommitStatus> = latest.into_values().collect();
    out.sort_by(|a, b| a.context.cmp(&b.context));
    out
}

/// Combine latest statuses into one verdict.
///
/// Without required contexts the worst state wins (`Success` when there are
/// no statuses). With required contexts every pattern must be matched; an
/// unmatched pattern counts as `Pending`.
pub fn merge_required_contexts(latest: &[&CommitStatus], required: &[String]) -> CommitStatusState {
    if required.is_empty() {
        return latest
            .iter()
            .map(|s| s.state)
            .fold(CommitStatusState::Success, CommitStatusState::worst);
    }

    let mut verdict = CommitStatusState::Success;
    for pattern in required {
        let matched = latest
            .iter()
            .filter(|s| context_matches(pattern, &s.context))
            .map(|s| s.state)
            .reduce(CommitStatusState::worst)
            .unwrap_or(CommitStatusState::Pending);
        verdict = verdict.worst(matched);
    }
    verdict
}

impl MergeService {
    /// Aggregated status of the pull request's current head commit.
    pub fn commit_status_state(&self, pr_id: i64) -> Result<CommitStatusState> {
        let ctx = self.load_context(pr_id)?;
        let head = self.head_commit_id(&ctx)?;
        let required = ctx
            .rule
            .as_ref()
            .filter(|r| r.enable_status_check)
            .map(|r| r.status_check_contexts.clone())
            .unwrap_or_default();

        self.store.view(|data| {
            let statuses = data.commit_statuses(ctx.pr.base_repo_id, &head);
            let latest = latest_per_context(&statuses);
            Ok(merge_required_contexts(&latest, &required))
        })
    }

    /// True when the base branch does not require status checks, or they pass.
    pub fn is_commit_status_pass(&self, pr_id: i64) -> Result<bool> {
        let ctx = self.load_context(pr_id)?;
        match &ctx.rule {
            Some(rule) if rule.enable_status_check => {
                Ok(self.commit_status_state(pr_id)?.is_success())
            }
            _ => Ok(true),
        }
    }
}
