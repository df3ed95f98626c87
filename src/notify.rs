//! Domain events emitted by the pipeline
//!
//! Notification is fire-and-forget: a notifier must not fail the operation
//! that produced the event, so [`Notifier::notify`] returns nothing.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::models::MergeStyle;

/// Event about a pull request, carrying commit ids and the acting user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PullRequestEvent {
    /// The pull request landed, through the executor or a detected manual merge
    Merged {
        pr_id: i64,
        repo_id: i64,
        base_branch: String,
        merged_commit_id: String,
        style: MergeStyle,
        doer_id: i64,
    },
    /// New commits were pushed to the head branch
    Synchronized {
        pr_id: i64,
        before: String,
        after: String,
        doer_id: i64,
    },
    TargetBranchChanged {
        pr_id: i64,
        old_branch: String,
        new_branch: String,
        doer_id: i64,
    },
}

impl PullRequestEvent {
    pub fn pr_id(&self) -> i64 {
        match self {
            PullRequestEvent::Merged { pr_id, .. }
            | PullRequestEvent::Synchronized { pr_id, .. }
            | PullRequestEvent::TargetBranchChanged { pr_id, .. } => *pr_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PullRequestEvent::Merged { .. } => "merged",
            PullRequestEvent::Synchronized { .. } => "synchronized",
            PullRequestEvent::TargetBranchChanged { .. } => "target_branch_changed",
        }
    }
}

/// Consumer of pull request events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &PullRequestEvent);
}

/// Writes every event to the log as JSON.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &PullRequestEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(event = event.name(), pr_id = event.pr_id(), %payload, "pull request event");
    }
}

/// Forwards events into a channel. A disconnected receiver is ignored.
pub struct ChannelNotifier {
    sender: Mutex<Sender<PullRequestEvent>>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<PullRequestEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &PullRequestEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_notifier_forwards() {
        let (tx, rx) = mpsc::channel();
        let notifier = ChannelNotifier::new(tx);
        let event = PullRequestEvent::Synchronized {
            pr_id: 4,
            before: "a".to_string(),
            after: "b".to_string(),
            doer_id: 1,
        };
        notifier.notify(&event);
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = PullRequestEvent::TargetBranchChanged {
            pr_id: 2,
            old_branch: "main".to_string(),
            new_branch: "dev".to_string(),
            doer_id: 9,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "target_branch_changed");
        assert_eq!(json["new_branch"], "dev");
        assert_eq!(event.pr_id(), 2);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelNotifier::new(tx).notify(&PullRequestEvent::Merged {
            pr_id: 1,
            repo_id: 1,
            base_branch: "main".to_string(),
            merged_commit_id: "abc".to_string(),
            style: MergeStyle::Merge,
            doer_id: 1,
        });
    }
}
