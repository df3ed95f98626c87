use super::types::PullRequestStatus;

impl PullRequestStatus {
    /// Statuses that end the lifecycle; nothing leaves them.
    pub fn is_merged_terminal(&self) -> bool {
        matches!(
            self,
            PullRequestStatus::Merged | PullRequestStatus::ManuallyMerged
        )
    }

    /// Final outcomes of a mergeability check.
    pub fn is_check_verdict(&self) -> bool {
        matches!(
            self,
            PullRequestStatus::Mergeable
                | PullRequestStatus::Conflict
                | PullRequestStatus::Error
                | PullRequestStatus::Empty
                | PullRequestStatus::Ancestor
        )
    }

    /// Check if transitioning from the current status to `new_status` is valid.
    ///
    /// Same status is always valid (no-op).
    pub fn can_transition_to(&self, new_status: &PullRequestStatus) -> bool {
        if self == new_status {
            return true;
        }

        match self {
            PullRequestStatus::Checking => true,
            PullRequestStatus::Mergeable
            | PullRequestStatus::Conflict
            | PullRequestStatus::Error
            | PullRequestStatus::Empty
            | PullRequestStatus::Ancestor => matches!(
                new_status,
                PullRequestStatus::Checking
                    | PullRequestStatus::Merged
                    | PullRequestStatus::ManuallyMerged
            ),
            PullRequestStatus::Merged | PullRequestStatus::ManuallyMerged => false,
        }
    }

    /// Returns the list of valid statuses this status can transition to.
    pub fn valid_transitions(&self) -> Vec<PullRequestStatus> {
        match self {
            PullRequestStatus::Checking => vec![
                PullRequestStatus::Mergeable,
                PullRequestStatus::Conflict,
                PullRequestStatus::Error,
                PullRequestStatus::Empty,
                PullRequestStatus::Ancestor,
                PullRequestStatus::ManuallyMerged,
                PullRequestStatus::Merged,
            ],
            PullRequestStatus::Mergeable
            | PullRequestStatus::Conflict
            | PullRequestStatus::Error
            | PullRequestStatus::Empty
            | PullRequestStatus::Ancestor => vec![
                PullRequestStatus::Checking,
                PullRequestStatus::Merged,
                PullRequestStatus::ManuallyMerged,
            ],
            PullRequestStatus::Merged | PullRequestStatus::ManuallyMerged => vec![],
        }
    }
}
