use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Planning,
    PendingApproval,
    InProgress,
    CheckpointPaused,
    Merging,
    Review,
    Completed,
    Failed,
    Aborted,
    /// A safety limit was hit; requires explicit operator action.
    Paused,
}

impl MissionStatus {
    pub fn allowed_transitions(&self) -> &'static [MissionStatus] {
        use MissionStatus::*;
        match self {
            Planning => &[PendingApproval, Failed, Aborted],
            PendingApproval => &[InProgress, Failed, Aborted],
            InProgress => &[CheckpointPaused, Merging, Paused, Failed, Aborted],
            CheckpointPaused => &[InProgress, Failed, Aborted],
            Merging => &[Review, Failed, Aborted],
            Review => &[Completed, Failed, Aborted],
            Paused => &[InProgress, Aborted],
            Completed | Failed | Aborted => &[],
        }
    }

    pub fn can_transition_to(&self, target: MissionStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Planning | Self::PendingApproval | Self::InProgress | Self::Merging
        )
    }

    /// States `resume` accepts. The safety-limit `Paused` state is not
    /// resumable through the checkpoint path; it requires raised limits.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::CheckpointPaused | Self::PendingApproval)
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::PendingApproval => "pending_approval",
            Self::InProgress => "in_progress",
            Self::CheckpointPaused => "checkpoint_paused",
            Self::Merging => "merging",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Paused => "paused",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    #[default]
    Blocked,
    Ready,
    InProgress,
    Done,
    Failed,
    CheckpointPaused,
}

impl WorkItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Blocked => "blocked",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::CheckpointPaused => "checkpoint_paused",
        };
        write!(f, "{}", s)
    }
}
