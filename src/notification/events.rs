use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MissionCreated,
    MissionPlanned,
    MissionApproved,
    MissionStarted,
    MissionCheckpoint,
    MissionResumed,
    MissionPaused,
    MissionCompleted,
    MissionFailed,
    MissionAborted,
    ObjectiveStarted,
    ObjectiveCompleted,
    ObjectiveFailed,
    MergeConflict,
    ReviewCompleted,
    PrCreated,
    HealthAlert,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissionCreated => "mission.created",
            Self::MissionPlanned => "mission.planned",
            Self::MissionApproved => "mission.approved",
            Self::MissionStarted => "mission.started",
            Self::MissionCheckpoint => "mission.checkpoint",
            Self::MissionResumed => "mission.resumed",
            Self::MissionPaused => "mission.paused",
            Self::MissionCompleted => "mission.completed",
            Self::MissionFailed => "mission.failed",
            Self::MissionAborted => "mission.aborted",
            Self::ObjectiveStarted => "objective.started",
            Self::ObjectiveCompleted => "objective.completed",
            Self::ObjectiveFailed => "objective.failed",
            Self::MergeConflict => "merge.conflict",
            Self::ReviewCompleted => "review.completed",
            Self::PrCreated => "pr.created",
            Self::HealthAlert => "health.alert",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::MissionFailed | Self::ObjectiveFailed | Self::MergeConflict | Self::HealthAlert
        )
    }

    pub fn is_mission_level(&self) -> bool {
        self.as_str().starts_with("mission.")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionEvent {
    pub event_type: EventType,
    pub mission_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MissionEvent {
    pub fn new(event_type: EventType, mission_id: impl Into<String>) -> Self {
        Self {
            event_type,
            mission_id: mission_id.into(),
            created_at: Utc::now(),
            objective_id: None,
            message: None,
        }
    }

    pub fn with_objective(mut self, objective_id: impl Into<String>) -> Self {
        self.objective_id = Some(objective_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn summary(&self) -> String {
        let mut s = self.event_type.as_str().to_string();
        if let Some(objective) = &self.objective_id {
            s.push_str(&format!(" [{}]", objective));
        }
        if let Some(message) = &self.message {
            s.push_str(": ");
            s.push_str(message);
        }
        s
    }
}
