//! Workflow Model

use chrono::{DateTime, Utc};
use polygon_geofence::GeofenceAction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Workflow registry errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("workflow {0} has no steps")]
    EmptyWorkflow(String),

    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),
}

/// One required geofence interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    /// The geofence this step watches
    pub geofence_id: String,
    /// The transition kind that satisfies the step
    pub action: GeofenceAction,
    /// Minimum spacing between satisfactions of this step
    pub cooldown: Duration,
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        geofence_id: impl Into<String>,
        action: GeofenceAction,
    ) -> Self {
        Self {
            id: id.into(),
            geofence_id: geofence_id.into(),
            action,
            cooldown: Duration::ZERO,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// An ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, steps: Vec<WorkflowStep>) -> Result<Self, WorkflowError> {
        let id = id.into();
        if steps.is_empty() {
            return Err(WorkflowError::EmptyWorkflow(id));
        }
        Ok(Self { id, steps })
    }
}

/// Where a workflow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    /// No step satisfied yet
    Pending,
    /// At least one step satisfied, more remain
    InProgress,
    /// The most recent relevant event violated the sequence
    Violation,
    /// Every step satisfied in order
    Completed,
}

/// Mutable progress for one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Index of the next expected step
    pub current_step: usize,
    /// Last satisfaction time per step id; survives progress resets so
    /// cooldowns rate-limit across runs
    pub last_satisfied: HashMap<String, DateTime<Utc>>,
    pub status: WorkflowStatus,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            current_step: 0,
            last_satisfied: HashMap::new(),
            status: WorkflowStatus::Pending,
        }
    }
}

/// Why an event was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationReason {
    /// The event matched a step that is not next in sequence
    OutOfOrder,
    /// The event matched the next step inside its cooldown window
    CooldownActive,
}

/// Engine notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    Progress {
        workflow_id: String,
        step_id: String,
        /// Index of the satisfied step
        step_index: usize,
    },
    Completed {
        workflow_id: String,
    },
    Violation {
        workflow_id: String,
        step_id: String,
        reason: ViolationReason,
    },
}
