//! Geofence Workflow Engine
//!
//! Enforces ordered multi-step workflows over geofence transitions: an
//! incoming event must satisfy the *next expected* step of a workflow,
//! and only after that step's cooldown has elapsed. Out-of-order or
//! too-frequent triggers produce violations and never advance the step
//! pointer silently.

mod engine;
mod model;

pub use engine::WorkflowEngine;
pub use model::{
    ViolationReason, Workflow, WorkflowError, WorkflowEvent, WorkflowState, WorkflowStatus,
    WorkflowStep,
};
