//! Workflow Enforcement Engine

use crate::{
    ViolationReason, Workflow, WorkflowError, WorkflowEvent, WorkflowState, WorkflowStatus,
};
use polygon_geofence::GeofenceTransition;
use std::collections::HashMap;
use tracing::{debug, info, warn};

struct WorkflowEntry {
    definition: Workflow,
    state: WorkflowState,
}

/// Tracks progress for every registered workflow against the stream of
/// geofence transitions.
pub struct WorkflowEngine {
    workflows: HashMap<String, WorkflowEntry>,
    /// Paused engines keep their definitions and progress but ignore events
    running: bool,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
            running: true,
        }
    }

    /// Register or replace a workflow. Replacement starts from a fresh
    /// state.
    pub fn register(&mut self, workflow: Workflow) {
        info!(
            "Registered workflow {} ({} steps)",
            workflow.id,
            workflow.steps.len()
        );
        self.workflows.insert(
            workflow.id.clone(),
            WorkflowEntry {
                definition: workflow,
                state: WorkflowState::default(),
            },
        );
    }

    /// Remove a workflow entirely.
    pub fn remove(&mut self, id: &str) -> Result<(), WorkflowError> {
        self.workflows
            .remove(id)
            .map(|_| info!("Removed workflow {}", id))
            .ok_or_else(|| WorkflowError::UnknownWorkflow(id.to_string()))
    }

    /// Progress snapshot for one workflow.
    pub fn state(&self, id: &str) -> Option<&WorkflowState> {
        self.workflows.get(id).map(|e| &e.state)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause processing without discarding definitions or progress.
    pub fn stop_workflows(&mut self) {
        info!("Workflow processing paused");
        self.running = false;
    }

    /// Resume a paused engine.
    pub fn resume_workflows(&mut self) {
        info!("Workflow processing resumed");
        self.running = true;
    }

    /// Reset progress for every workflow, keeping definitions registered.
    /// Satisfaction timestamps survive so per-step cooldowns keep
    /// rate-limiting across runs.
    pub fn clear_workflows(&mut self) {
        for entry in self.workflows.values_mut() {
            entry.state.current_step = 0;
            entry.state.status = WorkflowStatus::Pending;
        }
        debug!("Workflow progress cleared");
    }

    /// Full teardown hook: progress and cooldown history both forgotten.
    pub fn reset(&mut self) {
        for entry in self.workflows.values_mut() {
            entry.state = WorkflowState::default();
        }
        self.running = true;
        debug!("Workflow engine reset");
    }

    /// Feed one geofence transition to every unfinished workflow.
    pub fn handle_transition(&mut self, transition: &GeofenceTransition) -> Vec<WorkflowEvent> {
        if !self.running {
            return Vec::new();
        }

        let mut events = Vec::new();
        for entry in self.workflows.values_mut() {
            if entry.state.status == WorkflowStatus::Completed {
                continue;
            }
            if let Some(event) = advance(entry, transition) {
                events.push(event);
            }
        }
        events
    }
}

fn advance(entry: &mut WorkflowEntry, transition: &GeofenceTransition) -> Option<WorkflowEvent> {
    let workflow_id = entry.definition.id.clone();
    let next = entry.definition.steps.get(entry.state.current_step)?;

    let matches_next =
        next.geofence_id == transition.polygon_id && next.action == transition.action;

    if matches_next {
        // Cooldown is keyed per step and survives progress resets
        if let Some(last) = entry.state.last_satisfied.get(&next.id) {
            let elapsed_ms = (transition.timestamp - *last).num_milliseconds();
            if elapsed_ms < 0 || (elapsed_ms as u128) < next.cooldown.as_millis() {
                warn!(
                    "Workflow {} step {} re-triggered inside cooldown",
                    workflow_id, next.id
                );
                entry.state.status = WorkflowStatus::Violation;
                return Some(WorkflowEvent::Violation {
                    workflow_id,
                    step_id: next.id.clone(),
                    reason: ViolationReason::CooldownActive,
                });
            }
        }

        let step_id = next.id.clone();
        let step_index = entry.state.current_step;
        entry
            .state
            .last_satisfied
            .insert(step_id.clone(), transition.timestamp);
        entry.state.current_step += 1;

        if entry.state.current_step >= entry.definition.steps.len() {
            info!("Workflow {} completed", workflow_id);
            entry.state.status = WorkflowStatus::Completed;
            return Some(WorkflowEvent::Completed { workflow_id });
        }
        debug!("Workflow {} advanced past step {}", workflow_id, step_id);
        entry.state.status = WorkflowStatus::InProgress;
        return Some(WorkflowEvent::Progress {
            workflow_id,
            step_id,
            step_index,
        });
    }

    // Not the expected step: any other step of this workflow matching the
    // event is an out-of-order trigger
    let out_of_order = entry
        .definition
        .steps
        .iter()
        .find(|s| s.geofence_id == transition.polygon_id && s.action == transition.action);
    if let Some(step) = out_of_order {
        warn!(
            "Workflow {} received step {} out of order (expected {})",
            workflow_id, step.id, next.id
        );
        entry.state.status = WorkflowStatus::Violation;
        return Some(WorkflowEvent::Violation {
            workflow_id,
            step_id: step.id.clone(),
            reason: ViolationReason::OutOfOrder,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowStep;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use geo_kernel::Coordinate;
    use location_events::LocationSample;
    use polygon_geofence::GeofenceAction;
    use std::time::Duration;

    fn transition_at(geofence: &str, action: GeofenceAction, secs: i64) -> GeofenceTransition {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let timestamp = base + ChronoDuration::seconds(secs);
        let coord = Coordinate::new(37.0, -122.0, 5.0).unwrap();
        GeofenceTransition {
            polygon_id: geofence.to_string(),
            action,
            sample: LocationSample::new(coord, timestamp),
            timestamp,
        }
    }

    fn delivery_workflow() -> Workflow {
        Workflow::new(
            "delivery",
            vec![
                WorkflowStep::new("pickup", "depot", GeofenceAction::Enter)
                    .with_cooldown(Duration::from_secs(300)),
                WorkflowStep::new("leave", "depot", GeofenceAction::Exit),
                WorkflowStep::new("dropoff", "customer", GeofenceAction::Enter),
            ],
        )
        .unwrap()
    }

    fn engine_with_delivery() -> WorkflowEngine {
        let mut eng = WorkflowEngine::new();
        eng.register(delivery_workflow());
        eng
    }

    #[test]
    fn test_in_order_run_completes_without_violations() {
        let mut eng = engine_with_delivery();

        let e1 = eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 0));
        assert!(matches!(
            e1.as_slice(),
            [WorkflowEvent::Progress { step_index: 0, .. }]
        ));

        let e2 = eng.handle_transition(&transition_at("depot", GeofenceAction::Exit, 60));
        assert!(matches!(
            e2.as_slice(),
            [WorkflowEvent::Progress { step_index: 1, .. }]
        ));

        let e3 = eng.handle_transition(&transition_at("customer", GeofenceAction::Enter, 120));
        assert!(matches!(e3.as_slice(), [WorkflowEvent::Completed { .. }]));
        assert_eq!(
            eng.state("delivery").unwrap().status,
            WorkflowStatus::Completed
        );
    }

    #[test]
    fn test_out_of_order_step_violates() {
        let mut eng = engine_with_delivery();

        // Step 3's event before step 1
        let events = eng.handle_transition(&transition_at("customer", GeofenceAction::Enter, 0));
        assert!(matches!(
            events.as_slice(),
            [WorkflowEvent::Violation {
                reason: ViolationReason::OutOfOrder,
                ..
            }]
        ));
        // The pointer did not advance
        assert_eq!(eng.state("delivery").unwrap().current_step, 0);
    }

    #[test]
    fn test_cooldown_violation_on_rerun() {
        let mut eng = engine_with_delivery();

        eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 0));
        eng.handle_transition(&transition_at("depot", GeofenceAction::Exit, 60));
        eng.handle_transition(&transition_at("customer", GeofenceAction::Enter, 120));

        // New run, same definitions
        eng.clear_workflows();
        assert_eq!(
            eng.state("delivery").unwrap().status,
            WorkflowStatus::Pending
        );

        // Step 1 again 100 s after its last satisfaction: inside the 300 s cooldown
        let events = eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 100));
        assert!(matches!(
            events.as_slice(),
            [WorkflowEvent::Violation {
                reason: ViolationReason::CooldownActive,
                ..
            }]
        ));

        // After the cooldown the rerun proceeds
        let events = eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 400));
        assert!(matches!(
            events.as_slice(),
            [WorkflowEvent::Progress { step_index: 0, .. }]
        ));
    }

    #[test]
    fn test_completed_workflow_ignores_events() {
        let mut eng = engine_with_delivery();
        eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 0));
        eng.handle_transition(&transition_at("depot", GeofenceAction::Exit, 60));
        eng.handle_transition(&transition_at("customer", GeofenceAction::Enter, 120));

        assert!(eng
            .handle_transition(&transition_at("customer", GeofenceAction::Enter, 600))
            .is_empty());
    }

    #[test]
    fn test_irrelevant_geofence_is_ignored() {
        let mut eng = engine_with_delivery();
        assert!(eng
            .handle_transition(&transition_at("elsewhere", GeofenceAction::Enter, 0))
            .is_empty());
        assert_eq!(
            eng.state("delivery").unwrap().status,
            WorkflowStatus::Pending
        );
    }

    #[test]
    fn test_paused_engine_drops_events() {
        let mut eng = engine_with_delivery();
        eng.stop_workflows();
        assert!(eng
            .handle_transition(&transition_at("depot", GeofenceAction::Enter, 0))
            .is_empty());

        eng.resume_workflows();
        assert_eq!(
            eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 60))
                .len(),
            1
        );
    }

    #[test]
    fn test_pause_preserves_progress() {
        let mut eng = engine_with_delivery();
        eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 0));
        eng.stop_workflows();
        eng.resume_workflows();
        assert_eq!(eng.state("delivery").unwrap().current_step, 1);
    }

    #[test]
    fn test_reset_forgets_cooldown_history() {
        let mut eng = engine_with_delivery();
        eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 0));
        eng.reset();

        // Inside what would have been the cooldown window, but history is gone
        let events = eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 100));
        assert!(matches!(
            events.as_slice(),
            [WorkflowEvent::Progress { .. }]
        ));
    }

    #[test]
    fn test_two_workflows_progress_independently() {
        let mut eng = engine_with_delivery();
        eng.register(
            Workflow::new(
                "patrol",
                vec![WorkflowStep::new("gate", "depot", GeofenceAction::Enter)],
            )
            .unwrap(),
        );

        let events = eng.handle_transition(&transition_at("depot", GeofenceAction::Enter, 0));
        // Delivery progresses, patrol completes
        assert_eq!(events.len(), 2);
        assert_eq!(
            eng.state("patrol").unwrap().status,
            WorkflowStatus::Completed
        );
        assert_eq!(
            eng.state("delivery").unwrap().status,
            WorkflowStatus::InProgress
        );
    }
}
