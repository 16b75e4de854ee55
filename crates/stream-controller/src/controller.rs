//! Lifecycle Controller & Fan-Out

use crate::{EnrichmentPipeline, LocationBridge, LocusStreamConfig, PipelineVerdict};
use error_recovery::{LocusError, LocusErrorType, RecoveryDecision, RecoveryManager};
use geofence_workflow::{Workflow, WorkflowEngine, WorkflowError, WorkflowEvent};
use location_events::{LocationSample, LocusEvent};
use polygon_geofence::{GeofenceAction, GeofencePolygon, GeofenceTransition, PolygonError};
use privacy_zones::{PrivacyZone, ZoneError, ZoneEvent};
use serde_json::Value;
use spoof_detector::SpoofVerdict;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trip_tracker::{TripEvent, TripStore, TripSummary, TripTracker};
use uuid::Uuid;

/// Guarded by the lifecycle token: the bridge handle state
struct BridgeState {
    active: bool,
    pump: Option<JoinHandle<()>>,
}

/// Pipeline, state machines and recovery policy, driven synchronously per
/// event under one lock (single writer)
struct CoreState {
    pipeline: EnrichmentPipeline,
    trip: TripTracker,
    workflows: WorkflowEngine,
    recovery: RecoveryManager,
}

/// Outbound fan-out; `None` after a forced shutdown
struct Channels {
    events: broadcast::Sender<LocusEvent>,
    blocked: broadcast::Sender<(LocationSample, SpoofVerdict)>,
    zones: broadcast::Sender<ZoneEvent>,
    transitions: broadcast::Sender<GeofenceTransition>,
    trips: broadcast::Sender<TripEvent>,
    workflows: broadcast::Sender<WorkflowEvent>,
    errors: broadcast::Sender<LocusError>,
}

struct Shared {
    bridge: Arc<dyn LocationBridge>,
    /// Active primary subscriptions; the bridge runs while this is > 0
    subscribers: AtomicUsize,
    /// The single mutual-exclusion token serializing start/stop
    lifecycle: Mutex<BridgeState>,
    state: Mutex<CoreState>,
    channels: std::sync::Mutex<Option<Channels>>,
    /// Pending asynchronous teardown, awaited by [`LocusStream::quiesce`]
    teardown: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// A handle on the multiplexed enriched-event stream.
///
/// Dropping the handle alone does not release the underlying bridge;
/// return it through [`LocusStream::unsubscribe`].
pub struct LocusSubscription {
    receiver: broadcast::Receiver<LocusEvent>,
}

impl LocusSubscription {
    /// Next enriched event. Broadcast semantics: no replay for late
    /// joiners, and slow readers observe `Lagged`.
    pub async fn recv(&mut self) -> Result<LocusEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

/// The shared, reference-counted event source over the native bridge.
pub struct LocusStream {
    shared: Arc<Shared>,
}

impl LocusStream {
    /// Build the controller and attempt to resume a persisted trip.
    pub async fn new(
        bridge: Arc<dyn LocationBridge>,
        trip_store: Arc<dyn TripStore>,
        config: LocusStreamConfig,
    ) -> Self {
        let mut trip = TripTracker::new(config.trip.clone(), trip_store);
        trip.restore().await;

        let capacity = config.channel_capacity.max(1);
        let channels = Channels {
            events: broadcast::channel(capacity).0,
            blocked: broadcast::channel(capacity).0,
            zones: broadcast::channel(capacity).0,
            transitions: broadcast::channel(capacity).0,
            trips: broadcast::channel(capacity).0,
            workflows: broadcast::channel(capacity).0,
            errors: broadcast::channel(capacity).0,
        };

        Self {
            shared: Arc::new(Shared {
                bridge,
                subscribers: AtomicUsize::new(0),
                lifecycle: Mutex::new(BridgeState {
                    active: false,
                    pump: None,
                }),
                state: Mutex::new(CoreState {
                    pipeline: EnrichmentPipeline::new(config.spoof.clone(), config.obfuscation_seed),
                    trip,
                    workflows: WorkflowEngine::new(),
                    recovery: RecoveryManager::new(config.recovery.clone()),
                }),
                channels: std::sync::Mutex::new(Some(channels)),
                teardown: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Join the enriched event stream. The first subscriber starts the
    /// native bridge; the receiver is created before the start so no event
    /// is missed.
    pub async fn subscribe(&self) -> Result<LocusSubscription, LocusError> {
        let receiver = {
            let guard = lock_channels(&self.shared);
            let Some(channels) = guard.as_ref() else {
                return Err(closed_error());
            };
            channels.events.subscribe()
        };

        let prev = self.shared.subscribers.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            start_bridge(&self.shared).await;
        }
        debug!("Subscriber joined ({} total)", prev + 1);
        Ok(LocusSubscription { receiver })
    }

    /// Leave the stream. When the last subscriber leaves, the bridge is
    /// torn down asynchronously; the native subscription may outlive this
    /// call briefly.
    pub fn unsubscribe(&self, subscription: LocusSubscription) {
        drop(subscription);
        let prev = self.shared.subscribers.fetch_sub(1, Ordering::SeqCst);
        debug!("Subscriber left ({} remaining)", prev.saturating_sub(1));
        if prev == 1 {
            let shared = Arc::clone(&self.shared);
            let handle = tokio::spawn(async move {
                stop_bridge(&shared).await;
            });
            *lock_teardown(&self.shared) = Some(handle);
        }
    }

    /// Wait until any in-flight lifecycle operation has settled.
    pub async fn quiesce(&self) {
        let pending = lock_teardown(&self.shared).take();
        if let Some(handle) = pending {
            let _ = handle.await;
        }
        drop(self.shared.lifecycle.lock().await);
    }

    /// Forced teardown: bypasses the subscriber count, cancels the native
    /// subscription, resets every component's transient state, and closes
    /// all downstream channels. Further subscriptions fail.
    pub async fn shutdown(&self) {
        let stop_result = {
            let mut lifecycle = self.shared.lifecycle.lock().await;
            let result = if lifecycle.active {
                self.shared.bridge.stop().await
            } else {
                Ok(())
            };
            if let Some(pump) = lifecycle.pump.take() {
                pump.abort();
            }
            lifecycle.active = false;
            result
        };
        self.shared.subscribers.store(0, Ordering::SeqCst);

        if let Err(e) = stop_result {
            route_error(&self.shared, e).await;
        }

        {
            let mut state = self.shared.state.lock().await;
            state.pipeline.reset();
            state.trip.reset();
            state.workflows.reset();
            state.recovery.reset();
        }

        *lock_channels(&self.shared) = None;
        info!("Stream controller shut down");
    }

    /// Current primary subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.load(Ordering::SeqCst)
    }

    // ---- side channels ------------------------------------------------

    pub fn subscribe_blocked(
        &self,
    ) -> Result<broadcast::Receiver<(LocationSample, SpoofVerdict)>, LocusError> {
        self.side_channel(|ch| ch.blocked.subscribe())
    }

    pub fn subscribe_zone_events(&self) -> Result<broadcast::Receiver<ZoneEvent>, LocusError> {
        self.side_channel(|ch| ch.zones.subscribe())
    }

    pub fn subscribe_transitions(
        &self,
    ) -> Result<broadcast::Receiver<GeofenceTransition>, LocusError> {
        self.side_channel(|ch| ch.transitions.subscribe())
    }

    pub fn subscribe_trip_events(&self) -> Result<broadcast::Receiver<TripEvent>, LocusError> {
        self.side_channel(|ch| ch.trips.subscribe())
    }

    pub fn subscribe_workflow_events(
        &self,
    ) -> Result<broadcast::Receiver<WorkflowEvent>, LocusError> {
        self.side_channel(|ch| ch.workflows.subscribe())
    }

    pub fn subscribe_errors(&self) -> Result<broadcast::Receiver<LocusError>, LocusError> {
        self.side_channel(|ch| ch.errors.subscribe())
    }

    fn side_channel<T, F: FnOnce(&Channels) -> broadcast::Receiver<T>>(
        &self,
        f: F,
    ) -> Result<broadcast::Receiver<T>, LocusError> {
        let guard = lock_channels(&self.shared);
        guard.as_ref().map(f).ok_or_else(closed_error)
    }

    // ---- registries ----------------------------------------------------

    pub async fn add_privacy_zone(&self, zone: PrivacyZone) {
        let event = self.shared.state.lock().await.pipeline.upsert_zone(zone);
        emit(&self.shared, |ch| {
            let _ = ch.zones.send(event.clone());
        });
    }

    pub async fn remove_privacy_zone(&self, id: &str) -> Result<(), ZoneError> {
        let event = self.shared.state.lock().await.pipeline.remove_zone(id)?;
        emit(&self.shared, |ch| {
            let _ = ch.zones.send(event.clone());
        });
        Ok(())
    }

    pub async fn set_privacy_zone_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<(), ZoneError> {
        let event = self
            .shared
            .state
            .lock()
            .await
            .pipeline
            .set_zone_enabled(id, enabled)?;
        emit(&self.shared, |ch| {
            let _ = ch.zones.send(event.clone());
        });
        Ok(())
    }

    pub async fn add_polygon(&self, polygon: GeofencePolygon) {
        self.shared.state.lock().await.pipeline.add_polygon(polygon);
    }

    pub async fn remove_polygon(&self, id: &str) -> Result<(), PolygonError> {
        self.shared.state.lock().await.pipeline.remove_polygon(id)
    }

    /// Whether the last processed sample was inside the polygon.
    pub async fn polygon_inside(&self, id: &str) -> bool {
        self.shared.state.lock().await.pipeline.polygon_inside(id)
    }

    pub async fn register_workflow(&self, workflow: Workflow) {
        self.shared.state.lock().await.workflows.register(workflow);
    }

    pub async fn remove_workflow(&self, id: &str) -> Result<(), WorkflowError> {
        self.shared.state.lock().await.workflows.remove(id)
    }

    /// Reset workflow progress, keeping definitions.
    pub async fn clear_workflows(&self) {
        self.shared.state.lock().await.workflows.clear_workflows();
    }

    /// Pause workflow processing without discarding definitions.
    pub async fn stop_workflows(&self) {
        self.shared.state.lock().await.workflows.stop_workflows();
    }

    pub async fn resume_workflows(&self) {
        self.shared.state.lock().await.workflows.resume_workflows();
    }

    // ---- trips ---------------------------------------------------------

    /// Explicitly start a trip. Idempotent against an active trip.
    pub async fn start_trip(&self) -> Option<Uuid> {
        let event = self.shared.state.lock().await.trip.start().await?;
        let trip_id = match &event {
            TripEvent::Started { trip_id, .. } => Some(*trip_id),
            _ => None,
        };
        emit(&self.shared, |ch| {
            let _ = ch.trips.send(event.clone());
        });
        trip_id
    }

    /// Stop the active trip, emitting and returning its summary. `None`
    /// when no trip is underway.
    pub async fn stop_trip(&self) -> Option<TripSummary> {
        let summary = self.shared.state.lock().await.trip.stop().await?;
        emit(&self.shared, |ch| {
            let _ = ch.trips.send(TripEvent::Stopped {
                summary: summary.clone(),
            });
        });
        Some(summary)
    }
}

fn closed_error() -> LocusError {
    LocusError::new(
        LocusErrorType::ServiceDisconnected,
        "event stream has been shut down",
    )
}

fn lock_channels(shared: &Shared) -> std::sync::MutexGuard<'_, Option<Channels>> {
    shared
        .channels
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_teardown(shared: &Shared) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    shared
        .teardown
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit<F: FnOnce(&Channels)>(shared: &Shared, f: F) {
    let guard = lock_channels(shared);
    if let Some(channels) = guard.as_ref() {
        f(channels);
    }
}

/// Start the bridge under the lifecycle token. Re-checks the subscriber
/// count after acquiring the token: a teardown that won the token first
/// may have already made this start moot, and vice versa.
async fn start_bridge(shared: &Arc<Shared>) {
    let mut lifecycle = shared.lifecycle.lock().await;
    if shared.subscribers.load(Ordering::SeqCst) == 0 {
        debug!("Start skipped: subscribers left while waiting for the token");
        return;
    }
    if lifecycle.active {
        debug!("Start skipped: bridge already active");
        return;
    }

    match shared.bridge.start().await {
        Ok(rx) => {
            lifecycle.active = true;
            lifecycle.pump = Some(tokio::spawn(pump(Arc::clone(shared), rx)));
            info!("Native bridge started");
            drop(lifecycle);
            shared
                .state
                .lock()
                .await
                .recovery
                .mark_resolved(LocusErrorType::ServiceDisconnected);
        }
        Err(e) => {
            drop(lifecycle);
            warn!("Native bridge start failed: {}", e);
            route_error(shared, e).await;
        }
    }
}

/// Stop the bridge under the lifecycle token, re-checking the subscriber
/// count first: a subscriber that arrived while the stop was pending keeps
/// the bridge alive.
async fn stop_bridge(shared: &Arc<Shared>) {
    let stop_result = {
        let mut lifecycle = shared.lifecycle.lock().await;
        if shared.subscribers.load(Ordering::SeqCst) > 0 {
            debug!("Stop skipped: a subscriber arrived while the stop was pending");
            return;
        }
        if !lifecycle.active {
            return;
        }
        let result = shared.bridge.stop().await;
        if let Some(pump) = lifecycle.pump.take() {
            pump.abort();
        }
        lifecycle.active = false;
        info!("Native bridge stopped");
        result
    };
    if let Err(e) = stop_result {
        route_error(shared, e).await;
    }
}

/// Classify a bridge error and either swallow it or surface it on the
/// error channel.
async fn route_error(shared: &Arc<Shared>, error: LocusError) {
    let decision = shared.state.lock().await.recovery.decide(&error);
    match decision {
        RecoveryDecision::Ignore => debug!("Ignoring error by policy: {}", error),
        decision => {
            warn!("Surfacing error ({:?}): {}", decision, error);
            emit(shared, |ch| {
                let _ = ch.errors.send(error.clone());
            });
        }
    }
}

/// Drains raw bridge records into the dispatcher until the bridge closes
/// its channel or the pump is aborted.
async fn pump(shared: Arc<Shared>, mut rx: mpsc::Receiver<Value>) {
    debug!("Event pump started");
    while let Some(raw) = rx.recv().await {
        dispatch(&shared, raw).await;
    }
    debug!("Event pump drained");
}

async fn dispatch(shared: &Arc<Shared>, raw: Value) {
    match LocusEvent::from_raw(&raw) {
        LocusEvent::Location(sample) => handle_location(shared, sample).await,
        LocusEvent::Geofence {
            identifier,
            action,
            sample,
        } => {
            // Native circular-geofence events drive workflows too, when
            // the action parses and a fix is attached
            if let (Some(parsed), Some(s)) = (GeofenceAction::parse(&action), sample.as_ref()) {
                let transition = GeofenceTransition {
                    polygon_id: identifier.clone(),
                    action: parsed,
                    sample: s.clone(),
                    timestamp: s.timestamp,
                };
                let events = shared
                    .state
                    .lock()
                    .await
                    .workflows
                    .handle_transition(&transition);
                emit_workflow_events(shared, events);
            }
            emit(shared, |ch| {
                let _ = ch.events.send(LocusEvent::Geofence {
                    identifier,
                    action,
                    sample,
                });
            });
        }
        // Every other kind passes through unmodified
        other => emit(shared, |ch| {
            let _ = ch.events.send(other);
        }),
    }
}

async fn handle_location(shared: &Arc<Shared>, sample: LocationSample) {
    let mut state = shared.state.lock().await;
    match state.pipeline.process(sample) {
        Ok(PipelineVerdict::Blocked { sample, verdict }) => {
            emit(shared, |ch| {
                let _ = ch.blocked.send((sample, verdict));
            });
        }
        Ok(PipelineVerdict::Excluded) => {
            debug!("Sample excluded by privacy zones");
        }
        Ok(PipelineVerdict::Enriched {
            sample,
            transitions,
        }) => {
            for transition in transitions {
                let workflow_events = state.workflows.handle_transition(&transition);
                emit_workflow_events(shared, workflow_events);
                emit(shared, |ch| {
                    let _ = ch.transitions.send(transition.clone());
                });
            }

            let trip_events = state.trip.handle_sample(&sample).await;
            for event in trip_events {
                emit(shared, |ch| {
                    let _ = ch.trips.send(event.clone());
                });
            }

            emit(shared, |ch| {
                let _ = ch.events.send(LocusEvent::Location(sample));
            });
        }
        Err(e) => {
            // The offending sample is dropped; the pipeline stays alive
            // for the samples behind it
            warn!("Pipeline stage failed, dropping sample: {}", e);
            emit(shared, |ch| {
                let _ = ch.errors.send(e.clone());
            });
        }
    }
}

fn emit_workflow_events(shared: &Shared, events: Vec<WorkflowEvent>) {
    for event in events {
        emit(shared, |ch| {
            let _ = ch.workflows.send(event.clone());
        });
    }
}
