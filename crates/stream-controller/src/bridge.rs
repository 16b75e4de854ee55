//! Native Bridge Seam

use async_trait::async_trait;
use error_recovery::LocusError;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The platform positioning provider, injected by the embedding app.
///
/// `start` hands back the channel the bridge will feed raw `{type, data}`
/// records into; `stop` cancels the native subscription. The controller
/// guarantees the two are never invoked concurrently.
#[async_trait]
pub trait LocationBridge: Send + Sync {
    async fn start(&self) -> Result<mpsc::Receiver<Value>, LocusError>;
    async fn stop(&self) -> Result<(), LocusError>;
}

/// Scripted bridge for tests: `start` replays a fixed list of raw events
/// and counts lifecycle calls so tests can assert on exactly-once
/// semantics.
pub struct MockBridge {
    events: Vec<Value>,
    active: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MockBridge {
    pub fn new(events: Vec<Value>) -> Self {
        info!("Creating mock bridge with {} scripted events", events.len());
        Self {
            events,
            active: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Whether a native subscription is currently active.
    pub fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of `start` calls observed.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls observed.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationBridge for MockBridge {
    async fn start(&self) -> Result<mpsc::Receiver<Value>, LocusError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        debug!("Mock bridge started");

        let (tx, rx) = mpsc::channel(self.events.len().max(1));
        for event in &self.events {
            // Capacity covers the script, so this never blocks
            let _ = tx.try_send(event.clone());
        }
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), LocusError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        debug!("Mock bridge stopped");
        Ok(())
    }
}
