//! Injected Trip Persistence

use crate::TripState;
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

/// Persistence failures. Always treated as non-fatal by the tracker: the
/// machine keeps operating in memory and logs the failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("trip store unavailable: {0}")]
    Unavailable(String),

    #[error("trip state serialization failed: {0}")]
    Serialization(String),
}

/// Storage seam for trip state. Implemented by the embedding application
/// (key-value storage, files, a database); this core only calls it.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn save(&self, state: &TripState) -> Result<(), StoreError>;
    async fn load(&self) -> Result<Option<TripState>, StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral embedding.
#[derive(Default)]
pub struct MemoryTripStore {
    state: Mutex<Option<TripState>>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn save(&self, state: &TripState) -> Result<(), StoreError> {
        *self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))? = Some(state.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<TripState>, StoreError> {
        Ok(self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))? = None;
        Ok(())
    }
}
