//! Privacy Zone Engine
//!
//! Maintains a registry of caller-defined zones and applies them to each
//! location sample: a sample inside an exclude zone is dropped from the
//! stream entirely; a sample inside an obfuscate zone continues with its
//! coordinate replaced by a randomized point near the zone center.
//! Exclude always wins when a sample matches both kinds.

mod engine;
mod zone;

pub use engine::{PrivacyZoneEngine, ZoneOutcome};
pub use zone::{PrivacyZone, ZoneAction, ZoneError, ZoneEvent};
