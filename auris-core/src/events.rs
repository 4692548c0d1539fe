//! Event types broadcast by the engine.
//!
//! Consumers subscribe via [`crate::WakeEngine::subscribe`] (detections),
//! [`crate::WakeEngine::subscribe_state`] (lifecycle transitions) and
//! [`crate::WakeEngine::subscribe_activity`] (per-cycle audio levels).
//! All types serialize with camelCase fields so they can be forwarded to a
//! UI layer unchanged.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Detection events
// ---------------------------------------------------------------------------

/// Emitted once per accepted wake-word trigger.
///
/// Transient: handed to subscribers and not retained by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Name of the keyword model that triggered.
    pub keyword: String,
    /// Wall-clock timestamp of the trigger (milliseconds since Unix epoch).
    pub timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Audio activity events
// ---------------------------------------------------------------------------

/// Emitted for each processed audio read, for level meters and telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the read in [0.0, 1.0].
    pub rms: f32,
}

// ---------------------------------------------------------------------------
// Engine state events
// ---------------------------------------------------------------------------

/// Emitted whenever the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStateEvent {
    pub state: EngineState,
    /// Optional human-readable detail (e.g. error message, fallback notice).
    pub detail: Option<String>,
}

/// Lifecycle state of the wake engine.
///
/// ```text
/// Stopped → Starting → {Running | Error}
/// Running ↔ Paused
/// any     → Stopped (explicit stop)
/// ```
///
/// `Error` is terminal until an explicit stop/reinitialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Engine created or stopped; worker not active.
    Stopped,
    /// `start()` accepted; worker being spawned.
    Starting,
    /// Worker actively reading audio and scoring.
    Running,
    /// Worker alive but scoring halted; resources remain held.
    Paused,
    /// Detection loop died (audio failure). Restart required.
    Error,
}
