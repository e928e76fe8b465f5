//! Actor-based control-plane activities
//!
//! Each activity runs as an independent async task communicating via Tokio
//! channels. The MQTT adapter decodes wire payloads and feeds them into the
//! ingest and dispatch actors; timer-driven actors sweep liveness and sample
//! retention.
//!
//! ```text
//!   MQTT event loop ──heartbeats──▶ IngestActor ──▶ store / alert engine / hub
//!                   ──acks────────▶ DispatchActor ─▶ store / hub
//!   HTTP handlers   ──commands────▶ DispatchActor ─▶ transport (publish)
//!   interval timer ───────────────▶ LivenessActor ─▶ store / hub
//!   interval timer ───────────────▶ RetentionActor ▶ store
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel
//! 2. **Request/Response**: oneshot channels for synchronous queries
//! 3. **Fan-out**: the broadcast hub delivers events to live observers

pub mod dispatch;
pub mod ingest;
pub mod liveness;
pub mod messages;
pub mod retention;
