//! Playback-side pipeline lifecycle.
//!
//! Concerns are split the same way the stream flows:
//! - Control/Coordination: [`controller`] owns the worker thread and the
//!   state transitions of the media pipeline
//! - Engine boundary: [`engine`] abstracts the external pipeline framework
//!   (build from a launch description, state changes, render target, bus)
//! - Host boundary: [`bridge`] marshals worker-thread events into the host
//!   application's callback interface
//! - Display: [`surface`] tracks the native surface handle and suppresses
//!   redundant rebinds
//!
//! The host thread only ever sends messages into the worker's event queue;
//! the worker thread owns the pipeline and all bus-event handling. `stop()`
//! is the single synchronous join point.

pub mod bridge;
pub mod controller;
pub mod engine;
pub mod state;
pub mod surface;

pub use bridge::HostCallbacks;
pub use controller::{BusHandle, PlayerConfig, PlayerController};
pub use engine::{BusMessage, BusOrigin, MediaEngine, MediaPipeline, SurfaceHandle};
pub use state::PipelineState;
pub use surface::{BindOutcome, SurfaceTracker};
