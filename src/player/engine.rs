//! Media-engine abstraction.
//!
//! The real pipeline framework is an external collaborator: it takes a
//! textual launch description, manages buffers and codecs, and emits
//! lifecycle events on a bus. These traits are the seam the controller works
//! against, so the lifecycle logic runs against a fake in tests and against
//! the actual engine in a host application.

use crate::player::controller::BusHandle;
use crate::player::state::PipelineState;
use anyhow::Result;

/// Opaque reference to a native display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn from_raw(raw: u64) -> Self {
        SurfaceHandle(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Where a bus message originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOrigin {
    /// The pipeline itself.
    Pipeline,
    /// One of its child elements.
    Element,
}

/// Asynchronous notification emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    Error { source: String, message: String },
    StateChanged { origin: BusOrigin, state: PipelineState },
}

/// Builds pipelines from launch descriptions.
pub trait MediaEngine: Send + Sync {
    /// Builds a pipeline and attaches its bus to `bus`. A malformed
    /// description or missing capability fails synchronously.
    fn build(&self, description: &str, bus: BusHandle) -> Result<Box<dyn MediaPipeline>>;
}

/// A built pipeline, owned by the worker thread.
pub trait MediaPipeline: Send {
    /// Requests a state transition.
    fn set_state(&mut self, state: PipelineState) -> Result<()>;

    /// Points the video sink at a surface, or detaches it with `None`.
    fn set_render_target(&mut self, surface: Option<SurfaceHandle>);

    /// Asks the sink to repaint the current frame.
    fn expose(&mut self);
}
