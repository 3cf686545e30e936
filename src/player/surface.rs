//! Native-surface binding state.

use crate::player::engine::SurfaceHandle;

/// What the caller must do after offering a surface to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// A first or different handle was stored; rebind the render target once
    /// the initialization barrier holds.
    Replaced,
    /// The same handle arrived while already bound: issue two repaint signals
    /// against the current render target, no rebind.
    Redundant,
}

/// Tracks the current surface handle and whether the pipeline's render target
/// is bound to it. Shared between the host thread (surface events) and the
/// worker thread (binding), always behind a mutex.
#[derive(Debug, Default)]
pub struct SurfaceTracker {
    handle: Option<SurfaceHandle>,
    bound: bool,
}

impl SurfaceTracker {
    pub fn new() -> Self {
        SurfaceTracker::default()
    }

    pub fn handle(&self) -> Option<SurfaceHandle> {
        self.handle
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Offers a surface. The OS-level reference to a previously stored handle
    /// is the host's to release.
    pub fn bind(&mut self, new: SurfaceHandle) -> BindOutcome {
        if self.bound && self.handle == Some(new) {
            return BindOutcome::Redundant;
        }
        self.handle = Some(new);
        self.bound = false;
        BindOutcome::Replaced
    }

    /// Records that the render target now points at the stored handle.
    pub fn mark_bound(&mut self) {
        self.bound = true;
    }

    /// Records that the render target no longer exists. The stored handle
    /// stays put so the next worker can bind it again.
    pub fn unbind(&mut self) {
        self.bound = false;
    }

    /// Clears the stored handle, returning it so the host can release the
    /// OS-level reference.
    pub fn release(&mut self) -> Option<SurfaceHandle> {
        self.bound = false;
        self.handle.take()
    }
}
