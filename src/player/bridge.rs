//! Cross-thread callback bridge.
//!
//! Every callback into the host application funnels through here. A worker
//! thread registers itself once on startup and holds the attachment for its
//! lifetime; callback failures are logged and swallowed, never propagated
//! across the thread boundary.

use crate::player::state::PipelineState;
use anyhow::Result;
use log::{debug, warn};
use std::sync::Arc;

/// Callback interface implemented by the host application.
pub trait HostCallbacks: Send + Sync {
    fn set_message(&self, text: &str) -> Result<()>;
    fn set_error(&self, kind: i32, text: &str) -> Result<()>;
    /// Receives the numeric state code, see [`PipelineState::code`].
    fn notify_state(&self, code: i32) -> Result<()>;
    fn on_initialized(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct CallbackBridge {
    host: Arc<dyn HostCallbacks>,
}

impl CallbackBridge {
    pub fn new(host: Arc<dyn HostCallbacks>) -> Self {
        CallbackBridge { host }
    }

    /// Registers the calling worker thread with the host interface.
    /// Deregistration happens when the returned attachment drops.
    pub fn attach(&self, thread_name: &str) -> ThreadAttachment {
        debug!("attaching thread {thread_name} to host callbacks");
        ThreadAttachment {
            host: Arc::clone(&self.host),
            thread_name: thread_name.to_owned(),
        }
    }
}

/// Per-worker-thread attachment to the host callback interface.
pub struct ThreadAttachment {
    host: Arc<dyn HostCallbacks>,
    thread_name: String,
}

impl ThreadAttachment {
    pub fn set_message(&self, text: &str) {
        swallow("set_message", self.host.set_message(text));
    }

    pub fn set_error(&self, kind: i32, text: &str) {
        swallow("set_error", self.host.set_error(kind, text));
    }

    pub fn notify_state(&self, state: PipelineState) {
        swallow("notify_state", self.host.notify_state(state.code()));
    }

    pub fn on_initialized(&self) {
        swallow("on_initialized", self.host.on_initialized());
    }
}

impl Drop for ThreadAttachment {
    fn drop(&mut self) {
        debug!("detaching thread {} from host callbacks", self.thread_name);
    }
}

fn swallow(name: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("host callback {name} failed: {e:#}");
    }
}
