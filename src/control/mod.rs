//! Capture-side control plane.
//!
//! A single polling server accepts one remote controller at a time, reframes
//! the byte stream into control messages and drives the capture-process
//! supervisor. Commands are handled strictly in arrival order; the blocking
//! external invocation intentionally delays the loop until it returns.

pub mod protocol;
pub mod server;
pub mod supervisor;

pub use protocol::{ControlMessage, FrameDecoder};
pub use server::ControlServer;
pub use supervisor::{CaptureCommand, ShellCaptureCommand, Supervisor};
