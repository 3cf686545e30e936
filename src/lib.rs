//! Session control core for a remotely operated camera stream.
//!
//! Two independent halves share this crate:
//! - [`control`]: the daemon running on the capture device. It frames
//!   start/stop commands arriving over a TCP control channel and supervises
//!   the external capture process.
//! - [`player`]: the playback-side lifecycle controller. It owns a media
//!   pipeline built on a dedicated worker thread and binds it to a display
//!   surface as both become available.

pub mod config;
pub mod control;
pub mod player;
