use std::path::PathBuf;

/// Port the control daemon listens on when none is given.
pub const DEFAULT_PORT: u16 = 1035;

/// Capture process launcher invoked as `<cmd> start <ip> <port>` / `<cmd> stop`.
pub const DEFAULT_CAPTURE_COMMAND: &str = "/usr/local/bin/camera_streamer.sh";

/// Runtime configuration of the control daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub capture_command: PathBuf,
    /// Detached mode: log errors only.
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            capture_command: PathBuf::from(DEFAULT_CAPTURE_COMMAND),
            quiet: false,
        }
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
