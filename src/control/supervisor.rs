//! Capture-process supervision.
//!
//! The supervisor tracks whether the external capture process is active and
//! guarantees idempotent start/stop: the external command runs at most once per
//! actual state transition. The command itself sits behind [`CaptureCommand`]
//! so the logic is testable without spawning processes.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, error, info};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// External capture-process invocations. Success means exit code 0.
#[async_trait]
pub trait CaptureCommand: Send + Sync {
    async fn start(&self, ip: Ipv4Addr, port: u32) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Shells out to the configured capture launcher.
pub struct ShellCaptureCommand {
    program: PathBuf,
}

impl ShellCaptureCommand {
    pub fn new(program: impl AsRef<Path>) -> Self {
        ShellCaptureCommand {
            program: program.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        info!("executing: {} {}", self.program.display(), args.join(" "));
        let status = tokio::process::Command::new(&self.program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;
        if !status.success() {
            bail!("{} exited with {status}", self.program.display());
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureCommand for ShellCaptureCommand {
    async fn start(&self, ip: Ipv4Addr, port: u32) -> Result<()> {
        self.run(&["start".into(), ip.to_string(), port.to_string()])
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.run(&["stop".into()]).await
    }
}

/// Tracks the capture process and keeps start/stop idempotent.
///
/// The `active` flag reflects the last known outcome: a failed invocation
/// leaves it unchanged, which can drift from the real process state if the
/// external command fails. Reconciliation is intentionally out of scope.
pub struct Supervisor {
    command: Arc<dyn CaptureCommand>,
    active: bool,
}

impl Supervisor {
    pub fn new(command: Arc<dyn CaptureCommand>) -> Self {
        Supervisor {
            command,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Starts the capture process towards `ip:port`. No-op while active.
    pub async fn start(&mut self, ip: Ipv4Addr, port: u32) {
        if self.active {
            debug!("camera is already streaming");
            return;
        }
        match self.command.start(ip, port).await {
            Ok(()) => {
                self.active = true;
                info!("capture process streaming towards {ip}:{port}");
            }
            Err(e) => error!("starting capture process failed: {e:#}"),
        }
    }

    /// Stops the capture process. No-op while inactive.
    pub async fn stop(&mut self) {
        if !self.active {
            return;
        }
        match self.command.stop().await {
            Ok(()) => {
                self.active = false;
                info!("capture process stopped");
            }
            Err(e) => error!("stopping capture process failed: {e:#}"),
        }
    }
}
