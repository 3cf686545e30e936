//! Control protocol server.
//!
//! One cooperative polling loop over at most two descriptors: the listener and
//! the current client. The 1-second poll timeout keeps the loop responsive to
//! the shutdown token even with no traffic. A client dropping its connection
//! is an implicit teardown signal and forces a stop through the supervisor.

use crate::control::protocol::{ControlMessage, FrameDecoder, RECV_BUFFER_SIZE};
use crate::control::supervisor::Supervisor;
use anyhow::{Context, Result};
use log::{error, info, trace, warn};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_util::sync::CancellationToken;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(1);

/// Outcome of one poll cycle while a client is connected.
enum ClientIo {
    Shutdown,
    Replaced(TcpStream),
    Disconnected,
    ReadFailed(std::io::Error),
    Data(usize),
    Tick,
}

pub struct ControlServer {
    listener: TcpListener,
    supervisor: Supervisor,
    shutdown: CancellationToken,
}

impl ControlServer {
    /// Binds the listening socket. Failure here is fatal for the daemon.
    pub async fn bind(
        port: u16,
        supervisor: Supervisor,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("binding control socket on port {port}"))?;
        info!("control socket created on port {port}");
        Ok(ControlServer {
            listener,
            supervisor,
            shutdown,
        })
    }

    /// Port actually bound, useful when configured with port 0.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Runs until the shutdown token fires. A final stop is always forced so a
    /// vanishing controller never leaves the camera running.
    pub async fn run(mut self) -> Result<()> {
        info!("starting main loop");
        let mut pending: Option<TcpStream> = None;

        while !self.shutdown.is_cancelled() {
            let client = match pending.take() {
                Some(stream) => stream,
                None => match time::timeout(POLL_TIMEOUT, self.listener.accept()).await {
                    Ok(Ok((stream, peer))) => {
                        info!("client connected from {peer}");
                        stream
                    }
                    Ok(Err(e)) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                    // poll timeout, recheck the shutdown flag
                    Err(_) => continue,
                },
            };
            pending = self.serve_client(client).await;
        }

        info!("closing");
        self.supervisor.stop().await;
        time::sleep(SHUTDOWN_DRAIN).await;
        Ok(())
    }

    /// Serves one client until it drops, errors out or gets replaced by a
    /// newer connection. Returns the replacement stream, if any.
    async fn serve_client(&mut self, mut client: TcpStream) -> Option<TcpStream> {
        let mut decoder = FrameDecoder::new();
        let mut chunk = [0u8; RECV_BUFFER_SIZE];

        loop {
            let step = tokio::select! {
                _ = self.shutdown.cancelled() => ClientIo::Shutdown,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("client replaced by new connection from {peer}");
                        ClientIo::Replaced(stream)
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        ClientIo::Tick
                    }
                },
                read = client.read(&mut chunk) => match read {
                    Ok(0) => ClientIo::Disconnected,
                    Ok(n) => ClientIo::Data(n),
                    Err(e) => ClientIo::ReadFailed(e),
                },
                _ = time::sleep(POLL_TIMEOUT) => ClientIo::Tick,
            };

            match step {
                ClientIo::Shutdown => return None,
                ClientIo::Replaced(stream) => return Some(stream),
                ClientIo::Disconnected => {
                    info!("client disconnected");
                    self.supervisor.stop().await;
                    return None;
                }
                ClientIo::ReadFailed(e) => {
                    error!("reading error: {e}");
                    return None;
                }
                ClientIo::Data(n) => match decoder.feed(&chunk[..n]) {
                    Ok(messages) => {
                        for message in messages {
                            self.dispatch(message).await;
                        }
                    }
                    Err(e) => {
                        error!("protocol error, dropping client: {e}");
                        return None;
                    }
                },
                ClientIo::Tick => trace!("no traffic"),
            }
        }
    }

    async fn dispatch(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::StartStream { ip, port } => self.supervisor.start(ip, port).await,
            ControlMessage::Disconnect => self.supervisor.stop().await,
        }
    }
}
