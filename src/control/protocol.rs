//! Control channel wire format.
//!
//! Messages are length-prefixed: a big-endian `u32` length (excluding itself),
//! one type byte, then the payload. A disconnect request (type 1) carries no
//! payload; anything else is a stream-start request carrying a 4-byte IPv4
//! address and a big-endian `u32` port.

use anyhow::{Result, bail};
use bytes::{Buf, BufMut, BytesMut};
use log::{debug, warn};
use std::net::Ipv4Addr;

/// Fixed capacity of the receive buffer.
pub const RECV_BUFFER_SIZE: usize = 1024;

const HEADER_LEN: usize = 4;
const TYPE_START: u8 = 0;
const TYPE_DISCONNECT: u8 = 1;

/// A fully framed command from the remote controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Start streaming towards the given target address.
    StartStream { ip: Ipv4Addr, port: u32 },
    /// Explicit teardown request.
    Disconnect,
}

impl ControlMessage {
    /// Frames the message for the wire: the controller side of the channel.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = BytesMut::with_capacity(13);
        match self {
            ControlMessage::StartStream { ip, port } => {
                frame.put_u32(9);
                frame.put_u8(TYPE_START);
                frame.put_slice(&ip.octets());
                frame.put_u32(*port);
            }
            ControlMessage::Disconnect => {
                frame.put_u32(1);
                frame.put_u8(TYPE_DISCONNECT);
            }
        }
        frame.to_vec()
    }
}

/// Incremental frame decoder.
///
/// Bytes accumulate across reads until the declared length is buffered, so the
/// decoded command sequence does not depend on how the stream was chunked.
/// Bytes left over after a complete frame stay buffered for the next one.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    awaiting: Option<usize>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(RECV_BUFFER_SIZE),
            awaiting: None,
        }
    }

    /// Feeds freshly read bytes and returns every message they complete.
    ///
    /// Fails only when the declared length can never fit the receive buffer;
    /// the caller is expected to drop the connection in that case. A body that
    /// does not decode is discarded with a warning and the stream continues.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ControlMessage>> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            if self.awaiting.is_none() {
                if self.buf.len() < HEADER_LEN {
                    break;
                }
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&self.buf[..HEADER_LEN]);
                let declared = u32::from_be_bytes(header) as usize;
                if declared > RECV_BUFFER_SIZE - HEADER_LEN {
                    bail!(
                        "declared message length {declared} exceeds the {RECV_BUFFER_SIZE} byte receive buffer"
                    );
                }
                debug!("awaiting {declared} bytes from client");
                self.awaiting = Some(declared);
            }

            let declared = self.awaiting.unwrap_or(0);
            if self.buf.len() < HEADER_LEN + declared {
                break;
            }

            self.buf.advance(HEADER_LEN);
            let body = self.buf.split_to(declared);
            self.awaiting = None;

            match decode_body(&body) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("discarding undecodable control message: {e}"),
            }
        }

        Ok(messages)
    }

    /// Bytes buffered but not yet dispatched.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_body(body: &[u8]) -> Result<ControlMessage> {
    let Some(&kind) = body.first() else {
        bail!("empty message body");
    };

    if kind == TYPE_DISCONNECT {
        return Ok(ControlMessage::Disconnect);
    }

    // every other type byte is a start request
    if body.len() < 9 {
        bail!("start message body too short: {} bytes", body.len());
    }
    let ip = Ipv4Addr::new(body[1], body[2], body[3], body[4]);
    let mut port = [0u8; 4];
    port.copy_from_slice(&body[5..9]);

    Ok(ControlMessage::StartStream {
        ip,
        port: u32::from_be_bytes(port),
    })
}
