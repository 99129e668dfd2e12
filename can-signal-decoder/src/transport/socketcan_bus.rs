//! Linux SocketCAN backend

use crate::transport::Transport;
use crate::types::{wall_clock_seconds, Frame, TransportError};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket};
use std::io::ErrorKind;
use std::time::Duration;

/// A SocketCAN interface such as `can0` or `vcan0`
pub struct SocketCanBus {
    channel: String,
    socket: Option<CanSocket>,
    /// Timeout currently applied to the socket
    read_timeout: Option<Duration>,
}

impl SocketCanBus {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            socket: None,
            read_timeout: None,
        }
    }
}

impl Transport for SocketCanBus {
    fn connect(&mut self) -> Result<(), TransportError> {
        let socket = CanSocket::open(&self.channel).map_err(|e| TransportError::Connect {
            channel: self.channel.clone(),
            reason: e.to_string(),
        })?;
        self.socket = Some(socket);
        self.read_timeout = None;
        log::info!("Connected to {}", self.channel);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotConnected)?;

        if self.read_timeout != Some(timeout) {
            socket.set_read_timeout(timeout)?;
            self.read_timeout = Some(timeout);
        }

        let frame = match socket.read_frame() {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None)
            }
            Err(e) => return Err(TransportError::Read(e.to_string())),
        };

        match frame {
            CanFrame::Data(data_frame) => {
                let arbitration_id = match data_frame.id() {
                    Id::Standard(id) => u32::from(id.as_raw()),
                    Id::Extended(id) => id.as_raw(),
                };
                Ok(Frame::new(arbitration_id, data_frame.data(), wall_clock_seconds()))
            }
            // Remote frames carry no payload to decode
            CanFrame::Remote(_) => Ok(None),
            CanFrame::Error(error_frame) => Err(TransportError::Read(format!(
                "error frame on {}: {:?}",
                self.channel, error_frame
            ))),
        }
    }

    fn shutdown(&mut self) {
        if self.socket.take().is_some() {
            log::info!("CAN connection closed");
        }
    }
}
