use crate::transport::Transport;
use crate::types::{Frame, TransportError};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SendError, Sender};
use std::time::Duration;

/// An in-process bus; frames come from cloned [`VirtualBusHandle`]s
pub struct VirtualBus {
    channel: String,
    receiver: Receiver<Frame>,
    connected: bool,
}

/// Producer side of a [`VirtualBus`]
#[derive(Clone)]
pub struct VirtualBusHandle {
    sender: Sender<Frame>,
}

impl VirtualBus {
    pub fn new(channel: &str) -> (Self, VirtualBusHandle) {
        let (sender, receiver) = mpsc::channel();
        let bus = Self {
            channel: channel.to_string(),
            receiver,
            connected: false,
        };
        (bus, VirtualBusHandle { sender })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl VirtualBusHandle {
    /// Queue a frame; fails once the bus has been dropped
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.sender
            .send(frame)
            .map_err(|SendError(frame)| {
                TransportError::Read(format!(
                    "virtual bus closed, dropped frame 0x{:X}",
                    frame.arbitration_id
                ))
            })
    }
}

impl Transport for VirtualBus {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        log::info!("Connected to virtual bus {}", self.channel);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // No producer left; keep the wait bounded instead of spinning
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn shutdown(&mut self) {
        if self.connected {
            self.connected = false;
            log::info!("Virtual bus {} closed", self.channel);
        }
    }
}
