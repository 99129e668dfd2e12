//! Bus transports
//!
//! The pipeline only needs three capabilities from a bus: connect, a bounded
//! blocking receive, and shutdown. Backends are feature-gated so the crate
//! builds on hosts without native CAN drivers; the in-process virtual bus is
//! always available.

use crate::types::{Frame, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

mod virtual_bus;
pub use virtual_bus::{VirtualBus, VirtualBusHandle};

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod socketcan_bus;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use socketcan_bus::SocketCanBus;

/// A minimal blocking CAN bus interface
pub trait Transport {
    /// Open the underlying interface
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Wait at most `timeout` for one frame
    ///
    /// `Ok(None)` means the wait elapsed without traffic.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError>;

    /// Release the interface; receive fails afterwards
    fn shutdown(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        (**self).receive(timeout)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

/// Transport backends selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process bus fed through a [`VirtualBusHandle`]
    Virtual,
    /// Linux SocketCAN interface (requires the `socketcan` feature)
    SocketCan,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Virtual => write!(f, "virtual"),
            TransportKind::SocketCan => write!(f, "socketcan"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "virtual" => Ok(TransportKind::Virtual),
            "socketcan" => Ok(TransportKind::SocketCan),
            other => Err(TransportError::Unsupported(format!(
                "unknown interface type '{}'",
                other
            ))),
        }
    }
}

/// Build an unconnected transport for the given backend and channel
///
/// A virtual bus opened this way has no producer attached and stays idle.
pub fn open_transport(
    kind: TransportKind,
    channel: &str,
) -> Result<Box<dyn Transport + Send>, TransportError> {
    match kind {
        TransportKind::Virtual => {
            let (bus, _handle) = VirtualBus::new(channel);
            log::warn!("Virtual bus '{}' has no frame producer attached", channel);
            Ok(Box::new(bus))
        }
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportKind::SocketCan => Ok(Box::new(SocketCanBus::new(channel))),
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportKind::SocketCan => Err(TransportError::Unsupported(
            "socketcan (rebuild with --features socketcan on Linux)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("virtual".parse::<TransportKind>().unwrap(), TransportKind::Virtual);
        assert_eq!("SocketCAN".parse::<TransportKind>().unwrap(), TransportKind::SocketCan);
        assert!("kvaser".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::SocketCan.to_string(), "socketcan");
    }

    #[test]
    fn test_open_virtual_transport() {
        let mut bus = open_transport(TransportKind::Virtual, "vcan0").unwrap();
        bus.connect().unwrap();
        assert!(bus.receive(Duration::from_millis(5)).unwrap().is_none());
        bus.shutdown();
    }

    #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
    #[test]
    fn test_socketcan_unavailable_without_feature() {
        assert!(matches!(
            open_transport(TransportKind::SocketCan, "vcan0"),
            Err(TransportError::Unsupported(_))
        ));
    }
}
