//! Outbound byte sink injected into both engines.

use core::fmt;

/// Why a transport refused a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No sink has been attached.
    NotConnected,
    /// The sink cannot take another frame right now.
    Busy,
    /// Implementation-specific failure.
    Other(&'static str),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => f.write_str("transport not connected"),
            Self::Busy => f.write_str("transport busy"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

/// Accepts a complete frame (address, PDU and CRC) for transmission.
///
/// Called synchronously from inside `receive_byte` or a request method; it
/// must not feed bytes back into the same engine.
pub trait Transport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

impl<F> Transport for F
where
    F: FnMut(&[u8]) -> Result<(), TransportError>,
{
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self(frame)
    }
}

/// Transport that refuses everything; every send surfaces as an internal error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn send(&mut self, _frame: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }
}

#[cfg(feature = "alloc")]
pub use queue::FrameQueue;

#[cfg(feature = "alloc")]
mod queue {
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;

    use super::{Transport, TransportError};

    /// Buffers outbound frames until a driver drains them.
    #[derive(Debug, Clone, Default)]
    pub struct FrameQueue {
        frames: VecDeque<Vec<u8>>,
        capacity: Option<usize>,
    }

    impl FrameQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue that reports [`TransportError::Busy`] once `capacity` frames wait.
        pub fn bounded(capacity: usize) -> Self {
            Self {
                frames: VecDeque::new(),
                capacity: Some(capacity),
            }
        }

        pub fn pop(&mut self) -> Option<Vec<u8>> {
            self.frames.pop_front()
        }

        pub fn drain(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
            self.frames.drain(..)
        }

        pub fn len(&self) -> usize {
            self.frames.len()
        }

        pub fn is_empty(&self) -> bool {
            self.frames.is_empty()
        }
    }

    impl Transport for FrameQueue {
        fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            if self.capacity.is_some_and(|cap| self.frames.len() >= cap) {
                return Err(TransportError::Busy);
            }
            self.frames.push_back(frame.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NoTransport, Transport, TransportError};

    #[test]
    fn closures_are_transports() {
        let mut sent = 0usize;
        let mut sink = |frame: &[u8]| -> Result<(), TransportError> {
            sent += frame.len();
            Ok(())
        };
        sink.send(&[1, 2, 3]).unwrap();
        assert_eq!(sent, 3);
    }

    #[test]
    fn no_transport_refuses() {
        assert_eq!(
            NoTransport.send(&[0x01]).unwrap_err(),
            TransportError::NotConnected
        );
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn bounded_queue_reports_busy() {
        let mut queue = super::FrameQueue::bounded(1);
        queue.send(&[0x01]).unwrap();
        assert_eq!(queue.send(&[0x02]).unwrap_err(), TransportError::Busy);
        assert_eq!(queue.pop().unwrap(), [0x01]);
        assert!(queue.is_empty());
    }
}
