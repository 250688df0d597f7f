use std::fmt;
use thiserror::Error;

/// Logical endpoint pair of a device
///
/// The command endpoint carries headers (and short-write payloads), the
/// data endpoint carries full register payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Command,
    Data,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Command => "command",
            Endpoint::Data => "data",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Short read from {endpoint} endpoint: expected {expected} bytes, got {actual}")]
    ShortRead {
        endpoint: Endpoint,
        expected: usize,
        actual: usize,
    },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Device rejected transfer: {0}")]
    Rejected(String),
}

/// Blocking byte transport to one device
///
/// Implementations own timeouts and retries; callers see each transfer
/// exactly once.
pub trait Transport {
    fn write_bytes(&mut self, endpoint: Endpoint, bytes: &[u8]) -> Result<(), TransportError>;

    fn read_bytes(&mut self, endpoint: Endpoint, count: usize) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_bytes(&mut self, endpoint: Endpoint, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_bytes(endpoint, bytes)
    }

    fn read_bytes(&mut self, endpoint: Endpoint, count: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read_bytes(endpoint, count)
    }
}
