pub mod device;
pub mod sim;
pub mod transport;

pub use device::{DeviceFamily, DeviceHandle, DEFAULT_SAMPLING_RATE};
pub use sim::SimDevice;
pub use transport::{Endpoint, Transport, TransportError};
