// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod common;
pub mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod orchestrator;
pub mod prom;

pub use common::{DeviceFamily, DeviceHandle, Endpoint, SimDevice, Transport, TransportError};
pub use config::{read_config, DispatchConfig};
pub use error::{McaError, Result};
pub use extract::extract_registers;
pub use orchestrator::{Command, Direction, Dispatcher};
pub use prom::DispatchMetrics;
