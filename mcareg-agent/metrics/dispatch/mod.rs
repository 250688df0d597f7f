pub mod types;

pub use types::DispatchMetric;
