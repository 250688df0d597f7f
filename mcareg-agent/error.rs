use std::io;
use thiserror::Error;

use mcareg_raw::RegisterError;

use crate::common::transport::TransportError;

#[derive(Error, Debug)]
pub enum McaError {
    #[error("Unknown device type: 0x{0:04X}")]
    UnknownDeviceType(u16),

    #[error("Unknown command '{command}' for {family} devices")]
    UnknownCommand {
        command: String,
        family: &'static str,
    },

    #[error("Unknown device serial number: {0}")]
    UnknownSerial(String),

    #[error("Register conversion failed: {0}")]
    RegisterError(#[from] RegisterError),

    #[error("Transport failed: {0}")]
    TransportError(#[from] TransportError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
}

impl McaError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            McaError::UnknownDeviceType(_) => "unknown_device_type",
            McaError::UnknownCommand { .. } => "unknown_command",
            McaError::UnknownSerial(_) => "unknown_serial",
            McaError::RegisterError(RegisterError::MissingField { .. }) => "missing_field",
            McaError::RegisterError(RegisterError::UnknownField { .. }) => "unknown_field",
            McaError::RegisterError(RegisterError::NotInvertible { .. }) => "not_invertible",
            McaError::RegisterError(_) => "register",
            McaError::TransportError(_) => "transport",
            McaError::ConfigError(_) => "config",
            McaError::IoError(_) => "io",
            McaError::JsonError(_) => "json",
            McaError::PrometheusError(_) => "prometheus",
        }
    }
}

pub type Result<T> = std::result::Result<T, McaError>;
