//! Errors raised while converting between register words, fields and user values

pub type Result<T> = std::result::Result<T, RegisterError>;

/// Errors that can occur while building or updating a register bank
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Missing field '{field}' for command {command}")]
    MissingField {
        field: String,
        command: &'static str,
    },

    #[error("Unknown field '{field}' for command {command}")]
    UnknownField {
        field: String,
        command: &'static str,
    },

    #[error("Invalid value for command {command}: {source}")]
    InvalidValue {
        command: &'static str,
        source: serde_json::Error,
    },

    #[error("Command {command} has no user-to-fields conversion")]
    NotInvertible { command: &'static str },

    #[error("Register words for {command} must be {expected:?}, got {actual:?}")]
    EncodingMismatch {
        command: &'static str,
        expected: crate::register::WordEncoding,
        actual: crate::register::WordEncoding,
    },

    #[error("Invalid memory target code {0}")]
    InvalidMemoryTarget(u8),
}
