//! Protocol errors

use thiserror::Error;

/// Errors that can occur while driving a pump chain
#[derive(Error, Debug)]
pub enum PumpError {
    #[error("{pump}: no response to command <{instruction}>, pump may be disconnected")]
    NoResponse { pump: String, instruction: String },

    #[error("{pump}: pump reported SYNTAX ERROR when <{instruction}> was issued")]
    Syntax { pump: String, instruction: String },

    #[error("{pump}: pump reported COMMAND NOT APPLICABLE AT THIS TIME when <{instruction}> was issued")]
    NotApplicable { pump: String, instruction: String },

    #[error("{pump}: pump reported OUT OF RANGE when <{instruction}> was issued")]
    OutOfRange { pump: String, instruction: String },

    #[error("{pump}: {operation} is not supported by the {family} family")]
    Capability {
        pump: String,
        family: &'static str,
        operation: &'static str,
    },

    #[error("{0}: pump has stalled, check the syringe(s)")]
    Stall(String),

    #[error("Could not decode reply field: {0:?}")]
    Decode(String),

    #[error("Addressing error: {0}")]
    Addressing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{pump}: {message}")]
    UnexpectedState { pump: String, message: String },

    #[error("Chain is busy with another exchange")]
    ChainBusy,

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PumpError {
    /// Only transport silence is worth a blind retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, PumpError::NoResponse { .. })
    }
}

impl From<serialport::Error> for PumpError {
    fn from(e: serialport::Error) -> Self {
        PumpError::Serial(e.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PumpError>;
