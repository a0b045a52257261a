use std::io;
use thiserror::Error;

use crate::bus::BusError;

#[derive(Debug, Error)]
pub enum SerialError {
    /// A live service already owns the port
    #[error("Port {0} is already in use")]
    PortInUse(String),

    /// The device could not be opened or configured
    #[error("Failed to open serial device: {0}")]
    Open(#[from] serialport::Error),

    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// The service was torn down or its writer stopped
    #[error("Port {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type alias for serial operations
pub type SerialResult<T> = Result<T, SerialError>;
