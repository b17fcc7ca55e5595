use std::io;

use thiserror::Error;

/// Any error the serial port might encounter.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// Problems opening or configuring the port.
    #[error("Serial port problem: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Problems changing the terminal settings of the port.
    #[cfg(unix)]
    #[error("Could not change terminal settings")]
    Termios(#[from] nix::Error),

    /// Serial port disconnected.
    #[error("Serial port disconnected")]
    Disconnected,
}
