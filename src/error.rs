use std::time::Duration;

use thiserror::Error;

use crate::serial::error::SerialPortError;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Nothing arrived on the stream before the deadline.
    #[error("No value arrived within {timeout:?}")]
    Timeout {
        /// The timeout which ran out.
        timeout: Duration,
    },

    /// The stream was closed. No more values will arrive.
    #[error("End of stream")]
    EndOfStream,

    /// A value arrived, but it was not the one expected.
    #[error("Expected {expected}, got {actual}")]
    Mismatch {
        /// What we wanted to see.
        expected: String,

        /// What we got instead.
        actual: String,
    },

    /// The device reported that a command failed.
    #[error("Error running command: {0}")]
    Command(String),

    /// The device restarted while restarts were not allowed.
    #[error("Restart was detected during test")]
    UnexpectedRestart,

    /// Tried to dispatch onto a dispatcher which has been closed.
    #[error("The dispatcher is closed")]
    Closed,

    /// A background worker ended before it signalled that it was ready.
    #[error("The worker `{0}` exited before it was ready")]
    WorkerNotReady(String),

    /// Problems with the serial port.
    #[error("Serial port problem: {0}")]
    Serial(#[from] SerialPortError),

    /// Config file contents are not usable.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// Filesystem related errors.
    #[error("Underlying IO problem")]
    IO(#[from] std::io::Error),
}

impl Error {
    /// Is this a [`Error::Timeout`]?
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Is this a [`Error::EndOfStream`]?
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// Is this a [`Error::Mismatch`]?
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }

    /// Get the failing command, if this is a [`Error::Command`].
    pub fn try_into_command(self) -> Result<String, Self> {
        if let Self::Command(command) = self {
            Ok(command)
        } else {
            Err(self)
        }
    }

    /// Get the problem description, if this is a [`Error::BadConfig`].
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(problem) = self {
            Ok(problem)
        } else {
            Err(self)
        }
    }
}
