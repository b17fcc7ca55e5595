/// Serial port related errors.
pub mod error;

/// The serial port structure.
pub mod serial_port;

/// Codecs for encoding/decoding messages to/from wire.
pub mod codecs;

pub use serial_port::{SerialPort, SerialPortBuilder};
