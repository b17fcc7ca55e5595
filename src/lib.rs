#![deny(missing_docs)]

//! This crate talks to a device under test over a line based text stream,
//! typically its debug serial port.
//!
//! Every line the device prints is handed to all interested [`stream::Listener`]s,
//! each with its own queue, so background watchers never steal lines from
//! whoever is running commands.
//!
//! On top of that:
//! - [`command_runner::CommandRunner`] sends a command and collects its output.
//! - [`bootup::bootup`] follows the device from reset to the command prompt.
//! - [`restart_detector::RestartDetector`] notices restarts nobody asked for.
//! - [`session::Session`] ties it all together with the charging cable.
//!
//! A simulated device is available in [`mock`], useful to test
//! without having the actual hardware.

/// Possible errors in this library.
pub mod error;

/// Deadlines shared between several reads.
pub mod timeout;

/// Fan out of a single stream of values to many listeners.
pub mod stream;

/// Background tasks with a readiness handshake.
pub mod worker;

/// What a connection to the device looks like.
pub mod port;

/// Two ports connected to each other, in memory.
pub mod pipe;

/// The lines the device prints, and what it expects back.
pub mod protocol;

/// Running commands on the device.
pub mod command_runner;

/// Following the device through its boot.
pub mod bootup;

/// Noticing unexpected restarts.
pub mod restart_detector;

/// The serial port connection to the device.
pub mod serial;

/// The device's charging cable.
pub mod cable;

/// A simulated device.
pub mod mock;

/// A test session against one device.
pub mod session;

/// Configuration.
pub mod config;

/// Logging setup.
pub mod logging;

/// The command line interface.
pub mod cli;
