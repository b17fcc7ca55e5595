//! The lines the device prints, and the ones we send it.

use std::time::Duration;

/// First line printed after a reset.
pub const BOOTING: &str = "Booting...";

/// Printed while the bootloader loads the firmware.
pub const LOADING_BLOCKS: &str = "Loading blocks...";

/// The firmware has started.
pub const STARTING_USER_SPACE: &str = "Starting user space";

/// Asks for the credential.
pub const ENTER_PASSWORD: &str = "Enter secret password";

/// The credential was accepted.
pub const LOGGED_IN: &str = "Logged in";

/// The prompt: the device is ready for the next command.
pub const ENTER_COMMAND: &str = "Enter command";

/// The last line of output of a successful command.
pub const OK: &str = "OK";

/// The last line of output of a failed command.
pub const ERROR: &str = "ERROR";

/// Shared by all devices.
pub const PASSWORD: &str = "hunter2";

/// Echoes and prompts come right away, so they get a short fixed timeout.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(1);
