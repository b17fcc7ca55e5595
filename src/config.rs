use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error, protocol::PASSWORD, serial::codecs::lines::LinesCodec,
    serial::SerialPortBuilder,
};

/// How to reach the device's debug serial port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// The path to the port.
    /// Likely "/dev/ttyUSBx" or "COMx".
    pub path: String,

    /// Baud rate.
    pub baud: u32,

    /// Flow control.
    pub flow_control: serialport::FlowControl,

    /// Incoming bytes are split into lines on this byte.
    pub read_delimiter: u8,

    /// Appended to each line sent, if set.
    pub write_delimiter: Option<u8>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".into(),
            baud: 115_200,
            flow_control: serialport::FlowControl::None,
            read_delimiter: b'\n',
            write_delimiter: Some(b'\n'),
        }
    }
}

impl SerialConfig {
    /// A [`SerialPortBuilder`] with these settings.
    pub fn builder(&self) -> SerialPortBuilder {
        SerialPortBuilder::new(&self.path)
            .set_baud(self.baud)
            .set_flow_control(self.flow_control)
            .set_line_codec(LinesCodec::new(self.read_delimiter, self.write_delimiter))
    }
}

/// The relay controlling the charging cable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CableConfig {
    /// The relay state is written here.
    pub state_file: PathBuf,

    /// Time to wait before and after switching the relay, in milliseconds.
    pub settle_time_ms: u64,
}

impl Default for CableConfig {
    fn default() -> Self {
        Self {
            state_file: "charging_cable.txt".into(),
            settle_time_ms: 1000,
        }
    }
}

impl CableConfig {
    /// See [`CableConfig::settle_time_ms`].
    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }
}

/// The configuration used for a test session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The device's serial port.
    pub serial: SerialConfig,

    /// The charging cable.
    pub cable: CableConfig,

    /// Sent to the device when it asks for the password.
    pub credential: String,

    /// How long a command may take, in milliseconds.
    pub command_timeout_ms: u64,

    /// How long the device may take from reset to the command prompt, in milliseconds.
    pub boot_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            cable: CableConfig::default(),
            credential: PASSWORD.into(),
            command_timeout_ms: 5_000,
            boot_timeout_ms: 30_000,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents, and check that they make sense.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        let config = Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            serial: SerialConfig {
                path: "/dev/serial/by-id/usb-FTDI_FT232R_USB_UART_A50285BI-if00-port0".into(),
                ..Default::default()
            },
            cable: CableConfig {
                state_file: "/tmp/charging_cable.txt".into(),
                settle_time_ms: 500,
            },
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .expect("Config only has serializable fields")
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p)?;

        Self::deserialize(&s)
    }

    /// See [`Config::command_timeout_ms`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// See [`Config::boot_timeout_ms`].
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    fn check_serial(&self) -> Result<(), Error> {
        if self.serial.path.is_empty() {
            return Err(Error::BadConfig("The serial port path is empty.".into()));
        }

        if self.serial.baud == 0 {
            return Err(Error::BadConfig(format!(
                "The baud rate of `{}` must be above zero.",
                self.serial.path
            )));
        }

        if Some(self.serial.read_delimiter) == self.serial.write_delimiter
            || self.serial.write_delimiter.is_none()
        {
            return Ok(());
        }

        // Otherwise the echo of what we send would not come back as one line.
        Err(Error::BadConfig(format!(
            "The write delimiter {:?} differs from the read delimiter {:?}.",
            self.serial.write_delimiter, self.serial.read_delimiter
        )))
    }

    fn check_timeouts(&self) -> Result<(), Error> {
        for (name, value) in [
            ("command_timeout_ms", self.command_timeout_ms),
            ("boot_timeout_ms", self.boot_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::BadConfig(format!("`{name}` must be above zero.")));
            }
        }

        Ok(())
    }

    fn check_credential(&self) -> Result<(), Error> {
        if self.credential.is_empty() || self.credential.contains(['\n', '\r']) {
            Err(Error::BadConfig(
                "The credential must be a single non-empty line.".into(),
            ))
        } else {
            Ok(())
        }
    }

    /// Check the configuration for problems.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_serial()?;
        self.check_timeouts()?;
        self.check_credential()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serialize() {
        let c = Config::example();

        println!("{}", c.serialize_pretty());
    }

    #[test]
    fn example_survives_a_round_trip() {
        let c = Config::example();

        assert_eq!(Config::deserialize(&c.serialize_pretty()).unwrap(), c);
    }

    #[test]
    fn deserialize() {
        let input = r#"
(
    serial: (
        path: "/dev/ttyACM0",
        baud: 9600,
        flow_control: Hardware,
    ),
    credential: "swordfish",
    boot_timeout_ms: 60000,
)
"#;
        let config = Config::deserialize(input).unwrap();

        assert_eq!(config.serial.path, "/dev/ttyACM0");
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.flow_control, serialport::FlowControl::Hardware);
        assert_eq!(config.credential, "swordfish");
        assert_eq!(config.boot_timeout(), Duration::from_secs(60));

        // Left out, so defaulted.
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.cable, CableConfig::default());
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::deserialize("()").unwrap(), Config::default());
    }

    #[test]
    fn bad_ron() {
        let err = Config::deserialize("(serial: 3)").unwrap_err();
        assert!(err.try_into_bad_config().is_ok());
    }

    #[test]
    fn bad_config_zero_timeout() {
        let c = Config {
            command_timeout_ms: 0,
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();
        assert!(err.contains("command_timeout_ms"));
    }

    #[test]
    fn bad_config_zero_baud() {
        let mut c = Config::default();
        c.serial.baud = 0;

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();
        assert!(err.contains("/dev/ttyUSB0"));
    }

    #[test]
    fn bad_config_mismatched_delimiters() {
        let mut c = Config::default();
        c.serial.write_delimiter = Some(b'\r');

        assert!(c.validate().is_err());

        c.serial.write_delimiter = None;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn bad_config_multiline_credential() {
        let c = Config {
            credential: "hunter2\nrm -rf /".into(),
            ..Default::default()
        };

        assert!(c.validate().is_err());
    }
}
