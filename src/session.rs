//! A test session against one device.
//!
//! Ties together the port to the device, its charging cable, and a
//! [`RestartDetector`] watching the port for as long as the session lives.

use std::time::Duration;

use tracing::{debug, info, info_span, Instrument};

use crate::{
    bootup::bootup,
    cable::ChargingCable,
    command_runner::CommandRunner,
    config::Config,
    error::Error,
    port::{Port, Reset},
    protocol::PROMPT_TIMEOUT,
    restart_detector::RestartDetector,
};

/// A device under test, its cable and its restart detector.
///
/// Pass a reference as the port (`&SerialPort`, `&MockDut`) to keep
/// ownership of it after the session is finished.
#[derive(Debug)]
pub struct Session<P> {
    port: P,
    cable: ChargingCable,
    detector: RestartDetector,
    credential: String,
    boot_timeout: Duration,
    command_timeout: Duration,
}

impl<P: Port + Reset> Session<P> {
    /// Start watching `port` for restarts.
    ///
    /// Does not touch the device: call [`Session::power_cycle`] to get it into a known state.
    pub async fn start(port: P, cable: ChargingCable, config: &Config) -> Result<Self, Error> {
        let detector = RestartDetector::start(&port).await?;

        Ok(Self {
            port,
            cable,
            detector,
            credential: config.credential.clone(),
            boot_timeout: config.boot_timeout(),
            command_timeout: config.command_timeout(),
        })
    }

    /// The port to the device.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The restart detector watching the port.
    pub fn restart_detector(&self) -> &RestartDetector {
        &self.detector
    }

    /// Reset the device with the cable disconnected, then follow it until it
    /// is ready for commands.
    ///
    /// The restart this causes is not flagged by the detector.
    pub async fn power_cycle(&mut self) -> Result<(), Error> {
        let _allowed = self.detector.allow_restarts();
        let boots = self.detector.boots_seen();

        async {
            let mut lines = self.port.listen();

            let port = &self.port;
            self.cable
                .temporarily_disconnected(|| port.reset())
                .await?;

            bootup(&self.port, &mut lines, &self.credential, self.boot_timeout).await?;

            // The detector must have judged this boot before the scope ends.
            self.detector
                .wait_for_boots(boots + 1, PROMPT_TIMEOUT)
                .await?;

            info!("Power cycled");
            Ok(())
        }
        .instrument(info_span!("power_cycle"))
        .await
    }

    /// A runner for commands, after checking that the device responds.
    pub async fn command_runner(&self) -> Result<CommandRunner<&P>, Error> {
        let runner = CommandRunner::with_timeout(&self.port, self.command_timeout);

        let output = runner.run_command("ping").await?;
        if output != ["pong"] {
            return Err(Error::Mismatch {
                expected: format!("{:?}", ["pong"]),
                actual: format!("{output:?}"),
            });
        }
        debug!("Device responds");

        Ok(runner)
    }

    /// Fails if the device restarted without being asked to since last time this was called.
    pub fn check_no_restart(&self) -> Result<(), Error> {
        if self.detector.check_restart_found_and_clear() {
            Err(Error::UnexpectedRestart)
        } else {
            Ok(())
        }
    }

    /// End the session.
    ///
    /// The cable is left connected and the detector is stopped, also when an
    /// unexpected restart is reported.
    pub async fn finish(mut self) -> Result<(), Error> {
        let restarts = self.check_no_restart();
        let cable = self.cable.connect().await;
        self.detector.stop().await;

        restarts?;
        cable
    }
}
