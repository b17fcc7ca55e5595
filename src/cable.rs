//! Control of the device's charging cable.
//!
//! The cable goes through a relay. There is no real relay driver here:
//! the relay state is written to a file, which a relay controller
//! (or a curious human) can watch.

use std::{
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use crate::error::Error;

/// Controls a charging cable.
///
/// When tests are not running the cable should be left connected,
/// so that the battery does not drain.
#[derive(Debug)]
pub struct ChargingCable {
    state_file: PathBuf,
    settle_time: Duration,

    // `None` means unknown, which is distinct from both connected and disconnected.
    last_state: Option<bool>,
}

impl ChargingCable {
    /// The relay needs some time before and after switching.
    pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(1);

    /// A cable whose relay state is written to `state_file`.
    pub fn new<P: AsRef<Path>>(state_file: P) -> Self {
        Self {
            state_file: state_file.as_ref().into(),
            settle_time: Self::DEFAULT_SETTLE_TIME,
            last_state: None,
        }
    }

    /// Change how long to wait around switching the relay.
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Is the cable connected? `None` if we have not switched it yet.
    pub fn is_connected(&self) -> Option<bool> {
        self.last_state
    }

    /// Connect the cable, unless we know it already is.
    pub async fn connect(&mut self) -> Result<(), Error> {
        debug!("connect");

        if self.last_state != Some(true) {
            info!("Connecting charger cable...");
            self.set_relay(true).await?;
            info!("Done.");
        }
        self.last_state = Some(true);

        Ok(())
    }

    /// Disconnect the cable, unless we know it already is.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        debug!("disconnect");

        if self.last_state != Some(false) {
            info!("Disconnecting charger cable...");
            self.set_relay(false).await?;
            info!("Done.");
        }
        self.last_state = Some(false);

        Ok(())
    }

    /// Disconnect, run `f`, then connect again.
    ///
    /// The cable is connected again even if `f` fails.
    pub async fn temporarily_disconnected<F, Fut, T>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.disconnect().await?;
        let result = f().await;
        self.connect().await?;

        result
    }

    async fn set_relay(&mut self, connected: bool) -> Result<(), Error> {
        tokio::time::sleep(self.settle_time).await;

        let content = if connected { "connected" } else { "disconnected" };
        tokio::fs::write(&self.state_file, content).await?;
        info!("*relay says click*");

        tokio::time::sleep(self.settle_time).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn state_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dut-keel-{name}-{}.txt", std::process::id()))
    }

    async fn relay_state(path: &Path) -> String {
        tokio::fs::read_to_string(path).await.unwrap()
    }

    #[tokio::test]
    async fn connect_and_disconnect() {
        let path = state_file("connect");
        let mut cable = ChargingCable::new(&path).with_settle_time(Duration::ZERO);
        assert_eq!(cable.is_connected(), None);

        cable.disconnect().await.unwrap();
        assert_eq!(relay_state(&path).await, "disconnected");
        assert_eq!(cable.is_connected(), Some(false));

        cable.connect().await.unwrap();
        assert_eq!(relay_state(&path).await, "connected");
        assert_eq!(cable.is_connected(), Some(true));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn known_state_does_not_click_the_relay() {
        let path = state_file("known");
        let mut cable = ChargingCable::new(&path).with_settle_time(Duration::ZERO);

        cable.connect().await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        // Already connected, so the file is not written again.
        cable.connect().await.unwrap();
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn temporarily_disconnected_reconnects_after_failure() {
        let path = state_file("temporarily");
        let mut cable = ChargingCable::new(&path).with_settle_time(Duration::ZERO);

        let state_during = &path;
        let result: Result<(), Error> = cable
            .temporarily_disconnected(|| async move {
                assert_eq!(relay_state(state_during).await, "disconnected");
                Err(Error::EndOfStream)
            })
            .await;

        assert!(result.unwrap_err().is_end_of_stream());
        assert_eq!(relay_state(&path).await, "connected");
        assert_eq!(cable.is_connected(), Some(true));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
