//! A mock, useful to test against without having the actual device.
//!
//! The mock device sits on the other end of a [`pipe_port_pair`] and speaks the
//! same line protocol as the real one: it boots when reset, asks for the password,
//! and then runs a handful of commands.

use std::time::Duration;

use futures::{channel::mpsc, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::Error,
    pipe::{pipe_port_pair, PipePort},
    port::{Port, Reset},
    protocol::{
        BOOTING, ENTER_COMMAND, ENTER_PASSWORD, ERROR, LOADING_BLOCKS, LOGGED_IN, OK, PASSWORD,
        STARTING_USER_SPACE,
    },
    stream::Listener,
    worker::{Ready, Worker},
};

/// Builder for a [`MockDut`].
#[derive(Debug)]
pub struct MockDutBuilder {
    credential: String,
    line_delay: Duration,
}

impl Default for MockDutBuilder {
    fn default() -> Self {
        Self {
            credential: PASSWORD.into(),
            line_delay: Duration::from_millis(1),
        }
    }
}

impl MockDutBuilder {
    /// A builder with the default credential.
    pub fn new() -> Self {
        Self::default()
    }

    /// The password the mock accepts.
    pub fn set_credential(mut self, credential: &str) -> Self {
        self.credential = credential.into();
        self
    }

    /// How long the mock waits before printing each line.
    pub fn set_line_delay(mut self, line_delay: Duration) -> Self {
        self.line_delay = line_delay;
        self
    }

    /// Start the mock.
    /// It starts out booted and logged in, ready for commands.
    pub async fn build(self) -> Result<MockDut, Error> {
        info!("Running mock device");

        let (external, internal) = pipe_port_pair();
        let (resets_tx, resets_rx) = mpsc::unbounded();
        let token = CancellationToken::new();

        let device = Device {
            port: internal,
            state: State::Ready,
            credential: self.credential,
            line_delay: self.line_delay,
        };

        let worker_token = token.clone();
        let worker = Worker::start_with_stop(
            "mock-dut",
            move |ready| device.run(ready, resets_rx, worker_token),
            move || {
                token.cancel();
                Ok(())
            },
        )
        .await?;

        Ok(MockDut {
            port: external,
            resets: resets_tx,
            worker: Some(worker),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingPassword,
    Ready,
}

struct Device {
    port: PipePort<String>,
    state: State,
    credential: String,
    line_delay: Duration,
}

impl Device {
    // Only wakes up the device now and then,
    // the stream ending or the token being cancelled wakes it up sooner.
    const POLL: Duration = Duration::from_secs(60);

    async fn run(
        mut self,
        ready: Ready,
        mut resets: mpsc::UnboundedReceiver<()>,
        token: CancellationToken,
    ) -> Result<(), Error> {
        let mut lines: Listener<String> = self.port.listen();
        ready.signal();

        let result = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                reset = resets.next() => match reset {
                    Some(()) => {
                        if let Err(e) = self.boot().await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                line = lines.next(Self::POLL) => match line {
                    Ok(line) => {
                        if let Err(e) = self.handle(line).await {
                            break Err(e);
                        }
                    }
                    Err(Error::Timeout { .. }) => {}
                    Err(Error::EndOfStream) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };

        match result {
            // Hung up on while talking.
            Err(Error::Closed) => Ok(()),
            other => other,
        }
    }

    async fn emit(&self, line: &str) -> Result<(), Error> {
        tokio::time::sleep(self.line_delay).await;
        self.port.send(line.into())
    }

    async fn boot(&mut self) -> Result<(), Error> {
        debug!("Mock booting");

        self.emit(BOOTING).await?;
        self.emit("Checking memory... ok").await?;
        self.emit(LOADING_BLOCKS).await?;
        self.emit("Loaded 12 blocks").await?;
        self.emit(STARTING_USER_SPACE).await?;
        self.emit(ENTER_PASSWORD).await?;

        self.state = State::AwaitingPassword;
        Ok(())
    }

    async fn handle(&mut self, line: String) -> Result<(), Error> {
        self.emit(&line).await?;

        match self.state {
            State::AwaitingPassword if line == self.credential => {
                self.emit(LOGGED_IN).await?;
                self.emit(ENTER_COMMAND).await?;
                self.state = State::Ready;
            }
            State::AwaitingPassword => {
                self.emit("Wrong password").await?;
                self.emit(ENTER_PASSWORD).await?;
            }
            State::Ready => self.run_command(&line).await?,
        }

        Ok(())
    }

    async fn run_command(&mut self, command: &str) -> Result<(), Error> {
        match command {
            "ping" => {
                self.emit("pong").await?;
                self.emit(OK).await?;
            }
            "version" => {
                self.emit(&format!("mock {}", env!("CARGO_PKG_VERSION")))
                    .await?;
                self.emit(OK).await?;
            }
            "calculate" => {
                self.emit("42").await?;
                self.emit(OK).await?;
            }
            "reboot" => {
                self.emit("Rebooting").await?;
                return self.boot().await;
            }
            _ => self.emit(ERROR).await?,
        }

        self.emit(ENTER_COMMAND).await
    }
}

/// A simulated device, reachable as a [`Port`].
///
/// Commands: `ping`, `version`, `calculate`, `reboot`.
#[derive(Debug)]
pub struct MockDut {
    port: PipePort<String>,
    resets: mpsc::UnboundedSender<()>,
    worker: Option<Worker>,
}

impl MockDut {
    /// Start a mock with default settings.
    pub async fn start() -> Result<Self, Error> {
        MockDutBuilder::new().build().await
    }

    /// Stop the mock.
    /// Listeners see the end of the stream.
    pub async fn stop(mut self) {
        self.port.close();

        if let Some(worker) = self.worker.take() {
            worker.stop().await;
        }
    }
}

impl Port for MockDut {
    fn send(&self, line: String) -> Result<(), Error> {
        self.port.send(line)
    }

    fn listen(&self) -> Listener<String> {
        self.port.listen()
    }
}

impl Reset for MockDut {
    async fn reset(&self) -> Result<(), Error> {
        debug!("Resetting mock");

        self.resets
            .unbounded_send(())
            .map_err(|_| Error::Closed)
    }
}
