use std::time::Duration;

use tracing::{debug, info};

use crate::{
    error::Error,
    port::Port,
    protocol::{ENTER_COMMAND, ERROR, OK, PROMPT_TIMEOUT},
    timeout::TimeoutCalculator,
};

/// Runs commands on the device.
///
/// Each command is sent, its echo checked, and its output collected until
/// the device says `OK` or `ERROR`, followed by a new prompt.
#[derive(Debug)]
pub struct CommandRunner<P> {
    port: P,
    timeout: Duration,
}

impl<P: Port> CommandRunner<P> {
    /// How long a command may take by default.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// A runner using the default timeout.
    pub fn new(port: P) -> Self {
        Self::with_timeout(port, Self::DEFAULT_TIMEOUT)
    }

    /// A runner where each command has `timeout` to complete.
    pub fn with_timeout(port: P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Borrow the port commands are run on.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Send a command, collect its output lines and check that it succeeded.
    pub async fn run_command(&self, command: &str) -> Result<Vec<String>, Error> {
        let (ok, lines) = self.try_run_command(command).await?;

        if ok {
            Ok(lines)
        } else {
            Err(Error::Command(command.into()))
        }
    }

    /// Send a command.
    /// Returns whether it succeeded, and the lines it printed.
    pub async fn try_run_command(&self, command: &str) -> Result<(bool, Vec<String>), Error> {
        self.try_run_command_with_timeout(command, self.timeout)
            .await
    }

    /// Like [`CommandRunner::try_run_command`], but with a different timeout.
    pub async fn try_run_command_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<(bool, Vec<String>), Error> {
        info!(%command, "Running");

        let mut lines = self.port.listen();

        self.port.send(command.into())?;
        lines.expect_next(command, PROMPT_TIMEOUT).await?;

        let deadline = TimeoutCalculator::new(timeout);
        let mut output = vec![];

        let ok = loop {
            let line = match lines.next(deadline.time_left_now()).await {
                Err(Error::Timeout { .. }) => return Err(Error::Timeout { timeout }),
                other => other?,
            };

            match line.as_str() {
                OK => break true,
                ERROR => break false,
                _ => output.push(line),
            }
        };

        lines.expect_next(ENTER_COMMAND, PROMPT_TIMEOUT).await?;

        debug!(%command, %ok, lines = output.len(), "Command done");
        Ok((ok, output))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        pipe::{pipe_port_pair, PipePort},
        worker::Worker,
    };

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);

    /// Answers `ping` with `pong`, fails anything else.
    async fn fake_command_interpreter() -> (PipePort<String>, Worker) {
        let (external, internal) = pipe_port_pair::<String>();

        let worker = Worker::start("fake-interpreter", |ready| async move {
            let mut lines = internal.listen();
            ready.signal();

            loop {
                let command = match lines.next(Duration::from_secs(10)).await {
                    Ok(command) => command,
                    Err(Error::EndOfStream) => return Ok(()),
                    Err(e) => return Err(e),
                };

                internal.send(command.clone())?;
                if command == "ping" {
                    internal.send("pong".into())?;
                    internal.send(OK.into())?;
                } else {
                    internal.send(ERROR.into())?;
                }
                internal.send(ENTER_COMMAND.into())?;
            }
        })
        .await
        .unwrap();

        (external, worker)
    }

    #[tokio::test]
    async fn successful_try_run_command() {
        let (port, worker) = fake_command_interpreter().await;
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        let (ok, lines) = runner.try_run_command("ping").await.unwrap();
        assert!(ok);
        assert_eq!(lines, vec!["pong".to_string()]);

        drop(port);
        worker.stop().await;
    }

    #[tokio::test]
    async fn failing_try_run_command() {
        let (port, worker) = fake_command_interpreter().await;
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        let (ok, lines) = runner.try_run_command("xyz").await.unwrap();
        assert!(!ok);
        assert!(lines.is_empty());

        drop(port);
        worker.stop().await;
    }

    #[tokio::test]
    async fn failing_run_command_is_a_command_error() {
        let (port, worker) = fake_command_interpreter().await;
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        let err = runner.run_command("xyz").await.unwrap_err();
        assert_eq!(err.try_into_command().unwrap(), "xyz");

        drop(port);
        worker.stop().await;
    }

    #[tokio::test]
    async fn commands_can_be_repeated() {
        let (port, worker) = fake_command_interpreter().await;
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        for _ in 0..5 {
            assert_eq!(runner.run_command("ping").await.unwrap(), vec!["pong"]);
        }

        drop(port);
        worker.stop().await;
    }

    #[tokio::test]
    async fn unlimited_timeout() {
        let (port, worker) = fake_command_interpreter().await;
        let runner = CommandRunner::with_timeout(&port, Duration::MAX);

        assert_eq!(runner.run_command("ping").await.unwrap(), vec!["pong"]);

        drop(port);
        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out() {
        let (port, _other_end) = pipe_port_pair::<String>();
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        let err = runner.try_run_command("ping").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn wrong_echo_is_a_mismatch() {
        let (port, device) = pipe_port_pair::<String>();
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        let mut device_lines = device.listen();
        let run = runner.try_run_command("ping");

        let answer = async {
            device_lines.expect_next("ping", TEST_TIMEOUT).await.unwrap();
            device.send("pnig".into()).unwrap();
        };

        let (result, ()) = tokio::join!(run, answer);
        assert!(result.unwrap_err().is_mismatch());
    }

    #[tokio::test]
    async fn closed_device_is_end_of_stream() {
        let (port, device) = pipe_port_pair::<String>();
        let runner = CommandRunner::with_timeout(&port, TEST_TIMEOUT);

        let mut device_lines = device.listen();
        let run = runner.try_run_command("ping");

        let answer = async {
            device_lines.expect_next("ping", TEST_TIMEOUT).await.unwrap();
            device.send("ping".into()).unwrap();
            device.send("pong".into()).unwrap();
            port.close();
        };

        let (result, ()) = tokio::join!(run, answer);
        assert!(result.unwrap_err().is_end_of_stream());
    }
}
