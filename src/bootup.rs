//! Follow the device through its boot process.

use std::time::Duration;

use tracing::{debug, info, info_span, Instrument};

use crate::{
    error::Error,
    port::Port,
    protocol::{BOOTING, ENTER_COMMAND, ENTER_PASSWORD, LOADING_BLOCKS, LOGGED_IN, STARTING_USER_SPACE},
    stream::Listener,
    timeout::TimeoutCalculator,
};

/// Follow the device from reset until it is ready for commands.
///
/// Assumes a boot was just triggered, and that `lines` was listening
/// before it was.
/// All the steps share `timeout`.
///
/// When this returns successfully the device is ready to be used by a
/// [`crate::command_runner::CommandRunner`].
pub async fn bootup<P: Port>(
    port: &P,
    lines: &mut Listener<String>,
    credential: &str,
    timeout: Duration,
) -> Result<(), Error> {
    async {
        let deadline = TimeoutCalculator::new(timeout);

        for marker in [BOOTING, LOADING_BLOCKS, STARTING_USER_SPACE] {
            lines.skip_until(marker, deadline.time_left_now()).await?;
            debug!(%marker, "Boot progress");
        }

        authenticate(port, lines, credential, deadline.time_left_now()).await?;
        lines
            .expect_next(ENTER_COMMAND, deadline.time_left_now())
            .await?;

        info!("Booted");
        Ok(())
    }
    .instrument(info_span!("bootup"))
    .await
}

/// Wait for the password prompt, then log in.
pub async fn authenticate<P: Port>(
    port: &P,
    lines: &mut Listener<String>,
    credential: &str,
    timeout: Duration,
) -> Result<(), Error> {
    let deadline = TimeoutCalculator::new(timeout);

    lines
        .skip_until(ENTER_PASSWORD, deadline.time_left_now())
        .await?;

    port.send(credential.into())?;
    lines
        .expect_next(credential, deadline.time_left_now())
        .await?;
    lines.expect_next(LOGGED_IN, deadline.time_left_now()).await?;

    debug!("Logged in");
    Ok(())
}
