use std::time::Duration;

use futures::{channel::mpsc, SinkExt, StreamExt};
use tokio_serial::{SerialPort as _, SerialPortBuilderExt, SerialStream};
use tokio_util::{codec::Decoder, sync::CancellationToken};
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    port::{Port, Reset},
    serial::{codecs::lines::LinesCodec, error::SerialPortError},
    stream::{Dispatcher, Listener},
    worker::{Ready, Worker},
};

/// Builder for a [`SerialPort`].
#[derive(Debug, Default)]
pub struct SerialPortBuilder {
    baud: Option<u32>,
    flow_control: Option<serialport::FlowControl>,
    path: String,
    line_codec: Option<LinesCodec>,
}

fn try_create_serial_port(
    baud: u32,
    flow_control: serialport::FlowControl,
    path: &str,
) -> Result<SerialStream, SerialPortError> {
    let serial_stream = tokio_serial::new(path, baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(flow_control)
        .open_native_async()?;

    Ok(serial_stream)
}

/// Linux hangs up (drops DTR) when a port is closed.
/// Boards which use DTR for reset would restart each time we let go of the port.
#[cfg(unix)]
fn disable_hangup_on_close(serial_stream: &SerialStream) -> Result<(), SerialPortError> {
    use nix::sys::termios::{tcgetattr, tcsetattr, ControlFlags, SetArg};
    use std::os::unix::io::AsRawFd;

    let fd = serial_stream.as_raw_fd();

    let mut termios = tcgetattr(fd)?;
    termios.control_flags.remove(ControlFlags::HUPCL);
    tcsetattr(fd, SetArg::TCSANOW, &termios)?;

    Ok(())
}

#[cfg(not(unix))]
fn disable_hangup_on_close(_serial_stream: &SerialStream) -> Result<(), SerialPortError> {
    Ok(())
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyUSBx` on unix, and `COMx` on Windows.
    pub fn new(tty: &str) -> Self {
        Self {
            path: tty.to_string(),
            ..Default::default()
        }
    }

    /// Set the serial port builder's baud.
    /// Will use 115_200 if not set.
    pub fn set_baud(mut self, baud: u32) -> Self {
        self.baud = Some(baud);
        self
    }

    /// Set the flow control.
    /// Will use none if not set.
    pub fn set_flow_control(mut self, flow_control: serialport::FlowControl) -> Self {
        self.flow_control = Some(flow_control);
        self
    }

    /// Set the [`LinesCodec`] to use.
    pub fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.line_codec = Some(codec);
        self
    }

    /// Open the port and start moving lines to and from it.
    pub async fn build(self) -> Result<SerialPort, Error> {
        let baud = self.baud.unwrap_or(115_200);
        let flow_control = self.flow_control.unwrap_or(serialport::FlowControl::None);

        info!(%self.path, %baud, ?flow_control, "Opening serial port");

        let serial_stream = try_create_serial_port(baud, flow_control, &self.path)?;
        disable_hangup_on_close(&serial_stream)?;

        let codec = self.line_codec.unwrap_or_default();
        let dispatcher = Dispatcher::new();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded();
        let token = CancellationToken::new();

        let worker_dispatcher = dispatcher.clone();
        let worker_token = token.clone();

        let worker = Worker::start_with_stop(
            &format!("tty {}", self.path),
            move |ready| {
                transfer_lines(
                    ready,
                    codec.framed(serial_stream),
                    worker_dispatcher,
                    outgoing_rx,
                    worker_token,
                )
            },
            move || {
                token.cancel();
                Ok(())
            },
        )
        .await?;

        Ok(SerialPort {
            path: self.path,
            dispatcher,
            outgoing: outgoing_tx,
            worker: Some(worker),
        })
    }
}

#[derive(Debug)]
enum Outgoing {
    Line(String),
    DataTerminalReady(bool),
}

/// Moves lines from the wire to the dispatcher, and queued lines onto the wire.
///
/// The dispatcher is closed when this returns, for whatever reason.
async fn transfer_lines(
    ready: Ready,
    mut framed: tokio_util::codec::Framed<SerialStream, LinesCodec>,
    dispatcher: Dispatcher<String>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    token: CancellationToken,
) -> Result<(), Error> {
    ready.signal();

    let result = loop {
        tokio::select! {
            _ = token.cancelled() => break Ok(()),
            incoming = framed.next() => match incoming {
                Some(Ok(line)) => {
                    info!("<== {line}");
                    if dispatcher.dispatch(line).is_err() {
                        break Ok(());
                    }
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Err(SerialPortError::Disconnected.into()),
            },
            request = outgoing.next() => match request {
                Some(Outgoing::Line(line)) => {
                    if let Err(e) = framed.send(line).await {
                        break Err(e.into());
                    }
                }
                Some(Outgoing::DataTerminalReady(level)) => {
                    debug!(%level, "DTR");
                    if let Err(e) = framed.get_mut().write_data_terminal_ready(level) {
                        break Err(SerialPortError::from(e).into());
                    }
                }
                None => break Ok(()),
            },
        }
    };

    dispatcher.close();
    result
}

/// Line based communication using a serial port.
///
/// Lines arriving on the port are dispatched to all [`Listener`]s.
/// Closing (or dropping) the port ends their stream.
#[derive(Debug)]
pub struct SerialPort {
    path: String,
    dispatcher: Dispatcher<String>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    worker: Option<Worker>,
}

impl SerialPort {
    /// How long DTR is held low when toggling it.
    pub const DTR_LOW_TIME: Duration = Duration::from_millis(100);

    /// Open a port with default settings.
    pub async fn open(tty: &str) -> Result<Self, Error> {
        SerialPortBuilder::new(tty).build().await
    }

    /// The path of the port.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn request(&self, request: Outgoing) -> Result<(), Error> {
        self.outgoing
            .unbounded_send(request)
            .map_err(|_| SerialPortError::Disconnected.into())
    }

    /// Pull DTR low for a while, then high again.
    ///
    /// Restarts boards wired to reset on DTR.
    pub async fn toggle_dtr(&self) -> Result<(), Error> {
        debug!("toggle_dtr");

        self.request(Outgoing::DataTerminalReady(false))?;
        tokio::time::sleep(Self::DTR_LOW_TIME).await;
        self.request(Outgoing::DataTerminalReady(true))
    }

    /// Stop the background transfer and wait for it to end.
    pub async fn close(mut self) {
        debug!(%self.path, "close");

        if let Some(worker) = self.worker.take() {
            worker.stop().await;
        }
        self.dispatcher.close();
    }
}

impl Port for SerialPort {
    fn send(&self, line: String) -> Result<(), Error> {
        info!("==> {line}");
        self.request(Outgoing::Line(line))
    }

    fn listen(&self) -> Listener<String> {
        self.dispatcher.listen()
    }
}

impl Reset for SerialPort {
    async fn reset(&self) -> Result<(), Error> {
        self.toggle_dtr().await
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!(%self.path, "Serial port dropped without being closed");
            self.dispatcher.close();
        }
    }
}
