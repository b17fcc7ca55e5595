//! A pair of ports connected to each other, in memory.
//!
//! Whatever is sent on one end arrives at the listeners of the other end.
//! Used to put a simulated device on the other side of a port.
//!
//! Closing either end hangs up the whole pipe: listeners on both ends see the
//! end of the stream, and neither end can send anymore.

use std::fmt::Debug;

use tracing::trace;

use crate::{
    error::Error,
    port::Port,
    stream::{Dispatcher, Listener},
};

/// One end of a pipe, see [`pipe_port_pair`].
///
/// Dropping it closes the pipe.
#[derive(Debug)]
pub struct PipePort<T> {
    own: Dispatcher<T>,
    other: Dispatcher<T>,
}

/// Create two ports connected to each other.
pub fn pipe_port_pair<T>() -> (PipePort<T>, PipePort<T>) {
    let a = Dispatcher::new();
    let b = Dispatcher::new();

    (
        PipePort {
            own: a.clone(),
            other: b.clone(),
        },
        PipePort { own: b, other: a },
    )
}

impl<T> PipePort<T> {
    /// Hang up.
    pub fn close(&self) {
        self.own.close();
        self.other.close();
    }

    /// Has either end hung up?
    pub fn is_closed(&self) -> bool {
        self.own.is_closed() || self.other.is_closed()
    }
}

impl<T: Clone + Debug> Port<T> for PipePort<T> {
    fn send(&self, value: T) -> Result<(), Error> {
        trace!(?value, "Pipe send");
        self.other.dispatch(value)
    }

    fn listen(&self) -> Listener<T> {
        self.own.listen()
    }
}

impl<T> Drop for PipePort<T> {
    fn drop(&mut self) {
        self.close();
    }
}
