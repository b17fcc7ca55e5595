use std::{future::Future, sync::Arc};

use crate::{error::Error, stream::Listener};

/// Bidirectional communication of values, usually lines of text.
///
/// Anyone with access to the port may send at any time.
///
/// Each consumer which wants to receive gets its own [`Listener`].
/// Receiving a value does not steal it from the other listeners:
/// all of them see all values dispatched while they are alive.
pub trait Port<T = String> {
    /// Send a value.
    fn send(&self, value: T) -> Result<(), Error>;

    /// Start listening to incoming values.
    fn listen(&self) -> Listener<T>;
}

impl<T, P: Port<T> + ?Sized> Port<T> for &P {
    fn send(&self, value: T) -> Result<(), Error> {
        (**self).send(value)
    }

    fn listen(&self) -> Listener<T> {
        (**self).listen()
    }
}

impl<T, P: Port<T> + ?Sized> Port<T> for Arc<P> {
    fn send(&self, value: T) -> Result<(), Error> {
        (**self).send(value)
    }

    fn listen(&self) -> Listener<T> {
        (**self).listen()
    }
}

/// Something able to restart the device on the other side of a port.
pub trait Reset {
    /// Trigger a restart. Returns when the restart has been triggered,
    /// not when the device is back up.
    fn reset(&self) -> impl Future<Output = Result<(), Error>>;
}

impl<R: Reset + ?Sized> Reset for &R {
    fn reset(&self) -> impl Future<Output = Result<(), Error>> {
        (**self).reset()
    }
}
