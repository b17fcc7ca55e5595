//! Notice when the device restarts while nobody expected it to.
//!
//! The detector listens to every line for the whole session. A restart is not
//! reported as an error when seen: it is recorded, and tests check for it between
//! themselves via [`RestartDetector::check_restart_found_and_clear`].

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    port::Port,
    protocol::BOOTING,
    stream::Listener,
    worker::{Ready, Worker},
};

#[derive(Debug)]
struct State {
    restart_found: bool,
    restarts_allowed: bool,

    // Open allow scopes, outermost first: the scope id and the value to restore on exit.
    scopes: Vec<(u64, bool)>,
    next_scope: u64,

    boots_seen: watch::Sender<usize>,
}

impl State {
    fn new() -> Self {
        Self {
            restart_found: false,
            restarts_allowed: false,
            scopes: Vec::new(),
            next_scope: 0,
            boots_seen: watch::channel(0).0,
        }
    }

    fn restarts_allowed(&self) -> bool {
        self.restarts_allowed
    }

    fn enter_scope(&mut self) -> u64 {
        let id = self.next_scope;
        self.next_scope += 1;

        self.scopes.push((id, self.restarts_allowed));
        self.restarts_allowed = true;

        id
    }

    /// Restores the value from before the scope was entered.
    /// Scopes entered after it are ended too, so they restore nothing later.
    fn exit_scope(&mut self, id: u64) {
        if let Some(position) = self.scopes.iter().position(|(scope, _)| *scope == id) {
            self.restarts_allowed = self.scopes[position].1;
            self.scopes.truncate(position);
        }
    }

    fn saw_boot(&mut self) {
        self.boots_seen.send_modify(|boots| *boots += 1);

        if self.restarts_allowed() {
            info!("Restart detected, restarts are allowed");
        } else {
            warn!("Unexpected restart detected");
            self.restart_found = true;
        }
    }
}

/// Watches for the boot marker in the background.
#[derive(Debug)]
pub struct RestartDetector {
    state: Arc<Mutex<State>>,
    worker: Worker,
}

/// Restarts are allowed while this is alive.
/// See [`RestartDetector::allow_restarts`].
#[must_use = "restarts are only allowed while this is alive"]
#[derive(Debug)]
pub struct AllowRestarts {
    state: Arc<Mutex<State>>,
    scope: u64,
}

impl Drop for AllowRestarts {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.exit_scope(self.scope);

        debug!(allowed = state.restarts_allowed(), "Leaving allowed restarts scope");
    }
}

impl RestartDetector {
    // The listener is only read to wake up now and then,
    // ending the stream or stopping the detector wakes it up sooner.
    const POLL: Duration = Duration::from_secs(60);

    /// Start watching the lines coming from `port`.
    ///
    /// Lines arriving after this returns are guaranteed to be seen.
    pub async fn start<P: Port>(port: &P) -> Result<Self, Error> {
        let state = Arc::new(Mutex::new(State::new()));
        let token = CancellationToken::new();

        let lines = port.listen();
        let worker_state = Arc::clone(&state);
        let worker_token = token.clone();

        let worker = Worker::start_with_stop(
            "restart-detector",
            move |ready| Self::watch(ready, lines, worker_state, worker_token),
            move || {
                token.cancel();
                Ok(())
            },
        )
        .await?;

        Ok(Self { state, worker })
    }

    async fn watch(
        ready: Ready,
        mut lines: Listener<String>,
        state: Arc<Mutex<State>>,
        token: CancellationToken,
    ) -> Result<(), Error> {
        ready.signal();

        loop {
            let line = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Stopped");
                    return Ok(());
                }
                line = lines.next(Self::POLL) => line,
            };

            match line {
                Ok(line) if line == BOOTING => {
                    state.lock().saw_boot();
                }
                Ok(_) | Err(Error::Timeout { .. }) => {}
                Err(Error::EndOfStream) => {
                    debug!("End of stream");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Was an unexpected restart seen since last time we checked?
    pub fn check_restart_found_and_clear(&self) -> bool {
        std::mem::take(&mut self.state.lock().restart_found)
    }

    /// Don't flag restarts while the returned guard is alive.
    ///
    /// Dropping the guard restores whether restarts were allowed before it was taken.
    /// When scopes overlap, the outermost one decides: once it ends, scopes
    /// entered after it no longer allow anything.
    pub fn allow_restarts(&self) -> AllowRestarts {
        let scope = self.state.lock().enter_scope();
        debug!(%scope, "Entering allowed restarts scope");

        AllowRestarts {
            state: Arc::clone(&self.state),
            scope,
        }
    }

    /// Are restarts allowed right now?
    pub fn restarts_allowed(&self) -> bool {
        self.state.lock().restarts_allowed()
    }

    /// How many boot markers were seen, expected or not.
    pub fn boots_seen(&self) -> usize {
        *self.state.lock().boots_seen.borrow()
    }

    /// Wait until at least `boots` boot markers have been seen in total.
    ///
    /// When this returns, those boots have been judged as expected or not.
    pub async fn wait_for_boots(&self, boots: usize, timeout: Duration) -> Result<(), Error> {
        let mut seen = self.state.lock().boots_seen.subscribe();

        let waited = tokio::time::timeout(timeout, async {
            seen.wait_for(|seen| *seen >= boots).await.map(|_| ())
        })
        .await;

        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::EndOfStream),
            Err(_elapsed) => Err(Error::Timeout { timeout }),
        }
    }

    /// Is the background watcher still running?
    ///
    /// It stops by itself when the stream ends.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop watching.
    pub async fn stop(self) {
        self.worker.stop().await;
    }
}
