//! The supervisor composition.
//!
//! [`run`] wires a [`SignalChannel`], a [`FsWatcher`] and a [`ProcessPool`]
//! into handlers, registers them with a [`Reactor`] and drives the process
//! through its lifecycle: fork the worker fleet, keep it at the target size,
//! and bring it down in order once a termination signal arrives.
//!
//! # Respawn policy
//!
//! A worker that terminates while the supervisor is running is replaced by
//! exactly one fresh fork, unconditionally: no restart limit, no backoff and
//! no distinction between a clean exit and a crash. Once shutdown has begun
//! no replacement is ever forked.
//!
//! # Shutdown
//!
//! The first terminate-class signal ([`Signal::should_terminate`]) moves the
//! supervisor to `ShuttingDown` and forwards that same signal to every live
//! worker; further terminate-class signals are no-ops. Once the last worker
//! is reaped the supervisor terminates and [`run`] returns successfully. No
//! bounded wait is imposed on the workers, the supervisor waits indefinitely
//! for the reaps.

use std::io;
use std::path::PathBuf;

use log::{debug, info};
use mio::{Interest, Registry, Token};

use crate::pool::ProcessPool;
use crate::reactor::{Control, Handler, Reactor};
use crate::signal::{Signal, SignalChannel};
use crate::watch::{FsEvent, FsWatcher};
use crate::{worker, Error};

/// Supervisor configuration, fixed at construction.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of worker processes to keep alive.
    pub workers: usize,
    /// Directory watched for content changes.
    pub watch_dir: PathBuf,
}

/// Supervisor lifecycle state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    /// The pool is maintained at its target size.
    Running,
    /// Termination was requested and forwarded; no new workers are forked.
    ShuttingDown,
    /// The pool is empty. Absorbing.
    Terminated,
}

/// State shared by the supervisor's handlers.
struct Supervisor {
    state: State,
    pool: ProcessPool,
    /// Entry point respawned workers divert into.
    child_main: fn() -> !,
}

impl Supervisor {
    /// Collect every worker that has terminated since the last child state
    /// change, applying the respawn policy to each.
    fn reap(&mut self) -> Result<(), Error> {
        while let Some(reaped) = self.pool.try_reap().map_err(Error::reap)? {
            debug!(
                "reaped worker process: pid={}, status={}",
                reaped.pid, reaped.status
            );
            if self.state == State::Running {
                let _ = self.pool.spawn(self.child_main).map_err(Error::fork)?;
            }
        }
        self.check_terminated();
        Ok(())
    }

    /// Begin shutdown in response to `signal`, forwarding it to all workers.
    ///
    /// A no-op if the supervisor is already past `Running`.
    fn shutdown(&mut self, signal: Signal) {
        if self.state != State::Running {
            return;
        }
        info!("shutting down: signal={:#}", signal);
        self.state = State::ShuttingDown;
        self.pool.signal_all(signal);
        self.check_terminated();
    }

    fn check_terminated(&mut self) {
        if self.state == State::ShuttingDown && self.pool.is_empty() {
            info!("all workers stopped, terminating");
            self.state = State::Terminated;
        }
    }

    fn control(&self) -> Control {
        if self.state == State::Terminated {
            Control::Stop
        } else {
            Control::Continue
        }
    }
}

/// Handler draining the supervisor's signal channel.
struct ParentSignalHandler {
    signals: SignalChannel,
}

impl Handler<Supervisor> for ParentSignalHandler {
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.signals, token, Interest::READABLE)
    }

    fn handle(&mut self, supervisor: &mut Supervisor) -> Result<Control, Error> {
        while let Some(signal) = self.signals.receive().map_err(Error::receive_signal)? {
            match signal {
                Signal::Child => supervisor.reap()?,
                signal => supervisor.shutdown(signal),
            }
        }
        Ok(supervisor.control())
    }
}

/// Handler draining the watched directory's change events.
struct FsChangeHandler<F> {
    watcher: FsWatcher,
    react: F,
}

impl<F: FnMut(&FsEvent)> Handler<Supervisor> for FsChangeHandler<F> {
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.watcher, token, Interest::READABLE)
    }

    fn handle(&mut self, supervisor: &mut Supervisor) -> Result<Control, Error> {
        while let Some(event) = self.watcher.receive().map_err(Error::receive_fs_event)? {
            debug!("filesystem change observed: {}", event);
            (self.react)(&event);
        }
        Ok(supervisor.control())
    }
}

/// Run a supervisor to completion.
///
/// Forks `config.workers` worker processes, maintains the fleet at that size
/// and reacts to content changes of `config.watch_dir` by calling
/// `on_change` once per observed event, in OS report order. Returns once a
/// termination signal has been received and the whole fleet is reaped; an
/// `Ok(())` return means the process can exit with success status.
///
/// # Notes
///
/// The initialisation order is part of the contract:
///
/// 1. the signal channel is opened first, so every forked worker inherits
///    the signal mask and no signal is lost between fork and the worker
///    opening its own channel;
/// 2. the whole initial fleet is forked next;
/// 3. the filesystem watch is created after the forks, it belongs to the
///    supervisor alone and must not leak into the initial fleet;
/// 4. the reactor, and with it the poll instance, is created last: forking a
///    process with a live poll instance leaves the copy's state undefined.
///
/// Workers respawned later (the pool is self-healing) are necessarily forked
/// while the reactor exists; they never touch the inherited descriptors and
/// immediately build their own fresh composition, see [`worker::main`].
pub fn run<F>(config: Config, on_change: F) -> Result<(), Error>
where
    F: FnMut(&FsEvent) + 'static,
{
    let signals = SignalChannel::new().map_err(Error::new_signal_channel)?;

    let mut pool = ProcessPool::new(config.workers);
    pool.fill(worker::main).map_err(Error::fork)?;
    info!("supervising worker processes: workers={}", pool.len());

    let watcher = FsWatcher::new(&config.watch_dir).map_err(Error::new_watcher)?;

    let mut reactor = Reactor::new().map_err(Error::new_reactor)?;
    reactor
        .register(ParentSignalHandler { signals })
        .map_err(Error::registering)?;
    reactor
        .register(FsChangeHandler {
            watcher,
            react: on_change,
        })
        .map_err(Error::registering)?;

    let mut supervisor = Supervisor {
        state: State::Running,
        pool,
        child_main: worker::main,
    };
    reactor.run(&mut supervisor)
}
