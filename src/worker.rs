//! The worker composition.
//!
//! Workers run the same program image as the supervisor: a fork in the
//! supervisor diverges into [`main`], which builds the worker's own
//! [`SignalChannel`] and [`Reactor`] and waits until it is told to
//! terminate. The actual work a worker performs is outside the supervisor's
//! contract.

use std::{io, process};

use log::{debug, error};
use mio::{Interest, Registry, Token};

use crate::reactor::{Control, Handler, Reactor};
use crate::signal::SignalChannel;
use crate::Error;

/// Worker lifecycle state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    Active,
    Terminating,
}

struct Worker {
    state: State,
}

/// Handler draining the worker's signal channel.
struct ChildSignalHandler {
    signals: SignalChannel,
}

impl Handler<Worker> for ChildSignalHandler {
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.signals, token, Interest::READABLE)
    }

    fn handle(&mut self, worker: &mut Worker) -> Result<Control, Error> {
        while let Some(signal) = self.signals.receive().map_err(Error::receive_signal)? {
            if signal.should_terminate() {
                debug!("worker terminating: signal={:#}", signal);
                worker.state = State::Terminating;
            }
            // `Signal::Child` is not expected here, workers have no tracked
            // children of their own.
        }
        Ok(match worker.state {
            State::Active => Control::Continue,
            State::Terminating => Control::Stop,
        })
    }
}

/// Run a worker until it is told to terminate.
///
/// The worker opens a fresh signal channel: the signal mask inherited from
/// the supervisor already blocks the supervised signals, so none can be lost
/// before the channel exists.
pub fn run() -> Result<(), Error> {
    let signals = SignalChannel::new().map_err(Error::new_signal_channel)?;
    let mut reactor = Reactor::new().map_err(Error::new_reactor)?;
    reactor
        .register(ChildSignalHandler { signals })
        .map_err(Error::registering)?;

    debug!("worker process started: pid={}", process::id());
    let mut worker = Worker {
        state: State::Active,
    };
    reactor.run(&mut worker)
}

/// Entry point for forked workers.
///
/// Never returns: the process exits with success status once the worker is
/// told to terminate, or with failure status if the worker composition
/// cannot be set up.
pub fn main() -> ! {
    match run() {
        Ok(()) => process::exit(0),
        Err(err) => {
            error!("worker failed: {}", err);
            process::exit(1);
        }
    }
}
