//! The event loop at the core of the supervisor and of every worker.
//!
//! A [`Reactor`] owns an OS readiness multiplexer ([`mio::Poll`]) and a set
//! of registered [`Handler`]s, each bound to one event source. [`Reactor::run`]
//! blocks until at least one source is ready and invokes the corresponding
//! handler once per ready source, then goes back to waiting.
//!
//! Both the supervisor process and every worker process run their own,
//! independent reactor; there is no intra-process concurrency.

use std::{fmt, io};

use log::{debug, trace};
use mio::{Events, Poll, Registry, Token};

use crate::Error;

/// Control flow returned by a [`Handler`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Control {
    /// Keep waiting for events.
    Continue,
    /// Stop the reactor once the current iteration completes.
    Stop,
}

/// A unit of work bound to one event source.
///
/// Implementations own their event source and register it for readable
/// interest in [`register`]. Once the source becomes ready the reactor calls
/// [`handle`], which must drain all records currently pending on the source
/// and nothing more: handlers run to completion without preemption, so any
/// blocking work starves every other source.
///
/// [`register`]: Handler::register
/// [`handle`]: Handler::handle
pub trait Handler<S> {
    /// Register the handler's event source with `registry` using `token`.
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()>;

    /// Perform a unit of work now that the handler's source is ready.
    fn handle(&mut self, state: &mut S) -> Result<Control, Error>;
}

/// Single-threaded event loop dispatching OS readiness to [`Handler`]s.
///
/// The reactor never inspects what kind of handler it holds, it only invokes
/// the uniform [`Handler`] entry points. State shared between the handlers,
/// of type `S`, is owned by the caller and passed into [`run`] by reference.
///
/// [`run`]: Reactor::run
pub struct Reactor<S> {
    poll: Poll,
    events: Events,
    /// Handlers, indexed by the [`Token`] their source was registered with.
    handlers: Vec<Box<dyn Handler<S>>>,
}

const EVENTS_CAPACITY: usize = 16;

impl<S> Reactor<S> {
    /// Create a new reactor.
    pub fn new() -> io::Result<Reactor<S>> {
        Ok(Reactor {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            handlers: Vec::new(),
        })
    }

    /// Register `handler`, attaching its event source to the reactor.
    pub fn register<H>(&mut self, mut handler: H) -> io::Result<()>
    where
        H: Handler<S> + 'static,
    {
        let token = Token(self.handlers.len());
        trace!("registering event source: token={}", token.0);
        handler.register(self.poll.registry(), token)?;
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    /// Run the event loop.
    ///
    /// Blocks until at least one registered source is ready, then invokes the
    /// handler of each ready source exactly once, in the order the OS reports
    /// readiness. This only returns once a handler returns [`Control::Stop`],
    /// after the iteration it was invoked in completes.
    pub fn run(&mut self, state: &mut S) -> Result<(), Error> {
        loop {
            trace!("polling for OS events");
            if let Err(err) = self.poll.poll(&mut self.events, None) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::polling(err));
            }

            let mut stop = false;
            for event in self.events.iter() {
                trace!("got OS event: {:?}", event);
                match self.handlers.get_mut(event.token().0) {
                    Some(handler) => {
                        if handler.handle(state)? == Control::Stop {
                            stop = true;
                        }
                    }
                    None => debug!("unexpected OS event: {:?}", event),
                }
            }

            if stop {
                return Ok(());
            }
        }
    }
}

impl<S> fmt::Debug for Reactor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("poll", &self.poll)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
