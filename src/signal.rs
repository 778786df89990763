//! Process signal handling.
//!
//! The [`SignalChannel`] turns a fixed set of asynchronous process signals
//! into a pollable stream of [`Signal`] values, backed by `signalfd(2)`.
//! Creating a channel diverts the signals from their default disposition for
//! the whole process: from that point on they are only observable by reading
//! the channel.

use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::{fmt, io};

use log::trace;
use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow};
use nix::sys::signalfd::{SfdFlags, SignalFd};

/// Process signal.
///
/// All variants are diverted from their default disposition by
/// [`SignalChannel::new`] and become observable by reading the channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    /// Interrupt signal.
    ///
    /// This signal is received by the process when its controlling terminal
    /// wishes to interrupt the process. This signal will for example be send
    /// when Ctrl+C is pressed in most terminals.
    ///
    /// Corresponds to POSIX signal `SIGINT`.
    Interrupt,
    /// Termination request signal.
    ///
    /// This signal received when the process is requested to terminate. This
    /// allows the process to perform nice termination, releasing resources and
    /// saving state if appropriate. This signal will be send when using the
    /// `kill` command for example.
    ///
    /// Corresponds to POSIX signal `SIGTERM`.
    Terminate,
    /// Terminal quit signal.
    ///
    /// This signal is received when the process is requested to quit and
    /// perform a core dump.
    ///
    /// Corresponds to POSIX signal `SIGQUIT`.
    Quit,
    /// Child state change signal.
    ///
    /// This signal is generated by the OS when the state of one of the
    /// process' children changes, most notably when a child terminates.
    ///
    /// Corresponds to POSIX signal `SIGCHLD`.
    Child,
}

impl Signal {
    /// All signals supervised through a [`SignalChannel`].
    pub const ALL: [Signal; 4] = [
        Signal::Interrupt,
        Signal::Terminate,
        Signal::Quit,
        Signal::Child,
    ];

    /// Convert a raw signal number, as read from the channel, into a `Signal`.
    fn from_raw(signo: i32) -> Option<Signal> {
        use nix::sys::signal::Signal::{SIGCHLD, SIGINT, SIGQUIT, SIGTERM};
        match nix::sys::signal::Signal::try_from(signo) {
            Ok(SIGINT) => Some(Signal::Interrupt),
            Ok(SIGTERM) => Some(Signal::Terminate),
            Ok(SIGQUIT) => Some(Signal::Quit),
            Ok(SIGCHLD) => Some(Signal::Child),
            _ => None,
        }
    }

    /// Convert the `Signal` into the OS signal it corresponds to.
    pub(crate) const fn into_raw(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal::{SIGCHLD, SIGINT, SIGQUIT, SIGTERM};
        match self {
            Signal::Interrupt => SIGINT,
            Signal::Terminate => SIGTERM,
            Signal::Quit => SIGQUIT,
            Signal::Child => SIGCHLD,
        }
    }

    /// Whether or not the `Signal` requests termination of the receiving
    /// process.
    pub const fn should_terminate(self) -> bool {
        !matches!(self, Signal::Child)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alternate = f.alternate();
        f.write_str(match (self, alternate) {
            (Signal::Interrupt, false) => "interrupt",
            (Signal::Interrupt, true) => "interrupt (SIGINT)",
            (Signal::Terminate, false) => "terminate",
            (Signal::Terminate, true) => "terminate (SIGTERM)",
            (Signal::Quit, false) => "quit",
            (Signal::Quit, true) => "quit (SIGQUIT)",
            (Signal::Child, false) => "child state change",
            (Signal::Child, true) => "child state change (SIGCHLD)",
        })
    }
}

/// Channel receiving process signals as readable events.
///
/// The channel can be registered with a [`Reactor`] (it implements
/// [`mio::event::Source`]) and becomes readable whenever one of the signals in
/// [`Signal::ALL`] is delivered to the process.
///
/// [`Reactor`]: crate::reactor::Reactor
///
/// # Notes
///
/// In the supervisor the channel must be created *before* forking any worker,
/// so that the workers inherit the signal mask and no signal is lost between
/// the fork and the worker opening its own channel.
pub struct SignalChannel {
    fd: SignalFd,
}

impl fmt::Debug for SignalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalChannel")
            .field("fd", &self.raw_fd())
            .finish()
    }
}

impl SignalChannel {
    /// Open a channel for [`Signal::ALL`].
    ///
    /// This blocks the default disposition of the signals for the entire
    /// process and opens a non-blocking, close-on-exec `signalfd(2)` for
    /// them. The mask remains in place for the lifetime of the process,
    /// including across forks.
    pub fn new() -> io::Result<SignalChannel> {
        trace!("setting up signal handling: signals={:?}", Signal::ALL);
        let mut set = SigSet::empty();
        for signal in Signal::ALL {
            set.add(signal.into_raw());
        }
        // Block the signals so that they aren't handled according to their
        // default dispositions.
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), None).map_err(io::Error::from)?;
        let fd = SignalFd::with_flags(&set, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
            .map_err(io::Error::from)?;
        Ok(SignalChannel { fd })
    }

    /// Receive a single pending signal, if any.
    ///
    /// Returns `Ok(None)` once all pending signals are drained, it never
    /// blocks.
    pub fn receive(&mut self) -> io::Result<Option<Signal>> {
        loop {
            match self.fd.read_signal() {
                Ok(Some(info)) => match Signal::from_raw(info.ssi_signo as i32) {
                    Some(signal) => return Ok(Some(signal)),
                    // Not a signal we supervise, keep draining.
                    None => continue,
                },
                Ok(None) => return Ok(None),
                Err(err) => return Err(io::Error::from(err)),
            }
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.fd.as_fd().as_raw_fd()
    }
}

impl Source for SignalChannel {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.raw_fd()).register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.raw_fd()).reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.raw_fd()).deregister(registry)
    }
}
