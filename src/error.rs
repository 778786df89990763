//! Module containing the supervisor error types.

use std::{fmt, io};

/// Error returned by running a [supervisor] or [worker].
///
/// Every variant names the syscall-level operation that failed; all of them
/// indicate the process can no longer fulfill its supervisory contract and
/// are therefore fatal.
///
/// [supervisor]: crate::supervisor::run
/// [worker]: crate::worker::run
pub struct Error {
    inner: ErrorInner,
}

/// Inside of `Error` error.
enum ErrorInner {
    /// Error creating the signal channel.
    NewSignalChannel(io::Error),
    /// Error creating the filesystem watcher.
    NewWatcher(io::Error),
    /// Error creating the reactor.
    NewReactor(io::Error),
    /// Error registering an event source with the reactor.
    Registering(io::Error),
    /// Error polling for OS events.
    Polling(io::Error),
    /// Error reading from the signal channel.
    ReceiveSignal(io::Error),
    /// Error reading from the filesystem watcher.
    ReceiveFsEvent(io::Error),
    /// Error forking a worker process.
    Fork(io::Error),
    /// Error reaping a worker process.
    Reap(io::Error),
}

impl Error {
    const DESC: &'static str = "error running warden";

    pub(crate) const fn new_signal_channel(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::NewSignalChannel(err),
        }
    }

    pub(crate) const fn new_watcher(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::NewWatcher(err),
        }
    }

    pub(crate) const fn new_reactor(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::NewReactor(err),
        }
    }

    pub(crate) const fn registering(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::Registering(err),
        }
    }

    pub(crate) const fn polling(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::Polling(err),
        }
    }

    pub(crate) const fn receive_signal(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::ReceiveSignal(err),
        }
    }

    pub(crate) const fn receive_fs_event(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::ReceiveFsEvent(err),
        }
    }

    pub(crate) const fn fork(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::Fork(err),
        }
    }

    pub(crate) const fn reap(err: io::Error) -> Error {
        Error {
            inner: ErrorInner::Reap(err),
        }
    }
}

/// We implement [`Debug`] by using the [`Display`] implementation because the
/// [`Termination`] trait uses `Debug` rather then `Display` when returning an
/// `Result`.
///
/// [`Termination`]: std::process::Termination
/// [`Debug`]: std::fmt::Debug
/// [`Display`]: std::fmt::Display
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ErrorInner::*;
        match self.inner {
            NewSignalChannel(ref err) => {
                write!(f, "{}: error creating signal channel: {}", Self::DESC, err)
            }
            NewWatcher(ref err) => write!(
                f,
                "{}: error creating filesystem watcher: {}",
                Self::DESC,
                err
            ),
            NewReactor(ref err) => write!(f, "{}: error creating reactor: {}", Self::DESC, err),
            Registering(ref err) => {
                write!(f, "{}: error registering event source: {}", Self::DESC, err)
            }
            Polling(ref err) => write!(f, "{}: error polling for OS events: {}", Self::DESC, err),
            ReceiveSignal(ref err) => write!(
                f,
                "{}: error receiving process signal: {}",
                Self::DESC,
                err
            ),
            ReceiveFsEvent(ref err) => write!(
                f,
                "{}: error receiving filesystem event: {}",
                Self::DESC,
                err
            ),
            Fork(ref err) => write!(f, "{}: error forking worker process: {}", Self::DESC, err),
            Reap(ref err) => write!(f, "{}: error reaping worker process: {}", Self::DESC, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use ErrorInner::*;
        match self.inner {
            NewSignalChannel(ref err)
            | NewWatcher(ref err)
            | NewReactor(ref err)
            | Registering(ref err)
            | Polling(ref err)
            | ReceiveSignal(ref err)
            | ReceiveFsEvent(ref err)
            | Fork(ref err)
            | Reap(ref err) => Some(err),
        }
    }
}
