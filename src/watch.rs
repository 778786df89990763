//! Filesystem change notification.
//!
//! The [`FsWatcher`] turns content changes of a single directory into a
//! pollable stream of [`FsEvent`]s, backed by `inotify(7)`. The watch is not
//! recursive, only direct entries of the watched directory are reported.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;
use std::{fmt, io};

use log::trace;
use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, InotifyEvent};

/// Kind of change observed in a watched directory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FsEventKind {
    /// An entry was created in, or moved into, the directory.
    Created,
    /// An entry was modified.
    Modified,
    /// An entry was removed from the directory.
    Removed,
}

/// A single change to the contents of a watched directory.
#[derive(Clone, Debug)]
pub struct FsEvent {
    /// Name of the changed entry, relative to the watched directory.
    ///
    /// This is `None` for events concerning the watched directory itself.
    pub name: Option<OsString>,
    /// What changed.
    pub kind: FsEventKind,
}

impl fmt::Display for FsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FsEventKind::Created => "created",
            FsEventKind::Modified => "modified",
            FsEventKind::Removed => "removed",
        };
        match self.name {
            Some(ref name) => write!(f, "{kind}: {:?}", name),
            None => f.write_str(kind),
        }
    }
}

/// Watcher turning changes to the contents of one directory into readable
/// events.
///
/// The watcher can be registered with a [`Reactor`] (it implements
/// [`mio::event::Source`]) and becomes readable whenever the OS reports a
/// change.
///
/// [`Reactor`]: crate::reactor::Reactor
pub struct FsWatcher {
    inner: Inotify,
    /// Events read from the OS, but not yet received by the handler.
    pending: VecDeque<FsEvent>,
}

impl fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsWatcher")
            .field("fd", &self.raw_fd())
            .field("pending", &self.pending)
            .finish()
    }
}

impl FsWatcher {
    /// Start watching the directory `dir` for content changes.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<FsWatcher> {
        let dir = dir.as_ref();
        trace!("setting up directory watch: path={}", dir.display());
        let inner = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .map_err(io::Error::from)?;
        let interest = AddWatchFlags::IN_CREATE
            | AddWatchFlags::IN_MOVED_TO
            | AddWatchFlags::IN_MODIFY
            | AddWatchFlags::IN_DELETE;
        let _ = inner.add_watch(dir, interest).map_err(io::Error::from)?;
        Ok(FsWatcher {
            inner,
            pending: VecDeque::new(),
        })
    }

    /// Receive a single pending filesystem event, if any.
    ///
    /// Events are returned in the order the OS reports them. Returns
    /// `Ok(None)` once all pending events are drained, it never blocks.
    pub fn receive(&mut self) -> io::Result<Option<FsEvent>> {
        if self.pending.is_empty() {
            match self.inner.read_events() {
                Ok(events) => self.pending.extend(events.into_iter().filter_map(convert)),
                // No events waiting to be read.
                Err(Errno::EAGAIN) => {}
                Err(err) => return Err(io::Error::from(err)),
            }
        }
        Ok(self.pending.pop_front())
    }

    fn raw_fd(&self) -> RawFd {
        self.inner.as_fd().as_raw_fd()
    }
}

fn convert(event: InotifyEvent) -> Option<FsEvent> {
    let kind = if event
        .mask
        .intersects(AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO)
    {
        FsEventKind::Created
    } else if event.mask.contains(AddWatchFlags::IN_MODIFY) {
        FsEventKind::Modified
    } else if event.mask.contains(AddWatchFlags::IN_DELETE) {
        FsEventKind::Removed
    } else {
        // E.g. `IN_IGNORED` when the watched directory itself is removed.
        return None;
    };
    Some(FsEvent {
        name: event.name,
        kind,
    })
}

impl Source for FsWatcher {
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
