//! The supervisor's pool of worker processes.
//!
//! The [`ProcessPool`] tracks the set of live worker processes and the target
//! pool size. It owns all forking, reaping and signal forwarding; the respawn
//! *policy* (whether a reaped worker is replaced) lives with the supervisor,
//! which owns the pool.

use std::{fmt, io};

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::Signal;

/// One live worker process.
#[derive(Debug)]
struct Child {
    pid: Pid,
}

/// The set of live worker processes plus the target pool size.
///
/// Invariants: no two tracked workers share a pid, and a worker is removed
/// from the pool the moment it is reaped.
#[derive(Debug)]
pub struct ProcessPool {
    children: Vec<Child>,
    target: usize,
}

/// A worker collected after termination.
#[derive(Copy, Clone, Debug)]
pub struct Reaped {
    /// Pid the worker had while it was alive.
    pub pid: Pid,
    /// How the worker terminated.
    pub status: ExitStatus,
}

/// How a worker terminated.
///
/// The supervisor treats both variants identically (see the respawn policy in
/// the [supervisor] documentation), this only feeds diagnostics.
///
/// [supervisor]: crate::supervisor
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// Exited on its own with the given exit code.
    Exited(i32),
    /// Killed by the signal with the given number.
    Signaled(i32),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {code}"),
            ExitStatus::Signaled(signo) => write!(f, "killed by signal {signo}"),
        }
    }
}

impl ProcessPool {
    /// Create an empty pool with `target` as target size.
    pub const fn new(target: usize) -> ProcessPool {
        ProcessPool {
            children: Vec::new(),
            target,
        }
    }

    /// Returns the target pool size, fixed at construction.
    pub const fn target(&self) -> usize {
        self.target
    }

    /// Returns the number of live tracked workers.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if no live workers are tracked.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns `true` if `pid` is a live tracked worker.
    pub fn contains(&self, pid: Pid) -> bool {
        self.children.iter().any(|child| child.pid == pid)
    }

    /// Returns the pids of all live tracked workers.
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.children.iter().map(|child| child.pid)
    }

    /// Fork a single new worker.
    ///
    /// The child process diverges into `child_main` and never returns; the
    /// parent tracks the child and returns its pid.
    pub fn spawn(&mut self, child_main: fn() -> !) -> io::Result<Pid> {
        // Safety: the supervisor is single-threaded, so no lock or allocator
        // state can be left mid-update in the child.
        match unsafe { fork() }.map_err(io::Error::from)? {
            ForkResult::Child => child_main(),
            ForkResult::Parent { child } => {
                debug!("forked worker process: pid={}", child);
                debug_assert!(!self.contains(child));
                self.children.push(Child { pid: child });
                Ok(child)
            }
        }
    }

    /// Fork workers until the pool is at its target size.
    pub fn fill(&mut self, child_main: fn() -> !) -> io::Result<()> {
        while self.children.len() < self.target {
            let _ = self.spawn(child_main)?;
        }
        Ok(())
    }

    /// Collect a single terminated worker without blocking.
    ///
    /// The reaped worker is removed from the pool. Returns `Ok(None)` once no
    /// terminated worker remains to collect; a worker that has not terminated
    /// (yet) is not an error.
    pub fn try_reap(&mut self) -> io::Result<Option<Reaped>> {
        loop {
            let status = match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => status,
                // No children at all.
                Err(Errno::ECHILD) => return Ok(None),
                Err(err) => return Err(io::Error::from(err)),
            };
            let reaped = match status {
                WaitStatus::StillAlive => return Ok(None),
                WaitStatus::Exited(pid, code) => Reaped {
                    pid,
                    status: ExitStatus::Exited(code),
                },
                WaitStatus::Signaled(pid, signal, _) => Reaped {
                    pid,
                    status: ExitStatus::Signaled(signal as i32),
                },
                // Stopped or continued workers are still alive.
                _ => continue,
            };
            self.remove(reaped.pid);
            return Ok(Some(reaped));
        }
    }

    fn remove(&mut self, pid: Pid) {
        match self.children.iter().position(|child| child.pid == pid) {
            Some(index) => {
                let _ = self.children.swap_remove(index);
            }
            None => debug!("reaped untracked child process: pid={}", pid),
        }
    }

    /// Forward `signal` to every worker in the pool.
    pub fn signal_all(&self, signal: Signal) {
        for child in &self.children {
            debug!(
                "forwarding process signal to worker: signal={}, pid={}",
                signal, child.pid
            );
            if let Err(err) = kill(child.pid, signal.into_raw()) {
                // The worker beat us to the exit; the pending reap covers it.
                error!(
                    "failed to forward signal to worker: {}: pid={}",
                    err, child.pid
                );
            }
        }
    }
}
