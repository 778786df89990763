//! Warden is a minimal Unix process supervisor.
//!
//! It forks a fixed-size pool of worker processes, keeps the pool at its
//! target size and coordinates shutdown cleanly across signals. Three kinds
//! of events drive it, each surfaced as a readable OS handle and multiplexed
//! by a single-threaded [reactor]:
//!
//!  * process signals, via `signalfd(2)` (see the [signal] module),
//!  * worker terminations, via `SIGCHLD` and non-blocking `waitpid(2)` (see
//!    the [pool] module),
//!  * content changes of one watched directory, via `inotify(7)` (see the
//!    [watch] module).
//!
//! The [supervisor] module composes these into the supervising process; the
//! [worker] module is the composition each forked child runs. The two
//! processes coordinate through signals and process exit only, there is no
//! shared memory and no explicit IPC channel.
//!
//! ## Logging
//!
//! Warden logs via the [`log`] crate. The library never installs a logger;
//! the binary uses [`std-logger`].
//!
//! [`log`]: https://crates.io/crates/log
//! [`std-logger`]: https://crates.io/crates/std_logger

#![warn(
    anonymous_parameters,
    bare_trait_objects,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    variant_size_differences
)]

mod error;

pub mod pool;
pub mod reactor;
pub mod signal;
pub mod supervisor;
pub mod watch;
pub mod worker;

pub use error::Error;
pub use signal::{Signal, SignalChannel};
