//! Process-level tests for the supervisor composition.
//!
//! This binary runs without the default test harness: the scenarios fork
//! real supervisor processes and reap them with `waitpid`, which requires
//! full control over the threads and children of the test process. Worker
//! fleets are observed through `/proc/<pid>/task/<pid>/children`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs, process, thread};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use warden::supervisor::{self, Config};

const TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() {
    pool_reaches_target_size();
    killed_worker_is_replaced();
    terminate_converges_with_success();
    repeated_termination_signals_are_idempotent();
    filesystem_event_is_delivered();
    println!("all supervisor tests ok");
}

/// Fork a supervisor process with `workers` workers watching `watch_dir`.
///
/// The configured reaction appends each filesystem event to `event_log`,
/// when given.
fn spawn_supervisor(workers: usize, watch_dir: &Path, event_log: Option<PathBuf>) -> Pid {
    match unsafe { fork() }.expect("failed to fork supervisor") {
        ForkResult::Parent { child } => child,
        ForkResult::Child => {
            let config = Config {
                workers,
                watch_dir: watch_dir.to_owned(),
            };
            let result = supervisor::run(config, move |event| {
                if let Some(ref path) = event_log {
                    let mut file = fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .expect("failed to open event log");
                    writeln!(file, "{}", event).expect("failed to write event log");
                }
            });
            process::exit(if result.is_ok() { 0 } else { 1 });
        }
    }
}

/// Current worker pids of the supervisor `pid`.
fn workers_of(pid: Pid) -> Vec<i32> {
    let path = format!("/proc/{}/task/{}/children", pid, pid);
    match fs::read_to_string(path) {
        Ok(contents) => contents
            .split_whitespace()
            .filter_map(|pid| pid.parse().ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Wait until `predicate` holds for the worker fleet of `pid`.
fn await_workers<F>(pid: Pid, what: &str, predicate: F) -> Vec<i32>
where
    F: Fn(&[i32]) -> bool,
{
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let workers = workers_of(pid);
        if predicate(&workers) {
            return workers;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {what}, last seen workers: {workers:?}"
        );
        thread::sleep(POLL_INTERVAL);
    }
}

/// Wait for the supervisor `pid` to exit and return its exit code.
fn await_exit(pid: Pid) -> i32 {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)).expect("failed to wait for supervisor") {
            WaitStatus::StillAlive => {
                if Instant::now() >= deadline {
                    let _ = kill(pid, Signal::SIGKILL);
                    let _ = waitpid(pid, None);
                    panic!("timed out waiting for supervisor {pid} to exit");
                }
                thread::sleep(POLL_INTERVAL);
            }
            WaitStatus::Exited(_, code) => return code,
            status => panic!("supervisor stopped unexpectedly: {status:?}"),
        }
    }
}

/// Create a fresh directory in the OS temporary directory.
fn test_dir(name: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("warden_test_{}_{}", process::id(), name));
    let _ = fs::remove_dir_all(&path);
    fs::create_dir_all(&path).expect("failed to create test directory");
    path
}

fn assert_unique(workers: &[i32]) {
    for (i, pid) in workers.iter().enumerate() {
        assert!(
            !workers[i + 1..].contains(pid),
            "duplicate worker pid {pid} in {workers:?}"
        );
    }
}

fn pool_reaches_target_size() {
    let dir = test_dir("pool_size");
    let supervisor = spawn_supervisor(3, &dir, None);

    let workers = await_workers(supervisor, "3 workers", |workers| workers.len() == 3);
    assert_unique(&workers);

    kill(supervisor, Signal::SIGTERM).expect("failed to signal supervisor");
    assert_eq!(await_exit(supervisor), 0);
    let _ = fs::remove_dir_all(&dir);
    println!("ok - pool reaches target size");
}

fn killed_worker_is_replaced() {
    let dir = test_dir("respawn");
    let supervisor = spawn_supervisor(3, &dir, None);
    let workers = await_workers(supervisor, "3 workers", |workers| workers.len() == 3);

    let victim = workers[0];
    kill(Pid::from_raw(victim), Signal::SIGKILL).expect("failed to kill worker");
    let replaced = await_workers(supervisor, "replacement worker", |workers| {
        workers.len() == 3 && !workers.contains(&victim)
    });
    assert_unique(&replaced);
    // Exactly one replacement: the surviving workers are untouched.
    assert!(replaced.contains(&workers[1]));
    assert!(replaced.contains(&workers[2]));

    kill(supervisor, Signal::SIGTERM).expect("failed to signal supervisor");
    assert_eq!(await_exit(supervisor), 0);
    let _ = fs::remove_dir_all(&dir);
    println!("ok - killed worker is replaced");
}

fn terminate_converges_with_success() {
    let dir = test_dir("shutdown");
    let supervisor = spawn_supervisor(3, &dir, None);
    let _ = await_workers(supervisor, "3 workers", |workers| workers.len() == 3);

    // All three workers receive the forwarded signal and exit; none may be
    // replaced during shutdown, or the supervisor would keep running.
    kill(supervisor, Signal::SIGTERM).expect("failed to signal supervisor");
    assert_eq!(await_exit(supervisor), 0);
    let _ = fs::remove_dir_all(&dir);
    println!("ok - terminate converges with success");
}

fn repeated_termination_signals_are_idempotent() {
    let dir = test_dir("idempotent");
    let supervisor = spawn_supervisor(2, &dir, None);
    let _ = await_workers(supervisor, "2 workers", |workers| workers.len() == 2);

    // Two terminate-class signals in quick succession: shutdown happens
    // once and still converges cleanly.
    kill(supervisor, Signal::SIGINT).expect("failed to signal supervisor");
    kill(supervisor, Signal::SIGQUIT).expect("failed to signal supervisor");
    assert_eq!(await_exit(supervisor), 0);
    let _ = fs::remove_dir_all(&dir);
    println!("ok - repeated termination signals are idempotent");
}

fn filesystem_event_is_delivered() {
    let dir = test_dir("fs_watch");
    // The event log lives outside the watched directory, so appending to it
    // generates no further events.
    let log_dir = test_dir("fs_log");
    let event_log = log_dir.join("events");
    let supervisor = spawn_supervisor(1, &dir, Some(event_log.clone()));
    let _ = await_workers(supervisor, "1 worker", |workers| workers.len() == 1);

    // The watch is created just after the forks; probe until the first
    // event makes it to the log, which proves the watch is live.
    let deadline = Instant::now() + TIMEOUT;
    let mut probes = 0;
    loop {
        probes += 1;
        fs::write(dir.join(format!("probe{probes}")), b"").expect("failed to create probe file");
        thread::sleep(POLL_INTERVAL);
        if fs::read_to_string(&event_log).is_ok_and(|contents| !contents.is_empty()) {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for a filesystem event"
        );
    }

    // With the watch live, one created file yields exactly one event naming
    // that file, observed before the reactor blocks again.
    fs::write(dir.join("final"), b"").expect("failed to create probe file");
    let expected = "created: \"final\"";
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let contents = fs::read_to_string(&event_log).unwrap_or_default();
        if contents.lines().any(|line| line == expected) {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for the final event, log: {contents:?}"
        );
        thread::sleep(POLL_INTERVAL);
    }
    thread::sleep(Duration::from_millis(100));
    let contents = fs::read_to_string(&event_log).expect("failed to read event log");
    assert_eq!(
        contents.lines().filter(|line| *line == expected).count(),
        1,
        "expected exactly one event for the final file, log: {contents:?}"
    );

    kill(supervisor, Signal::SIGTERM).expect("failed to signal supervisor");
    assert_eq!(await_exit(supervisor), 0);
    let _ = fs::remove_dir_all(&dir);
    let _ = fs::remove_dir_all(&log_dir);
    println!("ok - filesystem event is delivered");
}
