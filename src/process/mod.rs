//! Supervised execution of the platform process.
//!
//! The child's stdout and stderr are relayed to ours, our stdin is relayed to
//! the child, and everything started for the child is released when `run`
//! returns, whichever way it returns:
//!
//! ```text
//! spawn ──► pipes + SIGINT/SIGTERM flag ──► wait (exit | flag)
//!                                              │
//!                        Session::teardown ◄───┘  (also on drop)
//!                        unregister handlers
//!                        SIGTERM, grace, kill, reap
//!                        drain stdout/stderr, stop stdin
//! ```

pub mod pipe;

use crate::error::{Error, Result};
use signal_hook::SigId;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use pipe::StreamPipe;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_GRACE: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// A termination request arrived and the process was shut down.
    Terminated,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(status) => status.code(),
            Self::Terminated => None,
        }
    }
}

type Source = Box<dyn Read + Send>;
type Sink = Box<dyn Write + Send>;

/// Runs one external process to completion with relayed stdio.
pub struct ProcessSupervisor {
    stdin: Option<Source>,
    stdout: Sink,
    stderr: Sink,
    shutdown: Arc<AtomicBool>,
    handle_signals: bool,
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    /// Supervisor relaying this process's own stdio.
    pub fn new() -> Self {
        Self::with_streams(
            Some(Box::new(io::stdin())),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    /// Supervisor relaying the given streams; `stdin: None` closes the
    /// child's stdin immediately.
    pub fn with_streams(stdin: Option<Source>, stdout: Sink, stderr: Sink) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle_signals: true,
            grace: DEFAULT_GRACE,
        }
    }

    /// Do not install SIGINT/SIGTERM handlers; only the shutdown handle
    /// requests termination.
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Time between the termination request and a forced kill.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Flag that, once set, shuts the process down.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run `command_line` in `working_dir` and block until it ends.
    pub fn run(self, command_line: &[String], working_dir: &Path) -> Result<ExitOutcome> {
        let process_error = |reason: String, source: Option<io::Error>| Error::Process {
            working_dir: working_dir.to_path_buf(),
            reason,
            source: source.map(Into::into),
        };

        let Some((program, args)) = command_line.split_first() else {
            return Err(process_error("empty command line".to_string(), None));
        };

        let child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| process_error(format!("could not start up {program}"), Some(e)))?;
        info!("started platform process (pid {})", child.id());

        let mut session = Session::new(child, self.shutdown, self.grace);
        if self.handle_signals {
            session
                .register_signals()
                .map_err(|e| process_error("could not register signal handlers".to_string(), Some(e)))?;
        }
        session
            .connect(self.stdin, self.stdout, self.stderr)
            .map_err(|e| process_error("could not relay process streams".to_string(), Some(e)))?;

        debug!("waiting for platform exit");
        let outcome = session
            .wait()
            .map_err(|e| process_error("could not wait for process".to_string(), Some(e)));
        session.teardown();
        outcome
    }
}

/// A running child and everything attached to it.
///
/// `teardown` runs at most once; `Drop` runs it on early returns.
struct Session {
    child: Child,
    stdin_pipe: Option<StreamPipe>,
    output_pipes: Vec<StreamPipe>,
    signal_ids: Vec<SigId>,
    shutdown: Arc<AtomicBool>,
    grace: Duration,
    torn_down: bool,
}

impl Session {
    fn new(child: Child, shutdown: Arc<AtomicBool>, grace: Duration) -> Self {
        Self {
            child,
            stdin_pipe: None,
            output_pipes: Vec::new(),
            signal_ids: Vec::new(),
            shutdown,
            grace,
            torn_down: false,
        }
    }

    fn register_signals(&mut self) -> io::Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            let id = signal_hook::flag::register(signal, Arc::clone(&self.shutdown))?;
            self.signal_ids.push(id);
        }
        debug!("registered termination handlers");
        Ok(())
    }

    fn connect(&mut self, stdin: Option<Source>, stdout: Sink, stderr: Sink) -> io::Result<()> {
        let missing = || io::Error::new(io::ErrorKind::Other, "child stdio was not piped");

        let child_out = self.child.stdout.take().ok_or_else(missing)?;
        self.output_pipes
            .push(StreamPipe::start("Out pipe", child_out, stdout)?);

        let child_err = self.child.stderr.take().ok_or_else(missing)?;
        self.output_pipes
            .push(StreamPipe::start("Error pipe", child_err, stderr)?);

        let child_in = self.child.stdin.take().ok_or_else(missing)?;
        if let Some(source) = stdin {
            self.stdin_pipe = Some(StreamPipe::start("In pipe", source, child_in)?);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("platform exited with {status}");
                return Ok(ExitOutcome::Exited(status));
            }
            if self.shutdown.load(Ordering::SeqCst) {
                info!("termination requested; shutting platform down");
                return Ok(ExitOutcome::Terminated);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Returns `false` when teardown already happened.
    fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;

        for id in self.signal_ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
        terminate(&mut self.child, self.grace);

        if let Some(pipe) = self.stdin_pipe.as_mut() {
            pipe.stop();
        }
        for pipe in &mut self.output_pipes {
            pipe.finish(DRAIN_TIMEOUT);
        }
        true
    }

    #[cfg(test)]
    fn pipes_stopped(&self) -> usize {
        self.stdin_pipe
            .iter()
            .chain(self.output_pipes.iter())
            .filter(|pipe| pipe.is_stopped())
            .count()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Ask the child to exit, force it after `grace`, and reap it.
fn terminate(child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(err) => debug!("could not poll platform process: {err}"),
    }

    request_termination(child);
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("platform stopped with {status}");
                return;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(_) => break,
        }
    }

    // The process may have exited between the last poll and now.
    if let Err(err) = child.kill() {
        debug!("kill after grace period: {err}");
    }
    if let Err(err) = child.wait() {
        debug!("reaping platform process: {err}");
    }
}

#[cfg(unix)]
fn request_termination(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        debug!("SIGTERM to {pid}: {}", io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::pipe::testing::SharedBuffer;
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn supervisor(stdin: &str, out: &SharedBuffer, err: &SharedBuffer) -> ProcessSupervisor {
        ProcessSupervisor::with_streams(
            Some(Box::new(Cursor::new(stdin.as_bytes().to_vec()))),
            Box::new(out.clone()),
            Box::new(err.clone()),
        )
        .without_signal_handlers()
    }

    #[test]
    fn relays_all_three_streams() {
        let tmp = TempDir::new().unwrap();
        let (out, err) = (SharedBuffer::default(), SharedBuffer::default());

        let outcome = supervisor("from parent\n", &out, &err)
            .run(
                &sh("read line; echo \"got $line\"; echo oops >&2; pwd"),
                tmp.path(),
            )
            .unwrap();

        assert!(outcome.success());
        let stdout = out.contents();
        assert!(stdout.contains("got from parent"));
        let cwd = tmp.path().canonicalize().unwrap();
        assert!(stdout.contains(cwd.to_str().unwrap()));
        assert_eq!(err.contents(), "oops\n");
    }

    #[test]
    fn reports_exit_code() {
        let tmp = TempDir::new().unwrap();
        let (out, err) = (SharedBuffer::default(), SharedBuffer::default());
        let outcome = supervisor("", &out, &err)
            .run(&sh("exit 3"), tmp.path())
            .unwrap();
        assert_eq!(outcome.code(), Some(3));
        assert!(!outcome.success());
    }

    #[test]
    fn spawn_failure_names_working_dir() {
        let tmp = TempDir::new().unwrap();
        let (out, err) = (SharedBuffer::default(), SharedBuffer::default());
        let error = supervisor("", &out, &err)
            .run(&["/nonexistent/java".to_string()], tmp.path())
            .unwrap_err();
        assert_eq!(error.kind(), "process");
        assert!(error.to_string().contains(tmp.path().to_str().unwrap()));
    }

    #[test]
    fn shutdown_request_terminates_child() {
        let tmp = TempDir::new().unwrap();
        let (out, err) = (SharedBuffer::default(), SharedBuffer::default());
        let supervisor = supervisor("", &out, &err);
        let shutdown = supervisor.shutdown_handle();

        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            shutdown.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let outcome = supervisor
            .run(
                &sh("trap 'echo got-term; exit 0' TERM; while true; do sleep 0.1; done"),
                tmp.path(),
            )
            .unwrap();
        trigger.join().unwrap();

        assert_eq!(outcome, ExitOutcome::Terminated);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(out.contents().contains("got-term"));
    }

    #[test]
    fn unresponsive_child_is_killed_after_grace() {
        let tmp = TempDir::new().unwrap();
        let (out, err) = (SharedBuffer::default(), SharedBuffer::default());
        let supervisor = supervisor("", &out, &err).grace_period(Duration::from_millis(200));
        supervisor.shutdown_handle().store(true, Ordering::SeqCst);

        let started = Instant::now();
        let outcome = supervisor
            .run(&sh("trap '' TERM; sleep 30"), tmp.path())
            .unwrap();
        assert_eq!(outcome, ExitOutcome::Terminated);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn teardown_runs_once() {
        let tmp = TempDir::new().unwrap();
        let child = Command::new("/bin/sh")
            .args(["-c", "sleep 30"])
            .current_dir(tmp.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut session = Session::new(
            child,
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(500),
        );
        session
            .connect(
                Some(Box::new(Cursor::new(Vec::new()))),
                Box::new(io::sink()),
                Box::new(io::sink()),
            )
            .unwrap();

        assert!(session.teardown());
        assert_eq!(session.pipes_stopped(), 3);
        assert!(session.child.try_wait().unwrap().is_some());

        assert!(!session.teardown());
        assert_eq!(session.pipes_stopped(), 3);
    }
}
