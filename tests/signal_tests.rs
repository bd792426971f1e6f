//! Raises real signals at the test process, so it runs in its own binary.
#![cfg(unix)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use framework_runner::process::{ExitOutcome, ProcessSupervisor};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sigterm_to_host_shuts_platform_down() {
    let tmp = TempDir::new().unwrap();
    let out = Captured::default();
    let supervisor =
        ProcessSupervisor::with_streams(None, Box::new(out.clone()), Box::new(io::sink()));

    // Handlers are registered before the child's output is relayed, so
    // seeing "ready" means the signal is caught.
    let watched = out.clone();
    let trigger = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !watched.text().contains("ready") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        // SAFETY: raising a signal has no memory safety preconditions.
        unsafe { libc::raise(libc::SIGTERM) };
    });

    let started = Instant::now();
    let outcome = supervisor
        .run(
            &[
                "/bin/sh".to_string(),
                "-c".to_string(),
                "trap 'echo got-term; exit 0' TERM; echo ready; while true; do sleep 0.1; done"
                    .to_string(),
            ],
            tmp.path(),
        )
        .unwrap();
    trigger.join().unwrap();

    assert_eq!(outcome, ExitOutcome::Terminated);
    assert!(started.elapsed() < Duration::from_secs(8));
    assert!(out.text().contains("got-term"));
}
