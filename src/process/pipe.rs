//! Byte copying between a stream pair on a dedicated thread.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const BUFFER_SIZE: usize = 8 * 1024;

/// Copies `source` into `sink` until EOF, a write failure, or `stop`.
///
/// A thread blocked in `read` cannot be interrupted; `stop` flags it and
/// detaches it, and it exits after its next read returns.
pub struct StreamPipe {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<io::Result<u64>>>,
    stopped: bool,
}

impl StreamPipe {
    pub fn start<R, W>(name: &str, source: R, sink: W) -> io::Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || pump(source, sink, &flag))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
            stopped: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Wait up to `timeout` for the source to reach EOF, then stop.
    pub fn finish(&mut self, timeout: Duration) -> bool {
        if let Some(handle) = &self.handle {
            let deadline = Instant::now() + timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
        }
        self.stop()
    }

    /// Stop the pipe. Returns `false` when it was already stopped.
    pub fn stop(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        self.stop.store(true, Ordering::SeqCst);

        match self.handle.take() {
            Some(handle) if handle.is_finished() => match handle.join() {
                Ok(Ok(bytes)) => debug!("{} copied {bytes} bytes", self.name),
                Ok(Err(err)) => debug!("{} ended with {err}", self.name),
                Err(_) => debug!("{} panicked", self.name),
            },
            Some(_) => debug!("{} still blocked; detaching", self.name),
            None => {}
        }
        true
    }
}

impl Drop for StreamPipe {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump<R: Read, W: Write>(mut source: R, mut sink: W, stop: &AtomicBool) -> io::Result<u64> {
    let mut buf = [0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        sink.write_all(&buf[..n])?;
        sink.flush()?;
        total += n as u64;
    }
    Ok(total)
}
