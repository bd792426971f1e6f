//! Download progress reporting.

use serde::Deserialize;
use std::io::{self, Read, Write};

const CHUNK_SIZE: usize = 8 * 1024;
const COARSE_STEP_BYTES: u64 = 256 * 1024;

/// How download progress is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Percentage (or kilobytes) updated per chunk.
    Fine,
    /// A dot every few hundred kilobytes.
    #[default]
    Coarse,
    /// Nothing.
    Silent,
}

/// Where status lines and download progress are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Console {
    #[default]
    Stdout,
    /// Keeps stdout free for machine-readable output.
    Stderr,
}

impl Console {
    pub fn writer(self) -> Box<dyn Write + Send> {
        match self {
            Self::Stdout => Box::new(io::stdout()),
            Self::Stderr => Box::new(io::stderr()),
        }
    }

    /// Print one status line.
    pub fn say(self, line: &str) {
        let mut out = self.writer();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// Progress printer for one download.
pub struct Progress<W: Write> {
    mode: ProgressMode,
    name: String,
    total: Option<u64>,
    done: u64,
    last_marker: u64,
    out: W,
}

impl Progress<Box<dyn Write + Send>> {
    pub fn console(mode: ProgressMode, name: &str, total: Option<u64>, console: Console) -> Self {
        Self::new(mode, name, total, console.writer())
    }
}

impl<W: Write> Progress<W> {
    pub fn new(mode: ProgressMode, name: &str, total: Option<u64>, out: W) -> Self {
        Self {
            mode,
            name: name.to_string(),
            total: total.filter(|t| *t > 0),
            done: 0,
            last_marker: 0,
            out,
        }
    }

    fn start(&mut self) {
        if self.mode == ProgressMode::Coarse {
            let _ = write!(self.out, "{} : downloading ", self.name);
            let _ = self.out.flush();
        }
    }

    fn advance(&mut self, bytes: u64) {
        self.done += bytes;
        match self.mode {
            ProgressMode::Silent => {}
            ProgressMode::Fine => {
                let _ = match self.total {
                    Some(total) => write!(
                        self.out,
                        "\r{} : {}% ({} kB)",
                        self.name,
                        self.done * 100 / total,
                        self.done / 1024
                    ),
                    None => write!(self.out, "\r{} : {} kB", self.name, self.done / 1024),
                };
                let _ = self.out.flush();
            }
            ProgressMode::Coarse => {
                while self.done - self.last_marker >= COARSE_STEP_BYTES {
                    self.last_marker += COARSE_STEP_BYTES;
                    let _ = write!(self.out, ".");
                }
                let _ = self.out.flush();
            }
        }
    }

    fn finish(&mut self) {
        let _ = match self.mode {
            ProgressMode::Silent => Ok(()),
            ProgressMode::Fine => writeln!(self.out, "\r{} : {} bytes", self.name, self.done),
            ProgressMode::Coarse => writeln!(self.out, " {} bytes", self.done),
        };
        let _ = self.out.flush();
    }

    /// Copy `reader` into `writer`, reporting as bytes arrive.
    pub fn copy<R: Read + ?Sized, O: Write + ?Sized>(
        &mut self,
        reader: &mut R,
        writer: &mut O,
    ) -> io::Result<u64> {
        self.start();
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            writer.write_all(&buf[..n])?;
            self.advance(n as u64);
        }
        writer.flush()?;
        self.finish();
        Ok(self.done)
    }
}
