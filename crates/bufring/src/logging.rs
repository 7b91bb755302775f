//! Log output that stays readable while the terminal is in raw mode.
//!
//! Raw mode turns off the `\n` → `\r\n` translation, so each log line would start where
//! the previous one ended. When stderr is a terminal, line feeds are written as `\r\n`.

use std::io::{self, IsTerminal, Write};

/// Writer handed to `tracing_subscriber::fmt` for each event.
pub struct LogWriter<W> {
    inner: W,
    crlf: bool,
}

impl<W: Write> LogWriter<W> {
    pub fn new(inner: W, crlf: bool) -> Self {
        Self { inner, crlf }
    }
}

/// `MakeWriter` for the binary: stderr, with `\r\n` line ends on a terminal.
pub fn stderr() -> LogWriter<io::Stderr> {
    let err = io::stderr();
    let crlf = err.is_terminal();
    LogWriter::new(err, crlf)
}

impl<W: Write> Write for LogWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.crlf {
            return self.inner.write(buf);
        }
        for line in buf.split_inclusive(|&b| b == b'\n') {
            match line.strip_suffix(b"\n") {
                Some(body) => {
                    self.inner.write_all(body.strip_suffix(b"\r").unwrap_or(body))?;
                    self.inner.write_all(b"\r\n")?;
                }
                None => self.inner.write_all(line)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
