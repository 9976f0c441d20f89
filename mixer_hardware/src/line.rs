//! Newline-framed command writer over any byte sink (typically an opened tty).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use mixer_traits::{BoxError, Transport};

use crate::error::TransportError;

pub struct LineTransport<W: Write> {
    writer: Option<W>,
}

impl LineTransport<File> {
    /// Open a serial device (or any writable path) for commands.
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let file = OpenOptions::new().write(true).open(path.as_ref())?;
        tracing::info!(device = %path.as_ref().display(), "link opened");
        Ok(Self::new(file))
    }
}

impl<W: Write> LineTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    pub fn close(&mut self) {
        if self.writer.take().is_some() {
            tracing::info!("link closed");
        }
    }

    pub fn into_inner(self) -> Option<W> {
        self.writer
    }

    fn write_line(&mut self, command: &str) -> crate::error::Result<()> {
        let w = self.writer.as_mut().ok_or(TransportError::Disconnected)?;
        let res = w
            .write_all(command.as_bytes())
            .and_then(|()| w.write_all(b"\n"))
            .and_then(|()| w.flush());
        if let Err(e) = res {
            // A failed write leaves the framing unknown; treat the link as down.
            tracing::warn!(error = %e, "write failed, closing link");
            self.writer = None;
            return Err(e.into());
        }
        tracing::trace!(command, "line written");
        Ok(())
    }
}

impl<W: Write> Transport for LineTransport<W> {
    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn send(&mut self, command: &str) -> Result<(), BoxError> {
        self.write_line(command).map_err(Into::into)
    }
}
