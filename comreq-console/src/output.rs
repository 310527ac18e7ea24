use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use comreq_core::{listener, ComRequest, OutputConfig, SharedListener};
use serde::Serialize;

#[derive(Serialize)]
struct SnapshotLine<'a> {
    user: &'a str,
    requests: &'a [ComRequest],
}

/// Writes user snapshots as JSON lines. Shared between the cache listener
/// and `get` commands, so writes are serialized through a mutex.
pub struct Printer<W> {
    out: Arc<Mutex<W>>,
    config: OutputConfig,
}

impl<W> Clone for Printer<W> {
    fn clone(&self) -> Self {
        Self {
            out: self.out.clone(),
            config: self.config.clone(),
        }
    }
}

impl<W: Write + Send + 'static> Printer<W> {
    pub fn new(out: W, config: OutputConfig) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            config,
        }
    }

    pub fn print_snapshot(&self, user: &str, requests: &[ComRequest]) -> io::Result<()> {
        if requests.is_empty() && !self.config.show_empty {
            return Ok(());
        }
        let line = SnapshotLine { user, requests };
        let text = if self.config.pretty {
            serde_json::to_string_pretty(&line)?
        } else {
            serde_json::to_string(&line)?
        };
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("output lock poisoned"))?;
        writeln!(out, "{text}")?;
        out.flush()
    }

    /// Cache listener printing every change notification.
    pub fn listener(&self) -> SharedListener {
        let printer = self.clone();
        listener(move |user, requests| {
            printer.print_snapshot(user, requests)?;
            Ok(())
        })
    }
}

#[cfg(test)]
impl Printer<Vec<u8>> {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.out.lock().unwrap().clone()).unwrap()
    }
}
