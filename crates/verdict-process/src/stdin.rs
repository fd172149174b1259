//! On-demand writer thread for a child's standard input.
//!
//! Writes are queued to a dedicated thread so a child that stops reading
//! (full pipe) never blocks the test thread.

use std::io::Write;
use std::process::ChildStdin;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use tracing::debug;
use verdict_common::{ProcessError, ProcessResult};

pub(crate) struct StdinWriter {
    name: String,
    pipe: Option<ChildStdin>,
    queue: Option<Sender<Vec<u8>>>,
}

impl StdinWriter {
    pub(crate) fn new(name: &str, pipe: ChildStdin) -> Self {
        Self {
            name: name.to_string(),
            pipe: Some(pipe),
            queue: None,
        }
    }

    /// Queues `data`, starting the writer thread on first use.
    pub(crate) fn write(&mut self, data: Vec<u8>) -> ProcessResult<()> {
        if self.queue.is_none() {
            let pipe = self
                .pipe
                .take()
                .ok_or_else(|| ProcessError::write_failed(&self.name, "stdin is closed"))?;
            self.queue = Some(self.start_thread(pipe)?);
        }

        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| ProcessError::write_failed(&self.name, "stdin is closed"))?;
        queue
            .send(data)
            .map_err(|_| ProcessError::write_failed(&self.name, "stdin writer has stopped"))
    }

    /// Closes stdin once queued data has been written.
    pub(crate) fn close(&mut self) {
        self.pipe = None;
        self.queue = None;
    }

    fn start_thread(&self, mut pipe: ChildStdin) -> ProcessResult<Sender<Vec<u8>>> {
        let (tx, rx) = channel::<Vec<u8>>();
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("{}-stdin", self.name))
            .spawn(move || {
                for chunk in rx {
                    if let Err(e) = pipe.write_all(&chunk).and_then(|_| pipe.flush()) {
                        debug!("Stopped writing to stdin of {}: {}", name, e);
                        break;
                    }
                }
                // Dropping the pipe closes the child's stdin
            })
            .map_err(|e| ProcessError::write_failed(&self.name, e.to_string()))?;
        Ok(tx)
    }
}
