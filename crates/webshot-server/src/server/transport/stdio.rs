//! JSON-lines transport over stdin/stdout.
//!
//! Each input line is a [`Command`]:
//!
//! ```json
//! {"requester": 42, "link": "example.com", "format": "pdf", "dark_mode": true}
//! ```
//!
//! Options left out fall back to the requester's cached preferences, then to
//! the defaults. Every reply is one JSON object per line tagged by `status`:
//! `queued`, `busy`, `rendering`, `done` or `error`.

use super::Transport;
use crate::server::{
    engine::Renderer,
    lock::WaitingSignal,
    request::ResultHandle,
    supervisor::Supervisor,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use webshot_core::{
    Error, Printer, PrinterSnapshot, RenderFormat, RequesterId, Resolution, Result,
};

const REPLY_BUFFER: usize = 64;

#[derive(Debug, Default)]
pub struct StdioTransport {
    disconnected: CancellationToken,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.is_cancelled()
    }
}

impl Transport for StdioTransport {
    /// Copies the log into the `destination` directory as
    /// `debug-<unix seconds>.log`.
    async fn archive_log(&self, destination: &str, path: &Path) -> Result<()> {
        let dir = Path::new(destination);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(format!("creating `{destination}`"), &e))?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let target = dir.join(format!("debug-{stamp}.log"));
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| Error::io(format!("copying log to `{}`", target.display()), &e))?;

        tracing::debug!(target = %target.display(), "Copied log file");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.cancel();
        Ok(())
    }
}

/// One line of input.
#[derive(Debug, Deserialize)]
pub struct Command {
    pub requester: Option<RequesterId>,
    pub link: String,
    #[serde(flatten)]
    pub overrides: Overrides,
}

/// Options given explicitly on a command.
#[derive(Debug, Default, Deserialize)]
pub struct Overrides {
    pub format: Option<RenderFormat>,
    pub resolution: Option<Resolution>,
    pub full_page: Option<bool>,
    pub split: Option<bool>,
    pub scroll_control: Option<bool>,
    pub dark_mode: Option<bool>,
    pub render_delay_secs: Option<u64>,
}

impl Overrides {
    fn apply(&self, mut base: PrinterSnapshot) -> PrinterSnapshot {
        if let Some(format) = self.format {
            base.format = format;
        }
        if let Some(resolution) = self.resolution {
            base.resolution = resolution;
        }
        base.full_page = self.full_page.unwrap_or(base.full_page);
        base.split = self.split.unwrap_or(base.split);
        base.scroll_control = self.scroll_control.unwrap_or(base.scroll_control);
        base.dark_mode = self.dark_mode.unwrap_or(base.dark_mode);
        base.render_delay_secs = self.render_delay_secs.unwrap_or(base.render_delay_secs);
        base
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Queued {
        request: u64,
        requester: Option<RequesterId>,
    },
    Busy {
        requester: RequesterId,
        retry_after_secs: u64,
    },
    Rendering {
        request: u64,
    },
    Done {
        request: u64,
        path: Option<PathBuf>,
        bytes: usize,
    },
    Error {
        request: Option<u64>,
        message: String,
    },
}

/// Reads commands from stdin until EOF or [`Transport::disconnect`], and
/// writes replies to stdout.
///
/// Returns once every admitted request has been answered.
///
/// # Errors
///
/// [`Error::Io`] if stdin or stdout fail.
pub async fn serve<R: Renderer>(supervisor: Arc<Supervisor<R, StdioTransport>>) -> Result<()> {
    serve_io(
        supervisor,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// [`serve`] over arbitrary streams. `output` receives nothing but replies,
/// one JSON object per line.
///
/// # Errors
///
/// [`Error::Io`] if `input` or `output` fail.
pub async fn serve_io<R, I, O>(
    supervisor: Arc<Supervisor<R, StdioTransport>>,
    input: I,
    output: O,
) -> Result<()>
where
    R: Renderer,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(REPLY_BUFFER);
    let writer = tokio::spawn(write_replies(rx, output));
    let reporters = TaskTracker::new();
    let disconnected = supervisor.transport().disconnected.clone();
    let mut lines = input.lines();

    tracing::info!("Reading commands");
    let read = loop {
        let line = tokio::select! {
            biased;
            () = disconnected.cancelled() => break Ok(()),
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(Error::io("reading commands", &e)),
        };
        if line.trim().is_empty() {
            continue;
        }

        match admit(&supervisor, &line) {
            Ok((queued, handle, waiting)) => {
                send(&tx, queued).await;
                reporters.spawn(report(handle, waiting, tx.clone()));
            }
            Err(reply) => send(&tx, reply).await,
        }
    };

    reporters.close();
    reporters.wait().await;
    drop(tx);
    let written = writer
        .await
        .map_err(|e| Error::ChannelError {
            context: format!("reply writer: {e}"),
        })?;
    tracing::info!("Stopped reading commands");
    read.and(written)
}

/// Parses `line` and submits it, or explains why it was not submitted.
fn admit<R: Renderer>(
    supervisor: &Supervisor<R, StdioTransport>,
    line: &str,
) -> core::result::Result<(Reply, ResultHandle, WaitingSignal), Reply> {
    let command: Command = serde_json::from_str(line).map_err(|e| Reply::Error {
        request: None,
        message: format!("invalid command: {e}"),
    })?;

    if let Some(id) = command.requester {
        if let Some(lock) = supervisor.get_request(id).filter(|l| !l.is_released()) {
            tracing::debug!(requester = %id, "Duplicate request");
            return Err(Reply::Busy {
                requester: id,
                retry_after_secs: retry_after_secs(lock.remaining()),
            });
        }
    }

    let base = command
        .requester
        .and_then(|id| supervisor.get_settings_cache(id))
        .unwrap_or_default();
    let printer = Printer::from_snapshot(&command.link, command.overrides.apply(base));

    let (handle, waiting) = supervisor
        .new_request(printer, command.requester)
        .map_err(|e| Reply::Error {
            request: None,
            message: e.to_string(),
        })?;
    let queued = Reply::Queued {
        request: handle.request_id(),
        requester: command.requester,
    };
    Ok((queued, handle, waiting))
}

/// Whole seconds until a retry can succeed, rounded up.
fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

/// Follows one request to completion.
async fn report(handle: ResultHandle, waiting: WaitingSignal, tx: mpsc::Sender<Reply>) {
    let request = handle.request_id();
    let outcome = tokio::select! {
        biased;
        outcome = handle.wait() => outcome,
        () = waiting.wait() => {
            send(&tx, Reply::Rendering { request }).await;
            handle.wait().await
        }
    };

    let reply = match outcome {
        Ok(artifact) => Reply::Done {
            request,
            bytes: artifact.len(),
            path: artifact.path,
        },
        Err(e) => Reply::Error {
            request: Some(request),
            message: e.to_string(),
        },
    };
    send(&tx, reply).await;
}

async fn send(tx: &mpsc::Sender<Reply>, reply: Reply) {
    if tx.send(reply).await.is_err() {
        tracing::warn!("Reply writer is gone");
    }
}

async fn write_replies<O>(mut rx: mpsc::Receiver<Reply>, mut output: O) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    while let Some(reply) = rx.recv().await {
        let mut line = serde_json::to_vec(&reply).map_err(|e| Error::ChannelError {
            context: format!("encoding reply: {e}"),
        })?;
        line.push(b'\n');
        output
            .write_all(&line)
            .await
            .map_err(|e| Error::io("writing reply", &e))?;
        output
            .flush()
            .await
            .map_err(|e| Error::io("flushing reply", &e))?;
    }
    Ok(())
}
