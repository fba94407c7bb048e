//! Test doubles for the renderer and transport seams.

use crate::server::{engine::Renderer, transport::Transport};
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use webshot_core::{Artifact, Error, Printer, RenderError, RenderFormat, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    RenderStarted(String),
    RenderFinished(String),
    Archived { destination: String, path: PathBuf },
    Disconnected,
}

/// Shared, ordered record of what the doubles saw.
#[derive(Clone, Debug, Default)]
pub struct Events(Arc<Mutex<Vec<Event>>>);

impl Events {
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    /// Links in the order their renders started.
    pub fn started(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::RenderStarted(link) => Some(link.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Renderer driven by the link it is given.
///
/// - a link containing `fail` returns [`RenderError::Failed`];
/// - a link containing `panic` panics;
/// - anything else returns a small PNG artifact.
///
/// Every render sleeps for `delay` and, when gated, waits for the gate to
/// open first.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRenderer {
    pub events: Events,
    pub delay: Duration,
    pub gate: Option<CancellationToken>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Holds every render until the returned token is cancelled.
    pub fn gated(mut self) -> (Self, CancellationToken) {
        let gate = CancellationToken::new();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn with_events(mut self, events: Events) -> Self {
        self.events = events;
        self
    }
}

impl Renderer for ScriptedRenderer {
    async fn render(&self, printer: &Printer) -> core::result::Result<Artifact, RenderError> {
        let link = printer.link().to_owned();
        self.events.push(Event::RenderStarted(link.clone()));

        if let Some(gate) = &self.gate {
            gate.cancelled().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if link.contains("panic") {
            panic!("scripted panic for {link}");
        }

        self.events.push(Event::RenderFinished(link.clone()));
        if link.contains("fail") {
            return Err(RenderError::failed(format!("scripted failure for {link}")));
        }
        Ok(Artifact::new(RenderFormat::Png, link.into_bytes()))
    }
}

/// Transport that only records the calls it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    pub events: Events,
    pub fail_archive: bool,
}

impl RecordingTransport {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            fail_archive: false,
        }
    }

    pub fn failing_archive(mut self) -> Self {
        self.fail_archive = true;
        self
    }
}

impl Transport for RecordingTransport {
    async fn archive_log(&self, destination: &str, path: &Path) -> Result<()> {
        if self.fail_archive {
            return Err(Error::ChannelError {
                context: format!("archive destination `{destination}` unreachable"),
            });
        }
        self.events.push(Event::Archived {
            destination: destination.to_owned(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.events.push(Event::Disconnected);
        Ok(())
    }
}
