//! The rendering engine seam.
//!
//! The worker knows nothing about browsers: it hands a [`Printer`] to a
//! [`Renderer`] and stores whatever comes back. [`CommandRenderer`] is the
//! adapter shipped with the binary; it runs an external program per render.

use crate::server::config::RendererConfig;
use portable_atomic::{AtomicU64, Ordering};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use webshot_core::{Artifact, Printer, RenderError};

/// Turns rendering parameters into an artifact.
///
/// Implementations must be shareable across tasks: the worker may run several
/// renders at once on the same instance. Failures are reported through
/// [`RenderError`]; a panic inside `render` is also caught by the worker and
/// reported as [`RenderError::Panicked`].
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, printer: &Printer)
    -> impl Future<Output = Result<Artifact, RenderError>> + Send;
}

/// Renders by spawning an external program.
///
/// The program is invoked as
///
/// ```text
/// <program> --url <link> --output <path> --format <pdf|png|jpeg>
///           --resolution <WxH> [--full-page] [--split] [--scroll]
///           [--dark] [--delay <secs>]
/// ```
///
/// and must write the artifact to `<path>` inside the work directory before
/// exiting with status 0. It is killed if it exceeds the configured timeout.
#[derive(Debug)]
pub struct CommandRenderer {
    config: RendererConfig,
    next_file: AtomicU64,
}

impl CommandRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            next_file: AtomicU64::new(0),
        }
    }

    fn output_path(&self, printer: &Printer) -> PathBuf {
        let n = self.next_file.fetch_add(1, Ordering::Relaxed);
        self.config.work_dir.join(format!(
            "render-{}-{n}.{}",
            std::process::id(),
            printer.format().extension()
        ))
    }

    fn command(&self, printer: &Printer, output: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("--url")
            .arg(printer.link())
            .arg("--output")
            .arg(output)
            .arg("--format")
            .arg(printer.format().extension())
            .arg("--resolution")
            .arg(printer.resolution().to_string());
        if printer.full_page() {
            cmd.arg("--full-page");
        }
        if printer.split() {
            cmd.arg("--split");
        }
        if printer.scroll_control() {
            cmd.arg("--scroll");
        }
        if printer.dark_mode() {
            cmd.arg("--dark");
        }
        if !printer.render_delay().is_zero() {
            cmd.arg("--delay")
                .arg(printer.render_delay().as_secs().to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Renderer for CommandRenderer {
    #[tracing::instrument(skip_all, fields(link = printer.link()))]
    async fn render(&self, printer: &Printer) -> Result<Artifact, RenderError> {
        validate_link(printer.link())?;

        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| RenderError::failed(format!("cannot create work dir: {e}")))?;

        let output_path = self.output_path(printer);
        let child = self
            .command(printer, &output_path)
            .spawn()
            .map_err(|e| {
                RenderError::failed(format!("cannot spawn `{}`: {e}", self.config.program))
            })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout {
                secs: self.config.timeout.as_secs(),
            })?
            .map_err(|e| RenderError::failed(format!("render process failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::failed(format!(
                "renderer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(|e| RenderError::failed(format!("renderer produced no output: {e}")))?;

        tracing::debug!(bytes = data.len(), "Render finished");
        Ok(Artifact::new(printer.format(), data).with_path(output_path))
    }
}

fn validate_link(link: &str) -> Result<(), RenderError> {
    let valid = ["http://", "https://"]
        .iter()
        .any(|scheme| link.len() > scheme.len() && link.starts_with(scheme));
    if valid {
        Ok(())
    } else {
        Err(RenderError::InvalidTarget {
            link: link.to_string(),
        })
    }
}
