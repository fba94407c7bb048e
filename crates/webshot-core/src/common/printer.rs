use crate::common::types::{RenderFormat, Resolution};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Rendering parameters for a single request.
///
/// A `Printer` is immutable once built: the transport constructs one per
/// incoming command (optionally prefilled from the requester's cached
/// [`PrinterSnapshot`]) and hands it to the admission core, which copies it
/// into the settings cache and the queued request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Printer {
    link: String,
    #[serde(flatten)]
    settings: PrinterSnapshot,
}

/// The cacheable part of a [`Printer`]: everything except the link.
///
/// This is what the admission core remembers per requester so the next
/// request can start from the same preferences.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSnapshot {
    pub format: RenderFormat,
    pub resolution: Resolution,
    pub full_page: bool,
    pub split: bool,
    pub scroll_control: bool,
    pub dark_mode: bool,
    pub render_delay_secs: u64,
}

impl Printer {
    /// Creates a printer for `link` with default settings.
    ///
    /// Surrounding whitespace is trimmed and links without a scheme are
    /// assumed to be `https://`.
    pub fn new(link: impl AsRef<str>) -> Self {
        Self {
            link: normalize_link(link.as_ref()),
            settings: PrinterSnapshot::default(),
        }
    }

    /// Creates a printer for `link` starting from cached preferences.
    pub fn from_snapshot(link: impl AsRef<str>, snapshot: PrinterSnapshot) -> Self {
        Self {
            link: normalize_link(link.as_ref()),
            settings: snapshot,
        }
    }

    /// Returns the cacheable preferences of this printer.
    pub const fn snapshot(&self) -> PrinterSnapshot {
        self.settings
    }

    /// Replaces every preference with the cached `snapshot`, keeping the link.
    #[must_use]
    pub fn apply_snapshot(mut self, snapshot: PrinterSnapshot) -> Self {
        self.settings = snapshot;
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: RenderFormat) -> Self {
        self.settings.format = format;
        self
    }

    #[must_use]
    pub const fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.settings.resolution = resolution;
        self
    }

    #[must_use]
    pub const fn with_full_page(mut self, full_page: bool) -> Self {
        self.settings.full_page = full_page;
        self
    }

    #[must_use]
    pub const fn with_split(mut self, split: bool) -> Self {
        self.settings.split = split;
        self
    }

    #[must_use]
    pub const fn with_scroll_control(mut self, scroll_control: bool) -> Self {
        self.settings.scroll_control = scroll_control;
        self
    }

    #[must_use]
    pub const fn with_dark_mode(mut self, dark_mode: bool) -> Self {
        self.settings.dark_mode = dark_mode;
        self
    }

    #[must_use]
    pub const fn with_render_delay(mut self, delay: Duration) -> Self {
        self.settings.render_delay_secs = delay.as_secs();
        self
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub const fn format(&self) -> RenderFormat {
        self.settings.format
    }

    pub const fn resolution(&self) -> Resolution {
        self.settings.resolution
    }

    pub const fn full_page(&self) -> bool {
        self.settings.full_page
    }

    pub const fn split(&self) -> bool {
        self.settings.split
    }

    /// Whether the renderer scrolls through the page before capturing it.
    ///
    /// Scrolling renders are slow, so the admission core holds the requester's
    /// lock for the full request timeout instead of the quick release window.
    pub const fn scroll_control(&self) -> bool {
        self.settings.scroll_control
    }

    pub const fn dark_mode(&self) -> bool {
        self.settings.dark_mode
    }

    pub const fn render_delay(&self) -> Duration {
        Duration::from_secs(self.settings.render_delay_secs)
    }
}

fn normalize_link(raw: &str) -> String {
    let link = raw.trim();
    if link.is_empty() || link.contains("://") {
        link.to_string()
    } else {
        format!("https://{link}")
    }
}
