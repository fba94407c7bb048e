//! # Shared Value Types
//!
//! Plain values exchanged between the transport, the admission core and the
//! rendering engine.
//!
//! - [`RequesterId`] - Identity of whoever submitted a request (a chat or user
//!   id). Only ever used as a map key.
//! - [`RenderFormat`] / [`Resolution`] - Output options carried by a
//!   [`Printer`](crate::Printer).
//! - [`Artifact`] - The product of a successful render.
//! - [`RequestState`] - Lifecycle of a request inside the admission core.

use bytes::Bytes;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque identity of a requester.
///
/// Locks and cached preferences are keyed by this value; it carries no
/// behavior of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(i64);

impl RequesterId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for RequesterId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output encoding produced by the renderer.
///
/// Deserializes through [`FromStr`], so `"jpg"` and upper-case names are
/// accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RenderFormat {
    Pdf,
    #[default]
    Png,
    Jpeg,
}

impl RenderFormat {
    /// File extension used for artifacts of this format.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(format!("unknown render format `{other}`")),
        }
    }
}

impl TryFrom<String> for RenderFormat {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Browser viewport used for the render, in CSS pixels.
///
/// Serializes as `{"width": .., "height": ..}` and deserializes from either
/// that object or a `"WIDTHxHEIGHT"` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ResolutionRepr")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const SVGA: Self = Self::new(800, 600);
    pub const HD: Self = Self::new(1280, 720);
    pub const FULL_HD: Self = Self::new(1920, 1080);
    pub const QHD: Self = Self::new(2560, 1440);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::SVGA
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("resolution `{s}` is not of the form WIDTHxHEIGHT"))?;
        let width = w
            .parse::<u32>()
            .map_err(|e| format!("invalid width `{w}`: {e}"))?;
        let height = h
            .parse::<u32>()
            .map_err(|e| format!("invalid height `{h}`: {e}"))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution `{s}` must be non-zero"));
        }
        Ok(Self { width, height })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResolutionRepr {
    Text(String),
    Dimensions { width: u32, height: u32 },
}

impl TryFrom<ResolutionRepr> for Resolution {
    type Error = String;

    fn try_from(repr: ResolutionRepr) -> Result<Self, Self::Error> {
        match repr {
            ResolutionRepr::Text(s) => s.parse(),
            ResolutionRepr::Dimensions { width, height } => Ok(Self::new(width, height)),
        }
    }
}

/// Output of a successful render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Encoding of `data`.
    pub format: RenderFormat,
    /// Where the renderer left the file, if it wrote one.
    pub path: Option<PathBuf>,
    /// Raw artifact bytes.
    pub data: Bytes,
}

impl Artifact {
    pub fn new(format: RenderFormat, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            path: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lifecycle of a request inside the admission core.
///
/// Transitions are strictly forward, one step at a time:
/// `Created -> Queued -> Dispatched -> Completed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RequestState {
    Created = 0,
    Queued = 1,
    Dispatched = 2,
    Completed = 3,
}

impl RequestState {
    /// The only state allowed to transition into `self`.
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Created => None,
            Self::Queued => Some(Self::Created),
            Self::Dispatched => Some(Self::Queued),
            Self::Completed => Some(Self::Dispatched),
        }
    }

    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Created),
            1 => Some(Self::Queued),
            2 => Some(Self::Dispatched),
            3 => Some(Self::Completed),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses_presets() {
        assert_eq!("1280x720".parse::<Resolution>(), Ok(Resolution::HD));
        assert_eq!(" 2560X1440 ".parse::<Resolution>(), Ok(Resolution::QHD));
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
        assert!("widexhigh".parse::<Resolution>().is_err());
    }

    #[test]
    fn format_accepts_jpg_alias() {
        assert_eq!("JPG".parse::<RenderFormat>(), Ok(RenderFormat::Jpeg));
        assert_eq!("pdf".parse::<RenderFormat>(), Ok(RenderFormat::Pdf));
        assert!("gif".parse::<RenderFormat>().is_err());
    }

    #[test]
    fn resolution_deserializes_from_text_or_object() {
        let text: Resolution = serde_json::from_str(r#""1920x1080""#).unwrap();
        assert_eq!(text, Resolution::FULL_HD);
        let object: Resolution = serde_json::from_str(r#"{"width":1280,"height":720}"#).unwrap();
        assert_eq!(object, Resolution::HD);
        assert!(serde_json::from_str::<Resolution>(r#""0x10""#).is_err());
        assert_eq!(
            serde_json::to_value(Resolution::SVGA).unwrap(),
            serde_json::json!({"width": 800, "height": 600})
        );
    }

    #[test]
    fn format_deserializes_through_aliases() {
        let format: RenderFormat = serde_json::from_str(r#""JPG""#).unwrap();
        assert_eq!(format, RenderFormat::Jpeg);
        assert!(serde_json::from_str::<RenderFormat>(r#""gif""#).is_err());
        assert_eq!(serde_json::to_string(&RenderFormat::Pdf).unwrap(), r#""pdf""#);
    }

    #[test]
    fn request_state_only_steps_forward() {
        assert_eq!(RequestState::Created.predecessor(), None);
        assert_eq!(
            RequestState::Completed.predecessor(),
            Some(RequestState::Dispatched)
        );
        for raw in 0..4 {
            let state = RequestState::from_u8(raw).unwrap();
            assert_eq!(state as u8, raw);
        }
        assert_eq!(RequestState::from_u8(4), None);
        assert!(RequestState::Completed.is_terminal());
    }

    #[test]
    fn requester_id_is_transparent_in_json() {
        let id = RequesterId::new(-1001);
        assert_eq!(serde_json::to_string(&id).unwrap(), "-1001");
        let back: RequesterId = serde_json::from_str("42").unwrap();
        assert_eq!(back, RequesterId::from(42));
    }
}
