pub mod error;
pub mod printer;
pub mod types;

pub use error::{Error, RenderError, Result};
pub use printer::{Printer, PrinterSnapshot};
pub use types::{Artifact, RenderFormat, RequestState, RequesterId, Resolution};
