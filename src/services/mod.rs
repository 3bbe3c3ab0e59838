//! Codec services shared by the orchestrator and the CLI

pub mod format;
pub mod io;

pub use format::{OutputFormatHandler, RESPONSE_MIME};
pub use io::{EncodeOptions, ImageIOService};
