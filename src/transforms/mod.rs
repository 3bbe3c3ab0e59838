//! Image transform capabilities
//!
//! Each capability is a pure function of a decoded image plus its
//! configuration. Storage, naming and encoding live in the orchestrator.

pub mod background;
pub mod compress;
pub mod enhance;

pub use background::BackgroundRemover;
pub use compress::Compressor;
pub use enhance::{EnhanceError, Enhancer};

use std::fmt;
use std::path::Path;

/// The three transforms offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RemoveBackground,
    Enhance,
    Compress,
}

impl Operation {
    /// All operations, in route order
    pub const ALL: [Self; 3] = [Self::RemoveBackground, Self::Enhance, Self::Compress];

    /// Prefix added to the stored input name to form the output name
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::RemoveBackground => "nobg_",
            Self::Enhance => "enhanced_",
            Self::Compress => "compressed_",
        }
    }

    /// HTTP route serving the operation
    #[must_use]
    pub const fn route(self) -> &'static str {
        match self {
            Self::RemoveBackground => "/remove_background",
            Self::Enhance => "/enhance_image",
            Self::Compress => "/compress_image",
        }
    }

    /// Output name for a stored input name
    ///
    /// Background removal always produces PNG, so the input extension is
    /// replaced. The other transforms keep the input name and its container.
    #[must_use]
    pub fn output_name(self, stored_name: &str) -> String {
        match self {
            Self::RemoveBackground => {
                let stem = Path::new(stored_name)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(stored_name);
                format!("{}{stem}.png", self.prefix())
            },
            Self::Enhance | Self::Compress => format!("{}{stored_name}", self.prefix()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveBackground => write!(f, "remove_background"),
            Self::Enhance => write!(f, "enhance"),
            Self::Compress => write!(f, "compress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_names() {
        assert_eq!(
            Operation::RemoveBackground.output_name("cat.photo.jpg"),
            "nobg_cat.photo.png"
        );
        assert_eq!(Operation::RemoveBackground.output_name("cat"), "nobg_cat.png");
        assert_eq!(Operation::Enhance.output_name("cat.jpg"), "enhanced_cat.jpg");
        assert_eq!(Operation::Compress.output_name("cat.webp"), "compressed_cat.webp");
    }

    #[test]
    fn test_routes_are_distinct() {
        let routes: std::collections::HashSet<_> =
            Operation::ALL.iter().map(|op| op.route()).collect();
        assert_eq!(routes.len(), 3);
    }
}
