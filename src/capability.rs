use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of request a provider can serve. Providers are grouped and ordered
/// per class; variant order defines the `Ord` derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityClass {
    /// Screenshot OCR / structured extraction. Requests carry an image.
    Vision,
    /// Narrative report generation.
    Text,
    /// Forward-looking prediction.
    Reasoning,
}

impl CapabilityClass {
    pub const ALL: [CapabilityClass; 3] = [Self::Vision, Self::Text, Self::Reasoning];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Text => "text",
            Self::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
