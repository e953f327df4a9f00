use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a document was turned into vectors.
///
/// Simple indexes one summary vector per document; advanced indexes one
/// vector per token chunk. Each mode owns an independent index population
/// with its own files, and a document answers questions only through the
/// mode it was processed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    #[default]
    Simple,
    Advanced,
}

impl ProcessingMode {
    pub const ALL: [ProcessingMode; 2] = [ProcessingMode::Simple, ProcessingMode::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Simple => "simple",
            ProcessingMode::Advanced => "advanced",
        }
    }

    /// Suffix appended to the on-disk file names for this mode's index and
    /// mappings. The simple mode keeps the unsuffixed legacy names.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ProcessingMode::Simple => "",
            ProcessingMode::Advanced => "_advanced",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ProcessingMode::Simple),
            "advanced" => Ok(ProcessingMode::Advanced),
            other => Err(format!("unknown processing mode: {other}")),
        }
    }
}
