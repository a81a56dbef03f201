use serde::{Deserialize, Serialize};

use crate::formats::ChapterLabel;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    #[default]
    Idle,
    Validating,
    Extracting,
    Success,
    Error,
}

impl OrchestratorState {
    /// A request is in flight; new operations must be rejected.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Validating | Self::Extracting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub seq: u64,
    pub url: String,
    pub force_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success { text: String },
    Failure { reason: String },
}

/// A completed extraction as handed back to the UI layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Extraction {
    pub url: String,
    pub text: String,
    pub chapter: ChapterLabel,
    pub forced: bool,
}

impl Extraction {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
