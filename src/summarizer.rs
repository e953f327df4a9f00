//! Two-level map/reduce summarization for the simple pipeline.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chunker::Chunker;
use crate::errors::AppError;
use crate::openai::Completer;

fn summary_prompt(text: &str) -> String {
    format!("Summarize the following text:\n\n{text}\n\nSummary:")
}

pub struct Summarizer {
    completer: Arc<dyn Completer>,
    chunker: Arc<Chunker>,
    /// Character threshold above which the two-level reduction kicks in.
    threshold: usize,
    /// Token size for intermediate chunks of large documents.
    chunk_size: usize,
    /// When false (the default), a failed completion degrades to an empty
    /// summary for that sub-call instead of aborting the document.
    strict: bool,
}

impl Summarizer {
    pub fn new(
        completer: Arc<dyn Completer>,
        chunker: Arc<Chunker>,
        threshold: usize,
        chunk_size: usize,
        strict: bool,
    ) -> Self {
        Self {
            completer,
            chunker,
            threshold,
            chunk_size,
            strict,
        }
    }

    /// Produce one condensed text for the document.
    ///
    /// Text over the threshold is chunked, each chunk summarized
    /// independently, and the joined chunk summaries summarized once more.
    /// Exactly two levels, regardless of input size.
    pub async fn summarize(&self, text: &str) -> Result<String, AppError> {
        // Threshold is in characters, not bytes
        if text.chars().count() > self.threshold {
            self.summarize_large(text).await
        } else {
            self.summarize_once(text).await
        }
    }

    async fn summarize_large(&self, text: &str) -> Result<String, AppError> {
        let chunks = self.chunker.split(text, self.chunk_size);
        debug!(chunks = chunks.len(), "Two-level summarization");
        let mut chunk_summaries = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            chunk_summaries.push(self.summarize_once(chunk).await?);
        }
        let combined = chunk_summaries.join(" ");
        self.summarize_once(&combined).await
    }

    async fn summarize_once(&self, text: &str) -> Result<String, AppError> {
        match self.completer.complete(&summary_prompt(text)).await {
            Ok(summary) => Ok(summary.trim().to_string()),
            Err(e) if !self.strict => {
                warn!(error = %e, "Summarization sub-call failed; degrading to empty summary");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }
}
