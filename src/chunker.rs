//! Token-bounded text splitting.
//!
//! Chunks are measured in cl100k BPE tokens (the embedding/completion model
//! family's vocabulary), not characters, so chunk boundaries line up with
//! what the upstream models actually see.

use tiktoken_rs::CoreBPE;
use tracing::warn;

use crate::errors::AppError;

pub struct Chunker {
    bpe: CoreBPE,
}

impl Chunker {
    pub fn new() -> Result<Self, AppError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("load cl100k tokenizer: {e}")))?;
        Ok(Self { bpe })
    }

    /// Split `text` into chunks of at most `chunk_size` tokens; the last
    /// chunk may be shorter. Empty input yields no chunks.
    ///
    /// A token decode failure drops the whole document to an empty result:
    /// the caller proceeds with zero chunks, so the upload "succeeds" while
    /// contributing nothing to the index. Logged loudly for that reason.
    pub fn split(&self, text: &str, chunk_size: usize) -> Vec<String> {
        let tokens = self.bpe.encode_with_special_tokens(text);
        let mut chunks = Vec::with_capacity(tokens.len().div_ceil(chunk_size.max(1)));
        for window in tokens.chunks(chunk_size.max(1)) {
            match self.bpe.decode(window.to_vec()) {
                Ok(piece) => chunks.push(piece),
                Err(e) => {
                    warn!(
                        error = %e,
                        chunk_size,
                        "Token decode failed; dropping all chunks for this text"
                    );
                    return Vec::new();
                }
            }
        }
        chunks
    }
}
