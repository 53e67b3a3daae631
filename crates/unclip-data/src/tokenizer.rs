//! Tokenizer integration.

use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, PostProcessor, TruncationParams};
use unclip_core::{Result, SecretString, UnclipError};

/// Fixed-length token ids with their attention mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedText {
    /// Token ids, padded/truncated to the configured length.
    pub ids: Vec<u32>,
    /// 1 for real tokens, 0 for padding.
    pub attention_mask: Vec<u32>,
}

impl TokenizedText {
    /// Number of non-padding tokens.
    pub fn num_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Wrapper around the tokenizers library.
#[derive(Clone)]
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
    max_length: Option<usize>,
}

impl Tokenizer {
    /// Load a tokenizer from a local file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))?;
        Self::wrap(inner)
    }

    /// Load a tokenizer from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))?;
        Self::wrap(inner)
    }

    /// Load a tokenizer by identifier: local file, local directory, or Hub repo id.
    pub fn from_pretrained(
        name: &str,
        revision: Option<&str>,
        token: Option<&SecretString>,
    ) -> Result<Self> {
        let path = unclip_hub::resolve_tokenizer(name, revision, token)?;
        tracing::info!("Loading tokenizer {} from {}", name, path.display());
        Self::from_file(path)
    }

    fn wrap(mut inner: tokenizers::Tokenizer) -> Result<Self> {
        // Padding and truncation are owned by `with_max_length`.
        inner.with_padding(None);
        inner
            .with_truncation(None)
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))?;
        Ok(Self {
            inner,
            max_length: None,
        })
    }

    /// Pad and truncate every [`encode_fixed`](Self::encode_fixed) call to `max_length`.
    ///
    /// Truncation keeps the special tokens the post-processor adds, so
    /// `max_length` must leave room for them.
    pub fn with_max_length(mut self, max_length: usize) -> Result<Self> {
        let num_special = self.num_special_tokens();
        if max_length < num_special {
            return Err(UnclipError::Config(format!(
                "seq_len {max_length} is shorter than the {num_special} special tokens added by the tokenizer"
            )));
        }

        let pad_id = self.pad_token_id().unwrap_or(0);
        let pad_token = self
            .inner
            .id_to_token(pad_id)
            .unwrap_or_else(|| "<pad>".to_string());

        self.inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))?;
        self.inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_length),
            pad_id,
            pad_token,
            ..Default::default()
        }));
        self.max_length = Some(max_length);
        Ok(self)
    }

    /// The fixed length configured by [`with_max_length`](Self::with_max_length).
    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Number of special tokens added around a single sequence.
    pub fn num_special_tokens(&self) -> usize {
        self.inner
            .get_post_processor()
            .map_or(0, |p| p.added_tokens(false))
    }

    /// Encode text with special tokens, padded/truncated to the configured length.
    pub fn encode_fixed(&self, text: &str) -> Result<TokenizedText> {
        let max_length = self.max_length.ok_or_else(|| {
            UnclipError::Tokenizer("encode_fixed requires with_max_length".into())
        })?;

        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))?;

        let ids = encoding.get_ids().to_vec();
        let attention_mask = encoding.get_attention_mask().to_vec();
        if ids.len() != max_length || attention_mask.len() != max_length {
            return Err(UnclipError::ShapeMismatch {
                expected: vec![max_length],
                actual: vec![ids.len()],
            });
        }

        Ok(TokenizedText {
            ids,
            attention_mask,
        })
    }

    /// Encode text to token IDs, without special tokens, padding or truncation.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token IDs to text.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| UnclipError::Tokenizer(e.to_string()))
    }

    /// Get vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Get pad token ID if available.
    ///
    /// Tries common pad token names, falls back to EOS token.
    pub fn pad_token_id(&self) -> Option<u32> {
        self.inner
            .token_to_id("<pad>")
            .or_else(|| self.inner.token_to_id("[PAD]"))
            .or_else(|| self.inner.token_to_id("<|pad|>"))
            // Fallback to EOS token
            .or_else(|| self.inner.token_to_id("</s>"))
            .or_else(|| self.inner.token_to_id("<|endoftext|>"))
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("max_length", &self.max_length)
            .finish()
    }
}
