// Text encoder
// Prefixing, tokenization, model forward pass, mean pooling and L2 normalization

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pooling;


use std::path::Path;

use tokenizers::{PaddingStrategy, Tokenizer};
use tracing::debug;

use crate::{RecipeError, Result};

/// Tokenized batch, padded to its longest row. Matrices are row-major `[batch, seq_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub batch_size: usize,
    pub seq_len: usize,
}

/// Per-token output of the model, row-major `[batch, seq_len, hidden_size]`
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenStates {
    pub data: Vec<f32>,
    pub batch_size: usize,
    pub seq_len: usize,
    pub hidden_size: usize,
}

/// A text-to-hidden-state model run once per batch
pub trait HiddenStateModel: Send + Sync {
    fn forward(&self, batch: &TokenBatch) -> Result<HiddenStates>;
}

/// Apply the role prefix the same way for every caller.
///
/// Texts are trimmed; a non-empty prefix is joined with a single space.
#[inline]
pub fn prepare_inputs(texts: &[String], prefix: &str) -> Vec<String> {
    let prefix = prefix.trim();

    texts
        .iter()
        .map(|text| {
            let text = text.trim();
            if prefix.is_empty() {
                text.to_string()
            } else {
                format!("{} {}", prefix, text).trim().to_string()
            }
        })
        .collect()
}

/// Tokenizer and model loaded once, read-only afterwards
pub struct TextEncoder {
    tokenizer: Tokenizer,
    model: Box<dyn HiddenStateModel>,
    model_name: String,
    max_length: usize,
}

impl std::fmt::Debug for TextEncoder {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEncoder")
            .field("model_name", &self.model_name)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl TextEncoder {
    /// Configure `tokenizer` for batch-longest padding and `max_length` truncation
    #[inline]
    pub fn new(
        mut tokenizer: Tokenizer,
        model: Box<dyn HiddenStateModel>,
        model_name: impl Into<String>,
        max_length: usize,
    ) -> Result<Self> {
        if max_length == 0 {
            return Err(RecipeError::Config(
                "max_length must be greater than zero".to_string(),
            ));
        }

        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));

        let mut truncation = tokenizer.get_truncation().cloned().unwrap_or_default();
        truncation.max_length = max_length;
        tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| RecipeError::Config(format!("Invalid truncation settings: {}", e)))?;

        Ok(Self {
            tokenizer,
            model,
            model_name: model_name.into(),
            max_length,
        })
    }

    /// Load `tokenizer.json` from disk and pair it with `model`
    #[inline]
    pub fn from_tokenizer_file(
        path: &Path,
        model: Box<dyn HiddenStateModel>,
        model_name: impl Into<String>,
        max_length: usize,
    ) -> Result<Self> {
        debug!("Loading tokenizer from {:?}", path);
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            RecipeError::Config(format!(
                "Failed to load tokenizer from {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::new(tokenizer, model, model_name, max_length)
    }

    /// Load the tokenizer and ONNX model named by `config`
    #[cfg(feature = "onnx")]
    #[inline]
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        let model = onnx::OnnxModel::load(
            &config.model_path(),
            config.encoder.intra_op_threads,
            config.encoder.inter_op_threads,
        )?;

        Self::from_tokenizer_file(
            &config.tokenizer_file(),
            Box::new(model),
            config.encoder.model_name.clone(),
            config.encoder.max_length,
        )
    }

    #[inline]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[inline]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Tokenize already-prefixed inputs into one padded batch
    #[inline]
    pub fn tokenize(&self, inputs: Vec<String>) -> Result<TokenBatch> {
        let batch_size = inputs.len();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| RecipeError::EncodingBackend(format!("Tokenization failed: {}", e)))?;

        let seq_len = encodings.first().map_or(0, |encoding| encoding.len());
        if encodings.iter().any(|encoding| encoding.len() != seq_len) {
            return Err(RecipeError::EncodingBackend(
                "Tokenizer produced rows of unequal length".to_string(),
            ));
        }

        let mut batch = TokenBatch {
            input_ids: Vec::with_capacity(batch_size * seq_len),
            attention_mask: Vec::with_capacity(batch_size * seq_len),
            token_type_ids: Vec::with_capacity(batch_size * seq_len),
            batch_size,
            seq_len,
        };

        for encoding in &encodings {
            batch
                .input_ids
                .extend(encoding.get_ids().iter().map(|&id| i64::from(id)));
            batch
                .attention_mask
                .extend(encoding.get_attention_mask().iter().map(|&m| i64::from(m)));
            batch
                .token_type_ids
                .extend(encoding.get_type_ids().iter().map(|&t| i64::from(t)));
        }

        Ok(batch)
    }

    /// One vector per text, in input order.
    ///
    /// Empty input returns immediately without touching the model. Any
    /// failure fails the whole call.
    #[inline]
    pub fn encode(&self, texts: &[String], prefix: &str, normalize: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.tokenize(prepare_inputs(texts, prefix))?;
        let states = self.model.forward(&batch)?;

        if states.batch_size != batch.batch_size
            || states.seq_len != batch.seq_len
            || states.hidden_size == 0
            || states.data.len() != states.batch_size * states.seq_len * states.hidden_size
        {
            return Err(RecipeError::EncodingBackend(format!(
                "Model returned shape [{}, {}, {}] with {} values for a [{}, {}] batch",
                states.batch_size,
                states.seq_len,
                states.hidden_size,
                states.data.len(),
                batch.batch_size,
                batch.seq_len
            )));
        }

        let mut vectors = pooling::mean_pool(
            &states.data,
            &batch.attention_mask,
            batch.batch_size,
            batch.seq_len,
            states.hidden_size,
        );

        if normalize {
            vectors
                .iter_mut()
                .for_each(|vector| pooling::l2_normalize(vector));
        }

        debug!(
            "Encoded {} texts into {}-dimensional vectors",
            vectors.len(),
            states.hidden_size
        );
        Ok(vectors)
    }
}
