use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{MarianCodec, MarianTranslator, Seq2SeqModel, TokenCodec};
use crate::acquire::ModelPaths;
use crate::config::InferenceConfig;
use crate::error::{LoadError, TranslateError};

/// Owns the loaded tokenizer and model for the process lifetime.
///
/// Construct once with `load` after acquisition has produced a validated
/// artifact set, then reuse across requests; loading is far too expensive to
/// repeat per call. `translate` takes `&mut self`, which serializes requests
/// by construction. The session is `Send`, so a front-end serving several
/// users can wrap it in a mutex.
pub struct InferenceSession {
    codec: Box<dyn TokenCodec>,
    model: Box<dyn Seq2SeqModel>,
    max_input_tokens: usize,
    generation_timeout: Duration,
}

impl InferenceSession {
    pub fn load(
        paths: &ModelPaths,
        config: &InferenceConfig,
    ) -> std::result::Result<Self, LoadError> {
        info!("Loading tokenizer from {}", paths.tokenizer.display());
        let codec = MarianCodec::load(&paths.tokenizer)?;

        info!("Loading model weights from {}", paths.weights.display());
        let model = MarianTranslator::load(&paths.config, &paths.weights, config)?;

        Ok(Self::with_backends(Box::new(codec), Box::new(model), config))
    }

    /// Build a session from explicit backends. Tests use this to substitute
    /// deterministic codec and model implementations.
    pub fn with_backends(
        codec: Box<dyn TokenCodec>,
        model: Box<dyn Seq2SeqModel>,
        config: &InferenceConfig,
    ) -> Self {
        Self {
            codec,
            model,
            max_input_tokens: config.max_input_tokens,
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }

    /// Translate one input string.
    ///
    /// Empty (after trimming) input is rejected before any tokenizer or model
    /// work. No per-request state is retained, so repeated calls with the
    /// same input yield the same output.
    pub fn translate(&mut self, text: &str) -> std::result::Result<String, TranslateError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TranslateError::EmptyInput);
        }

        let input_ids = self.codec.encode(text, self.max_input_tokens)?;
        debug!("Encoded {} source tokens", input_ids.len());

        let deadline = Instant::now() + self.generation_timeout;
        let output_ids = self.model.generate(&input_ids, deadline)?;

        self.codec.decode(&output_ids)
    }
}
