use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::marian;
use tracing::debug;

use super::Seq2SeqModel;
use crate::config::InferenceConfig;
use crate::error::{LoadError, TranslateError};

/// Marian NMT backend on the candle runtime.
///
/// Inference only: weights are memory-mapped read-only, decoding is greedy
/// (no temperature, so output is deterministic), and the KV cache is reset
/// at the start of every request so calls are independent.
pub struct MarianTranslator {
    model: marian::MTModel,
    config: marian::Config,
    device: Device,
    seed: u64,
    max_output_tokens: usize,
    generation_timeout_secs: u64,
}

impl MarianTranslator {
    pub fn load(
        config_path: &Path,
        weights_path: &Path,
        inference: &InferenceConfig,
    ) -> std::result::Result<Self, LoadError> {
        let raw = std::fs::read_to_string(config_path)
            .map_err(|e| LoadError::ModelUnavailable(format!("cannot read model config: {}", e)))?;
        let config: marian::Config = serde_json::from_str(&raw)
            .map_err(|e| LoadError::ModelUnavailable(format!("cannot parse model config: {}", e)))?;

        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| LoadError::ModelUnavailable(format!("cannot map weights: {}", e)))?
        };
        let model = marian::MTModel::new(&config, vb)
            .map_err(|e| LoadError::ModelUnavailable(format!("cannot build model: {}", e)))?;

        Ok(Self {
            model,
            config,
            device,
            seed: inference.seed,
            max_output_tokens: inference.max_output_tokens,
            generation_timeout_secs: inference.generation_timeout_secs,
        })
    }
}

impl Seq2SeqModel for MarianTranslator {
    fn generate(
        &mut self,
        input_ids: &[u32],
        deadline: Instant,
    ) -> std::result::Result<Vec<u32>, TranslateError> {
        let fail = |e: candle_core::Error| TranslateError::InferenceFailure(e.to_string());

        // Stale decoder state from a previous request would leak into this
        // one; clear it up front.
        self.model.reset_kv_cache();

        // The codec encodes without special tokens; the single terminating
        // EOS is appended here.
        let mut source = input_ids.to_vec();
        source.push(self.config.eos_token_id);
        let source = Tensor::new(source.as_slice(), &self.device)
            .map_err(fail)?
            .unsqueeze(0)
            .map_err(fail)?;
        let encoder_xs = self.model.encoder().forward(&source, 0).map_err(fail)?;

        let mut logits_processor = LogitsProcessor::new(self.seed, None, None);
        let mut token_ids = vec![self.config.decoder_start_token_id];

        for index in 0..self.max_output_tokens {
            if Instant::now() >= deadline {
                return Err(TranslateError::Timeout(self.generation_timeout_secs));
            }

            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input = Tensor::new(&token_ids[start_pos..], &self.device)
                .map_err(fail)?
                .unsqueeze(0)
                .map_err(fail)?;

            let logits = self.model.decode(&input, &encoder_xs, start_pos).map_err(fail)?;
            let logits = logits.squeeze(0).map_err(fail)?;
            let last = logits.dim(0).map_err(fail)? - 1;
            let logits = logits.get(last).map_err(fail)?;

            let token = logits_processor.sample(&logits).map_err(fail)?;
            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            token_ids.push(token);
        }

        debug!("Generated {} target tokens", token_ids.len() - 1);
        Ok(token_ids.split_off(1))
    }
}
