// Inference architecture
//
// The session composes two seams:
// - TokenCodec: text to token ids and back (tokenizers-backed in production)
// - Seq2SeqModel: one forward generation pass (candle Marian in production)
//
// Tests substitute deterministic implementations at both seams.

pub mod codec;
pub mod marian;
pub mod session;

use std::time::Instant;

use crate::error::TranslateError;

pub use codec::MarianCodec;
pub use marian::MarianTranslator;
pub use session::InferenceSession;

/// Converts raw text to and from the numeric sequence the model consumes.
pub trait TokenCodec: Send {
    /// Encode text, truncating to at most `max_tokens` ids.
    fn encode(&self, text: &str, max_tokens: usize)
        -> std::result::Result<Vec<u32>, TranslateError>;

    /// Decode generated ids back into text, stripping special tokens.
    fn decode(&self, ids: &[u32]) -> std::result::Result<String, TranslateError>;
}

/// One forward generation pass over loaded weights. Implementations hold no
/// observable state between calls: the same input must yield the same output.
pub trait Seq2SeqModel: Send {
    fn generate(
        &mut self,
        input_ids: &[u32],
        deadline: Instant,
    ) -> std::result::Result<Vec<u32>, TranslateError>;
}
