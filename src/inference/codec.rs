use std::path::Path;

use tokenizers::Tokenizer;

use super::TokenCodec;
use crate::error::{LoadError, TranslateError};

/// SentencePiece-style tokenizer for the Marian model, loaded from the
/// cached `tokenizer.json` artifact.
#[derive(Debug)]
pub struct MarianCodec {
    tokenizer: Tokenizer,
}

impl MarianCodec {
    pub fn load(path: &Path) -> std::result::Result<Self, LoadError> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| LoadError::TokenizerUnavailable(e.to_string()))?;

        Ok(Self { tokenizer })
    }
}

impl TokenCodec for MarianCodec {
    fn encode(
        &self,
        text: &str,
        max_tokens: usize,
    ) -> std::result::Result<Vec<u32>, TranslateError> {
        // No special tokens here: the model backend owns the single
        // terminating EOS, so one slot of the budget is reserved for it.
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| TranslateError::InferenceFailure(e.to_string()))?;

        let mut ids = encoding.get_ids().to_vec();
        ids.truncate(max_tokens.saturating_sub(1));
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> std::result::Result<String, TranslateError> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| TranslateError::InferenceFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "hello": 0, "world": 1, "<unk>": 2 },
            "unk_token": "<unk>"
        }
    }"#;

    fn codec(dir: &tempfile::TempDir) -> MarianCodec {
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, TINY_TOKENIZER).unwrap();
        MarianCodec::load(&path).unwrap()
    }

    #[test]
    fn test_encode_adds_no_special_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let codec = codec(&dir);

        // exactly one id per word; nothing appended by the tokenizer
        assert_eq!(codec.encode("hello world", 128).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_encode_reserves_room_for_terminating_eos() {
        let dir = tempfile::tempdir().unwrap();
        let codec = codec(&dir);

        let ids = codec.encode("hello world", 2).unwrap();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn test_decode_rebuilds_text() {
        let dir = tempfile::tempdir().unwrap();
        let codec = codec(&dir);

        assert_eq!(codec.decode(&[0, 1]).unwrap(), "hello world");
    }

    #[test]
    fn test_load_missing_tokenizer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = MarianCodec::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, LoadError::TokenizerUnavailable(_)));
    }
}
