use thiserror::Error;

/// Failures while fetching or validating model artifacts.
///
/// Corruption is handled locally with a bounded delete-and-retry; anything
/// past the retry cap escalates as `FatalAfterRetry` instead of looping.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("fetch timed out: {0}")]
    Timeout(String),

    #[error("artifact failed validation: {0}")]
    Corrupt(String),

    #[error("artifact still invalid after re-download: {0}")]
    FatalAfterRetry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while loading the tokenizer or model into memory.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("tokenizer unavailable: {0}")]
    TokenizerUnavailable(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Per-request translation failures. These are recoverable: the caller may
/// retry with new input without restarting the process.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("inference failure: {0}")]
    InferenceFailure(String),

    #[error("generation exceeded {0} seconds")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum TarjamaError {
    #[error("Model acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Model load error: {0}")]
    Load(#[from] LoadError),

    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TarjamaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_wrap_into_crate_error() {
        assert!(matches!(
            TarjamaError::from(AcquisitionError::NetworkFailure("down".to_string())),
            TarjamaError::Acquisition(_)
        ));
        assert!(matches!(
            TarjamaError::from(LoadError::TokenizerUnavailable("missing".to_string())),
            TarjamaError::Load(_)
        ));
        assert!(matches!(
            TarjamaError::from(TranslateError::EmptyInput),
            TarjamaError::Translate(_)
        ));
    }
}
