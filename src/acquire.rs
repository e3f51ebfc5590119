use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, ModelConfig};
use crate::error::AcquisitionError;

/// Upper bound on a plausible safetensors header; anything claiming more is
/// garbage and must not drive an allocation.
const MAX_WEIGHTS_HEADER_BYTES: u64 = 25_000_000;

/// One downloadable model file and the format loader that vouches for it.
///
/// URLs are fixed per artifact: weights and config come from the upstream
/// Marian repository, while the tokenizer comes from a converted-tokenizer
/// mirror, because Marian repositories ship only sentencepiece files
/// (`source.spm`/`target.spm`/`vocab.json`) and no `tokenizers`-compatible
/// JSON.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub name: &'static str,
    pub filename: &'static str,
    pub url: &'static str,
    pub kind: ArtifactKind,
    pub size_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Serialized model weights (safetensors)
    Weights,
    /// Model hyperparameters (JSON)
    ModelConfig,
    /// Tokenizer definition (JSON)
    Tokenizer,
}

/// Observable artifact states. Downloading/unverified states are transient
/// inside `ensure` and never escape it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Absent,
    Valid,
    Corrupt,
}

impl ArtifactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "Missing",
            Self::Valid => "Valid",
            Self::Corrupt => "Corrupt",
        }
    }
}

/// Resolved local paths of a complete, validated artifact set.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    pub weights: PathBuf,
    pub config: PathBuf,
    pub tokenizer: PathBuf,
}

/// Transport seam for artifact downloads, so acquisition logic (validation,
/// bounded retry) is testable without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<(), AcquisitionError>;
}

/// Streaming HTTP fetcher. Writes the body chunk by chunk into a `.part`
/// file and renames into place only on success, so a failed download never
/// clobbers an existing artifact.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> std::result::Result<Self, AcquisitionError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AcquisitionError::NetworkFailure(e.to_string()))?;

        Ok(Self { client })
    }
}

fn classify_http_error(e: reqwest::Error) -> AcquisitionError {
    if e.is_timeout() {
        AcquisitionError::Timeout(e.to_string())
    } else {
        AcquisitionError::NetworkFailure(e.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<(), AcquisitionError> {
        let mut response = self.client.get(url).send().await.map_err(classify_http_error)?;

        if !response.status().is_success() {
            return Err(AcquisitionError::NetworkFailure(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let progress = response.content_length().map(|len| {
            let pb = ProgressBar::new(len);
            pb.set_style(ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("#>-"));
            pb
        });

        let temp_path = dest.with_extension("part");
        let mut file = async_fs::File::create(&temp_path).await?;

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await?;
                    if let Some(pb) = &progress {
                        pb.inc(chunk.len() as u64);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = async_fs::remove_file(&temp_path).await;
                    return Err(classify_http_error(e));
                }
            }
        }

        file.flush().await?;
        drop(file);

        async_fs::rename(&temp_path, dest).await?;

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }

        Ok(())
    }
}

/// Manages the local model artifact cache.
///
/// Artifact lifecycle: Absent -> Downloading -> Unverified -> Valid or
/// Corrupt. A corrupt artifact is deleted and re-downloaded at most
/// `max_retries` times, after which acquisition fails for the process run.
pub struct ArtifactStore {
    fetcher: Box<dyn Fetcher>,
    dir: PathBuf,
    max_retries: u32,
}

impl ArtifactStore {
    pub fn new(
        model: &ModelConfig,
        fetch: &FetchConfig,
    ) -> std::result::Result<Self, AcquisitionError> {
        fs::create_dir_all(&model.dir)?;

        Ok(Self {
            fetcher: Box::new(HttpFetcher::new(fetch)?),
            dir: PathBuf::from(&model.dir),
            max_retries: fetch.max_retries,
        })
    }

    /// Build a store around an explicit fetcher. Used by tests to substitute
    /// the network.
    pub fn with_fetcher(fetcher: Box<dyn Fetcher>, dir: PathBuf, max_retries: u32) -> Self {
        Self {
            fetcher,
            dir,
            max_retries,
        }
    }

    /// The fixed artifact catalog for the ar-en Marian model.
    pub fn artifacts() -> Vec<ArtifactSpec> {
        vec![
            ArtifactSpec {
                name: "weights",
                filename: "model.safetensors",
                url: "https://huggingface.co/Helsinki-NLP/opus-mt-ar-en/resolve/main/model.safetensors",
                kind: ArtifactKind::Weights,
                size_mb: 306.0,
            },
            ArtifactSpec {
                name: "config",
                filename: "config.json",
                url: "https://huggingface.co/Helsinki-NLP/opus-mt-ar-en/resolve/main/config.json",
                kind: ArtifactKind::ModelConfig,
                size_mb: 0.1,
            },
            ArtifactSpec {
                name: "tokenizer",
                filename: "tokenizer.json",
                url: "https://huggingface.co/Xenova/opus-mt-ar-en/resolve/main/tokenizer.json",
                kind: ArtifactKind::Tokenizer,
                size_mb: 2.4,
            },
        ]
    }

    pub fn local_path(&self, spec: &ArtifactSpec) -> PathBuf {
        self.dir.join(spec.filename)
    }

    pub fn state(&self, spec: &ArtifactSpec) -> ArtifactState {
        let path = self.local_path(spec);
        if !path.exists() {
            ArtifactState::Absent
        } else if Self::validate(spec.kind, &path).is_ok() {
            ArtifactState::Valid
        } else {
            ArtifactState::Corrupt
        }
    }

    /// Delete a cached artifact if present. Used by forced re-fetch.
    pub fn remove(&self, spec: &ArtifactSpec) -> std::result::Result<(), AcquisitionError> {
        let path = self.local_path(spec);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Ensure one artifact is present and valid locally.
    ///
    /// A valid cached file short-circuits with no network call. Otherwise the
    /// artifact is downloaded and validated; a download classified `Corrupt`
    /// is deleted and re-fetched up to `max_retries` more times before the
    /// whole acquisition is declared fatal.
    pub async fn ensure(
        &self,
        spec: &ArtifactSpec,
    ) -> std::result::Result<PathBuf, AcquisitionError> {
        let path = self.local_path(spec);

        if path.exists() {
            match Self::validate(spec.kind, &path) {
                Ok(()) => {
                    debug!("Artifact {} already valid at {}", spec.name, path.display());
                    return Ok(path);
                }
                Err(AcquisitionError::Corrupt(reason)) => {
                    warn!(
                        "Cached artifact {} failed validation ({}), re-downloading",
                        spec.name, reason
                    );
                    fs::remove_file(&path)?;
                }
                Err(e) => return Err(e),
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(
                "Downloading {} ({:.1} MB) from {}",
                spec.name, spec.size_mb, spec.url
            );
            self.fetcher.fetch(spec.url, &path).await?;

            match Self::validate(spec.kind, &path) {
                Ok(()) => {
                    info!("Artifact {} downloaded and validated", spec.name);
                    return Ok(path);
                }
                Err(AcquisitionError::Corrupt(reason)) => {
                    fs::remove_file(&path)?;
                    if attempt > self.max_retries {
                        return Err(AcquisitionError::FatalAfterRetry(format!(
                            "{}: {}",
                            spec.filename, reason
                        )));
                    }
                    warn!(
                        "Downloaded artifact {} is corrupt ({}), retrying",
                        spec.name, reason
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ensure the full artifact set and return the resolved paths.
    pub async fn ensure_all(&self) -> std::result::Result<ModelPaths, AcquisitionError> {
        let mut paths = ModelPaths::default();
        for spec in Self::artifacts() {
            let path = self.ensure(&spec).await?;
            match spec.kind {
                ArtifactKind::Weights => paths.weights = path,
                ArtifactKind::ModelConfig => paths.config = path,
                ArtifactKind::Tokenizer => paths.tokenizer = path,
            }
        }
        Ok(paths)
    }

    /// Run the expected format loader against the file, classifying failures
    /// as `Corrupt`. Weights are checked by their safetensors header alone
    /// (never buffering the multi-hundred-MB payload); JSON artifacts must
    /// parse as objects, with deep deserialization deferred to session load.
    fn validate(kind: ArtifactKind, path: &Path) -> std::result::Result<(), AcquisitionError> {
        match kind {
            ArtifactKind::Weights => {
                let mut file = fs::File::open(path)?;

                let mut len_buf = [0u8; 8];
                file.read_exact(&mut len_buf).map_err(|e| {
                    AcquisitionError::Corrupt(format!("truncated safetensors header: {}", e))
                })?;

                let header_len = u64::from_le_bytes(len_buf);
                if header_len > MAX_WEIGHTS_HEADER_BYTES {
                    return Err(AcquisitionError::Corrupt(format!(
                        "implausible safetensors header length {}",
                        header_len
                    )));
                }

                let mut buf = vec![0u8; 8 + header_len as usize];
                buf[..8].copy_from_slice(&len_buf);
                file.read_exact(&mut buf[8..]).map_err(|e| {
                    AcquisitionError::Corrupt(format!("truncated safetensors header: {}", e))
                })?;

                safetensors::SafeTensors::read_metadata(&buf)
                    .map(|_| ())
                    .map_err(|e| {
                        AcquisitionError::Corrupt(format!("not a valid safetensors file: {}", e))
                    })
            }
            ArtifactKind::ModelConfig | ArtifactKind::Tokenizer => {
                let buf = fs::read(path)?;
                match serde_json::from_slice::<serde_json::Value>(&buf) {
                    Ok(serde_json::Value::Object(_)) => Ok(()),
                    Ok(_) => Err(AcquisitionError::Corrupt(
                        "expected a JSON object".to_string(),
                    )),
                    Err(e) => Err(AcquisitionError::Corrupt(format!("malformed JSON: {}", e))),
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use std::sync::Arc;

    fn weights_spec() -> ArtifactSpec {
        ArtifactStore::artifacts()
            .into_iter()
            .find(|s| s.kind == ArtifactKind::Weights)
            .unwrap()
    }

    fn store_with(fetcher: Arc<QueueFetcher>, dir: &Path) -> ArtifactStore {
        struct Shared(Arc<QueueFetcher>);

        #[async_trait]
        impl Fetcher for Shared {
            async fn fetch(
                &self,
                url: &str,
                dest: &Path,
            ) -> std::result::Result<(), AcquisitionError> {
                self.0.fetch(url, dest).await
            }
        }

        ArtifactStore::with_fetcher(Box::new(Shared(fetcher)), dir.to_path_buf(), 1)
    }

    #[test]
    fn test_catalog_urls_match_filenames() {
        for spec in ArtifactStore::artifacts() {
            assert!(spec.url.starts_with("https://"));
            assert!(spec.url.ends_with(spec.filename));
        }

        // Marian repositories ship only sentencepiece files; the tokenizer
        // must come from a converted-tokenizer mirror, not the model repo
        let tokenizer = ArtifactStore::artifacts()
            .into_iter()
            .find(|s| s.kind == ArtifactKind::Tokenizer)
            .unwrap();
        assert!(!tokenizer.url.contains("Helsinki-NLP"));
        assert!(tokenizer.url.contains("opus-mt-ar-en"));
    }

    #[tokio::test]
    async fn test_missing_artifact_downloaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(QueueFetcher::new(vec![valid_weights()]));
        let store = store_with(fetcher.clone(), dir.path());
        let spec = weights_spec();

        let path = store.ensure(&spec).await.unwrap();

        assert!(path.exists());
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.state(&spec), ArtifactState::Valid);
    }

    #[tokio::test]
    async fn test_valid_artifact_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let spec = weights_spec();
        fs::write(dir.path().join(spec.filename), valid_weights()).unwrap();

        let fetcher = Arc::new(QueueFetcher::new(vec![]));
        let store = store_with(fetcher.clone(), dir.path());

        store.ensure(&spec).await.unwrap();

        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_deleted_and_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let spec = weights_spec();
        fs::write(dir.path().join(spec.filename), b"garbage").unwrap();

        let fetcher = Arc::new(QueueFetcher::new(vec![valid_weights()]));
        let store = store_with(fetcher.clone(), dir.path());

        let path = store.ensure(&spec).await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.state(&spec), ArtifactState::Valid);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_persistent_corruption_fails_after_bounded_retry() {
        let dir = tempfile::tempdir().unwrap();
        let spec = weights_spec();
        let fetcher = Arc::new(QueueFetcher::new(vec![
            b"garbage".to_vec(),
            b"still garbage".to_vec(),
        ]));
        let store = store_with(fetcher.clone(), dir.path());

        let err = store.ensure(&spec).await.unwrap_err();

        // one download plus exactly one retry, then escalation
        assert_eq!(fetcher.calls(), 2);
        assert!(matches!(err, AcquisitionError::FatalAfterRetry(_)));
        assert_eq!(store.state(&spec), ArtifactState::Absent);
    }

    #[tokio::test]
    async fn test_network_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ArtifactStore::with_fetcher(Box::new(FailingFetcher), dir.path().to_path_buf(), 1);

        let err = store.ensure(&weights_spec()).await.unwrap_err();

        assert!(matches!(err, AcquisitionError::NetworkFailure(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_propagates_unchanged() {
        struct TimeoutFetcher;

        #[async_trait]
        impl Fetcher for TimeoutFetcher {
            async fn fetch(
                &self,
                _url: &str,
                _dest: &Path,
            ) -> std::result::Result<(), AcquisitionError> {
                Err(AcquisitionError::Timeout("deadline elapsed".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store =
            ArtifactStore::with_fetcher(Box::new(TimeoutFetcher), dir.path().to_path_buf(), 1);

        let err = store.ensure(&weights_spec()).await.unwrap_err();

        assert!(matches!(err, AcquisitionError::Timeout(_)));
    }

    #[test]
    fn test_validation_failure_classified_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        fs::write(&path, b"garbage").unwrap();

        let err = ArtifactStore::validate(ArtifactKind::Weights, &path).unwrap_err();

        assert!(matches!(err, AcquisitionError::Corrupt(_)));
    }

    #[test]
    fn test_weights_header_checked_without_reading_payload() {
        let dir = tempfile::tempdir().unwrap();

        // implausible header length must fail fast, not drive an allocation
        let bogus = dir.path().join("bogus.safetensors");
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        fs::write(&bogus, bytes).unwrap();
        assert!(matches!(
            ArtifactStore::validate(ArtifactKind::Weights, &bogus).unwrap_err(),
            AcquisitionError::Corrupt(_)
        ));

        // header claiming more bytes than the file holds
        let truncated = dir.path().join("truncated.safetensors");
        let mut bytes = 64u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        fs::write(&truncated, bytes).unwrap();
        assert!(matches!(
            ArtifactStore::validate(ArtifactKind::Weights, &truncated).unwrap_err(),
            AcquisitionError::Corrupt(_)
        ));

        // a well-formed header alone is enough
        let valid = dir.path().join("valid.safetensors");
        fs::write(&valid, testutil::valid_weights()).unwrap();
        assert!(ArtifactStore::validate(ArtifactKind::Weights, &valid).is_ok());
    }

    #[tokio::test]
    async fn test_json_artifact_must_be_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ArtifactStore::artifacts()
            .into_iter()
            .find(|s| s.kind == ArtifactKind::ModelConfig)
            .unwrap();

        let fetcher = Arc::new(QueueFetcher::new(vec![
            b"[1, 2, 3]".to_vec(),
            br#"{"d_model": 512}"#.to_vec(),
        ]));
        let store = store_with(fetcher.clone(), dir.path());

        let path = store.ensure(&spec).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_ensure_all_resolves_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(QueueFetcher::new(vec![
            valid_weights(),
            br#"{"d_model": 512}"#.to_vec(),
            br#"{"version": "1.0"}"#.to_vec(),
        ]));
        let store = store_with(fetcher.clone(), dir.path());

        let paths = store.ensure_all().await.unwrap();

        assert!(paths.weights.exists());
        assert!(paths.config.exists());
        assert!(paths.tokenizer.exists());
        assert_eq!(fetcher.calls(), 3);
    }
}
