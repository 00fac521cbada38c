use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use tokio::sync::Mutex;
use sha2::{Sha256, Digest};

use crate::models::{BuiltinModel, ModelInfo};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Keeps embedding model files in a local cache directory.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("SCANALYZE_CACHE") {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("scanalyze").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("scanalyze").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("scanalyze").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, model: BuiltinModel) -> PathBuf {
        let info = model.get_model_info();
        self.models_dir.join(info.name).join("model.onnx")
    }

    /// Path of the SHA-256 recorded when the model was downloaded.
    pub fn get_digest_path(&self, model: BuiltinModel) -> PathBuf {
        let info = model.get_model_info();
        self.models_dir.join(info.name).join("model.onnx.sha256")
    }

    pub fn is_model_downloaded(&self, model: BuiltinModel) -> bool {
        let model_path = self.get_model_path(model);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        model_path.exists()
    }

    /// Returns the model path once the file matches its expected SHA-256.
    ///
    /// # Errors
    /// - `NotDownloaded` if the file is missing
    /// - `VerificationFailed` if no digest is known for the file
    /// - `HashMismatch` if the file does not match its digest
    pub fn require_model(&self, model: BuiltinModel) -> Result<PathBuf, ModelError> {
        let model_path = self.get_model_path(model);
        if !model_path.exists() {
            return Err(ModelError::NotDownloaded(format!(
                "{:?} (expected at {:?})",
                model, model_path
            )));
        }

        let Some(expected) = self.expected_hash(model)? else {
            log::error!("No digest recorded for {:?}", model_path);
            return Err(ModelError::VerificationFailed);
        };
        let actual = sha256_hex(&fs::read(&model_path)?);
        if actual != expected {
            log::error!("model hash mismatch: expected {}, got {}", expected, actual);
            return Err(ModelError::HashMismatch {
                file_type: "model".to_string(),
                expected,
                actual,
            });
        }
        Ok(model_path)
    }

    /// The published hash if there is one, else the digest recorded at download time.
    fn expected_hash(&self, model: BuiltinModel) -> Result<Option<String>, ModelError> {
        if let Some(hash) = model.get_model_info().model_hash {
            return Ok(Some(hash));
        }
        let digest_path = self.get_digest_path(model);
        if !digest_path.exists() {
            return Ok(None);
        }
        let digest = fs::read_to_string(&digest_path)?.trim().to_lowercase();
        Ok(Some(digest))
    }

    pub async fn download_model(&self, model: BuiltinModel) -> Result<(), ModelError> {
        let info = model.get_model_info();
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&info.name);
        log::info!("Creating model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let result = if self.verify_model(model)? {
            log::info!("Existing model file verified successfully");
            Ok(())
        } else {
            log::info!("Downloading model to {:?}", self.get_model_path(model));
            self.download_and_verify_file(model, &info).await
        };

        if let Err(e) = &result {
            log::error!("Failed to setup model file: {}", e);
            // Cleanup on failure
            let _ = self.remove_download(model);
        }
        result
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Calculated hash: {} (expected {})", hash, expected_hash);
        Ok(hash == expected_hash)
    }

    /// Returns `Ok(false)` when the file is missing, has no known digest, or does not match it.
    pub fn verify_model(&self, model: BuiltinModel) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(model);

        if !model_path.exists() {
            log::info!("Model file {:?} does not exist", model_path);
            return Ok(false);
        }

        match self.expected_hash(model)? {
            Some(expected) => self.verify_file(&model_path, &expected),
            None => {
                log::warn!("No digest recorded for {:?}, treating it as unverified", model_path);
                Ok(false)
            }
        }
    }

    async fn download_and_verify_file(
        &self,
        model: BuiltinModel,
        info: &ModelInfo,
    ) -> Result<(), ModelError> {
        let path = self.get_model_path(model);
        log::info!("Downloading model file from {} to {:?}", info.model_url, path);
        let response = reqwest::get(&info.model_url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = sha256_hex(&bytes);
        if let Some(expected) = info.model_hash.as_deref() {
            if hash != expected {
                log::error!("model hash mismatch: expected {}, got {}", expected, hash);
                return Err(ModelError::HashMismatch {
                    file_type: "model".to_string(),
                    expected: expected.to_string(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &bytes)?;
        // Later loads are checked against this digest
        fs::write(self.get_digest_path(model), &hash)?;

        // Verify after writing
        if !self.verify_file(&path, &hash)? {
            return Err(ModelError::VerificationFailed);
        }

        log::info!("Model file downloaded and verified successfully (sha256 {})", hash);
        Ok(())
    }

    pub fn remove_download(&self, model: BuiltinModel) -> Result<(), ModelError> {
        for path in [self.get_model_path(model), self.get_digest_path(model)] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified.
    /// If the model doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_model_downloaded(&self, model: BuiltinModel) -> Result<(), ModelError> {
        log::info!("Checking if model {:?} is downloaded...", model);
        if !self.is_model_downloaded(model) {
            log::info!("Model not found, downloading...");
            self.download_model(model).await?;
        } else if !self.verify_model(model)? {
            log::info!("Model verification failed, re-downloading...");
            self.remove_download(model)?;
            self.download_model(model).await?;
        } else {
            log::info!("Model verification successful");
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_manager(name: &str) -> ModelManager {
        let dir = env::temp_dir().join("scanalyze-test").join(name);
        let _ = fs::remove_dir_all(&dir);
        ModelManager::new(&dir).unwrap()
    }

    #[test]
    fn test_model_paths() {
        let manager = temp_manager("paths");
        let path = manager.get_model_path(BuiltinModel::DenseNet121);
        assert!(path.ends_with("densenet121/model.onnx"));
        assert!(path.starts_with(manager.models_dir()));
    }

    #[test]
    fn test_missing_model_reported() {
        let manager = temp_manager("missing");
        assert!(!manager.is_model_downloaded(BuiltinModel::DenseNet121));
        assert!(!manager.verify_model(BuiltinModel::DenseNet121).unwrap());
        assert!(matches!(
            manager.require_model(BuiltinModel::DenseNet121),
            Err(ModelError::NotDownloaded(_))
        ));
    }

    #[test]
    fn test_remove_download() -> Result<(), ModelError> {
        let manager = temp_manager("remove");
        let path = manager.get_model_path(BuiltinModel::DenseNet121);
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, b"weights")?;
        assert!(manager.is_model_downloaded(BuiltinModel::DenseNet121));

        manager.remove_download(BuiltinModel::DenseNet121)?;
        assert!(!manager.is_model_downloaded(BuiltinModel::DenseNet121));
        Ok(())
    }

    #[test]
    fn test_verify_file_with_hash() -> Result<(), ModelError> {
        let manager = temp_manager("verify");
        let path = manager.models_dir().join("blob.bin");
        fs::write(&path, b"abc")?;

        let expected = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(manager.verify_file(&path, expected)?);
        assert!(!manager.verify_file(&path, "0000")?);
        Ok(())
    }

    #[test]
    fn test_recorded_digest_guards_model() -> Result<(), ModelError> {
        let manager = temp_manager("digest");
        let model = BuiltinModel::DenseNet121;
        let path = manager.get_model_path(model);
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, b"weights")?;

        // A file without any digest is never trusted
        assert!(!manager.verify_model(model)?);
        assert!(matches!(manager.require_model(model), Err(ModelError::VerificationFailed)));

        fs::write(manager.get_digest_path(model), sha256_hex(b"weights"))?;
        assert!(manager.verify_model(model)?);
        assert_eq!(manager.require_model(model)?, path);

        fs::write(&path, b"tampered weights")?;
        assert!(!manager.verify_model(model)?);
        assert!(matches!(
            manager.require_model(model),
            Err(ModelError::HashMismatch { .. })
        ));

        manager.remove_download(model)?;
        assert!(!manager.get_digest_path(model).exists());
        Ok(())
    }

    #[test]
    fn test_default_models_dir() {
        // Test with environment variable
        env::set_var("SCANALYZE_CACHE", "/tmp/scanalyze-env-cache");
        let path = ModelManager::get_default_models_dir();
        assert!(path.to_str().unwrap().contains("/tmp/scanalyze-env-cache/models"));
        env::remove_var("SCANALYZE_CACHE");

        // Test without environment variable
        let path = ModelManager::get_default_models_dir();
        assert!(path.to_str().unwrap().contains("scanalyze"));
    }
}
