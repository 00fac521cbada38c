use std::path::PathBuf;

use scanalyze::{BuiltinModel, ModelError, ModelManager};
use sha2::{Digest, Sha256};

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("scanalyze-manager-{}-{}", name, std::process::id()))
}

#[tokio::test]
async fn test_model_paths() -> Result<(), Box<dyn std::error::Error>> {
    let dir = scratch_dir("paths");
    let manager = ModelManager::new(&dir)?;
    let model_path = manager.get_model_path(BuiltinModel::DenseNet121);

    assert!(model_path.starts_with(&dir));
    assert!(model_path.ends_with("densenet121/model.onnx"));
    assert_eq!(manager.models_dir(), dir.as_path());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[tokio::test]
async fn test_missing_model() -> Result<(), Box<dyn std::error::Error>> {
    let dir = scratch_dir("missing");
    let manager = ModelManager::new(&dir)?;

    assert!(!manager.is_model_downloaded(BuiltinModel::DenseNet121));
    assert!(!manager.verify_model(BuiltinModel::DenseNet121)?);
    assert!(matches!(
        manager.require_model(BuiltinModel::DenseNet121),
        Err(ModelError::NotDownloaded(_))
    ));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[test]
fn test_unverified_model_is_not_trusted() -> Result<(), Box<dyn std::error::Error>> {
    let dir = scratch_dir("unverified");
    let manager = ModelManager::new(&dir)?;
    let model_path = manager.get_model_path(BuiltinModel::DenseNet121);
    std::fs::create_dir_all(model_path.parent().unwrap())?;
    std::fs::write(&model_path, b"onnx weights")?;

    // Present on disk, but nothing vouches for it: ensure_model_downloaded replaces it
    assert!(manager.is_model_downloaded(BuiltinModel::DenseNet121));
    assert!(!manager.verify_model(BuiltinModel::DenseNet121)?);
    assert!(matches!(
        manager.require_model(BuiltinModel::DenseNet121),
        Err(ModelError::VerificationFailed)
    ));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_verified_model_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let dir = scratch_dir("verified");
    let manager = ModelManager::new(&dir)?;
    let model_path = manager.get_model_path(BuiltinModel::DenseNet121);
    std::fs::create_dir_all(model_path.parent().unwrap())?;
    std::fs::write(&model_path, b"onnx weights")?;
    std::fs::write(
        manager.get_digest_path(BuiltinModel::DenseNet121),
        sha256_hex(b"onnx weights"),
    )?;

    assert_eq!(manager.require_model(BuiltinModel::DenseNet121)?, model_path);
    tokio_test::block_on(manager.ensure_model_downloaded(BuiltinModel::DenseNet121))?;
    assert_eq!(std::fs::read(&model_path)?, b"onnx weights");

    // A modified file no longer matches the recorded digest
    std::fs::write(&model_path, b"patched weights")?;
    assert!(matches!(
        manager.require_model(BuiltinModel::DenseNet121),
        Err(ModelError::HashMismatch { .. })
    ));

    manager.remove_download(BuiltinModel::DenseNet121)?;
    assert!(!manager.is_model_downloaded(BuiltinModel::DenseNet121));
    // Removing twice is fine
    manager.remove_download(BuiltinModel::DenseNet121)?;

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[tokio::test]
#[ignore = "downloads the model over the network"]
async fn test_default_model_manager() -> Result<(), ModelError> {
    let manager = ModelManager::new_default()?;
    manager.ensure_model_downloaded(BuiltinModel::DenseNet121).await?;

    assert!(manager.is_model_downloaded(BuiltinModel::DenseNet121));
    assert!(manager.verify_model(BuiltinModel::DenseNet121)?);
    Ok(())
}
