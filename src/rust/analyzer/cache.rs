use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::{debug, info};

use super::embedding::{ImageEmbedder, OnnxEmbedder};
use super::error::AnalysisError;
use crate::models::InputLayout;
use crate::runtime::RuntimeConfig;

lazy_static! {
    static ref GLOBAL_CACHE: EmbeddingCache = EmbeddingCache::new();
}

/// Owner of loaded embedding models, keyed by their configuration.
///
/// Each key is loaded at most once: the loader runs while the cache lock is
/// held, so concurrent acquisitions of the same key wait for the first one and
/// then share its handle. A failed load leaves nothing behind, so a later
/// acquisition retries it. Handles are plain `Arc`s; inference through them
/// never touches the lock.
#[derive(Default)]
pub struct EmbeddingCache {
    entries: Mutex<HashMap<String, Arc<dyn ImageEmbedder>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`AnalyzerBuilder`](super::AnalyzerBuilder).
    pub fn global() -> &'static EmbeddingCache {
        &GLOBAL_CACHE
    }

    /// Returns the ONNX embedder for `model_path`, loading it on first use.
    pub fn acquire(
        &self,
        model_path: &Path,
        layout: InputLayout,
        runtime_config: &RuntimeConfig,
    ) -> Result<Arc<dyn ImageEmbedder>, AnalysisError> {
        let key = format!(
            "{}|{:?}|{}",
            model_path.display(),
            layout,
            runtime_config.cache_key()
        );
        self.acquire_with(&key, || {
            let embedder = OnnxEmbedder::load(model_path, layout, runtime_config)?;
            Ok(Arc::new(embedder) as Arc<dyn ImageEmbedder>)
        })
    }

    /// Returns the embedder cached under `key`, or runs `load` to create it.
    ///
    /// # Errors
    /// - whatever `load` returns; the failure is not cached
    /// - `ModelUnavailable` if the cache lock was poisoned by a panicking loader
    pub fn acquire_with<F>(
        &self,
        key: &str,
        load: F,
    ) -> Result<Arc<dyn ImageEmbedder>, AnalysisError>
    where
        F: FnOnce() -> Result<Arc<dyn ImageEmbedder>, AnalysisError>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AnalysisError::ModelUnavailable("Embedding cache lock poisoned".into()))?;

        if let Some(embedder) = entries.get(key) {
            debug!("Reusing cached embedder for {}", key);
            return Ok(Arc::clone(embedder));
        }

        info!("Loading embedder for {}", key);
        let embedder = load()?;
        entries.insert(key.to_string(), Arc::clone(&embedder));
        Ok(embedder)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::embedding::FeatureVector;
    use ndarray::ArrayView4;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug)]
    struct ConstantEmbedder;

    impl ImageEmbedder for ConstantEmbedder {
        fn input_layout(&self) -> InputLayout {
            InputLayout::Nchw
        }

        fn embed(&self, _pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError> {
            FeatureVector::new(vec![1.0; 8])
        }
    }

    #[test]
    fn test_loads_once() {
        let cache = EmbeddingCache::new();
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .acquire_with("constant", || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(ConstantEmbedder) as Arc<dyn ImageEmbedder>)
                })
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_loads_once() {
        let cache = Arc::new(EmbeddingCache::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    cache
                        .acquire_with("shared", || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(10));
                            Ok(Arc::new(ConstantEmbedder) as Arc<dyn ImageEmbedder>)
                        })
                        .unwrap()
                })
            })
            .collect();

        let embedders: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(embedders.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = EmbeddingCache::new();
        let result = cache.acquire_with("flaky", || {
            Err(AnalysisError::ModelUnavailable("weights missing".into()))
        });
        assert!(matches!(result, Err(AnalysisError::ModelUnavailable(_))));
        assert!(!cache.contains("flaky"));

        let retried = cache.acquire_with("flaky", || {
            Ok(Arc::new(ConstantEmbedder) as Arc<dyn ImageEmbedder>)
        });
        assert!(retried.is_ok());
        assert!(cache.contains("flaky"));
    }

    #[test]
    fn test_acquire_missing_model_file() {
        let cache = EmbeddingCache::new();
        let result = cache.acquire(
            Path::new("/nonexistent/scanalyze/model.onnx"),
            InputLayout::Nchw,
            &RuntimeConfig::default(),
        );
        assert!(matches!(result, Err(AnalysisError::ModelUnavailable(_))));
        assert!(cache.is_empty());
    }
}
