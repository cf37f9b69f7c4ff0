//! Per-collection embedding models.
//!
//! Each collection has its own trained model mapping a normalized sequence
//! to a fixed-length embedding. Models are loaded lazily, once per
//! collection, and shared across sessions. A failed load is remembered and
//! reported on every later request until [`ModelRegistry::reload`] is called.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use hearme_models::{CollectionConfig, CollectionId, Embedding};
use ort::session::Session;
use ort::value::{Tensor, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::normalizer::SequenceTensor;
use crate::ort_engine::create_session;

/// Maps a normalized sequence to an embedding vector.
///
/// Implementations must be safe to share; calls may be serialized
/// internally.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, sequence: &SequenceTensor) -> MediaResult<Embedding>;
}

/// Builds the model for one collection. Blocking.
pub type ModelLoader =
    Arc<dyn Fn(&CollectionConfig) -> MediaResult<Arc<dyn EmbeddingModel>> + Send + Sync>;

/// Embedding model backed by an ONNX session.
pub struct OrtEmbeddingModel {
    session: Mutex<Session>,
}

impl OrtEmbeddingModel {
    pub fn load(collection: &CollectionId, model_path: &Path) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::model_load(
                collection.clone(),
                model_path,
                "model file not found",
            ));
        }

        let session = create_session(model_path, "embedding model")
            .map_err(|reason| MediaError::model_load(collection.clone(), model_path, reason))?;

        info!(
            collection = %collection,
            model_path = %model_path.display(),
            "Embedding model initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Loader for [`ModelRegistry`] that reads each collection's `model_file`.
    pub fn loader() -> ModelLoader {
        Arc::new(|config: &CollectionConfig| {
            let model = OrtEmbeddingModel::load(&config.id, &config.model_file)?;
            Ok(Arc::new(model) as Arc<dyn EmbeddingModel>)
        })
    }
}

impl EmbeddingModel for OrtEmbeddingModel {
    fn embed(&self, sequence: &SequenceTensor) -> MediaResult<Embedding> {
        let shape = sequence.shape().to_vec();
        let input: Value = Tensor::from_array((shape, sequence.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::inference_failed(format!("ONNX inference failed: {}", e)))?;

        // The embedding is the first output, `[1, L]`.
        if outputs.len() == 0 {
            return Err(MediaError::inference_failed("Model returned no outputs"));
        }

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference_failed(format!("Failed to extract tensor: {}", e)))?;

        if data.is_empty() {
            return Err(MediaError::inference_failed("Model produced an empty embedding"));
        }

        Ok(Embedding::new(data.to_vec()))
    }
}

/// Remembered load failure.
#[derive(Debug, Clone)]
struct LoadFailure {
    path: PathBuf,
    reason: String,
}

type ModelSlot = Arc<OnceCell<Result<Arc<dyn EmbeddingModel>, LoadFailure>>>;

struct CollectionEntry {
    config: CollectionConfig,
    target_frames: usize,
}

/// Lazily loaded embedding models, one per collection.
pub struct ModelRegistry {
    collections: HashMap<CollectionId, CollectionEntry>,
    loader: ModelLoader,
    slots: RwLock<HashMap<CollectionId, ModelSlot>>,
}

impl ModelRegistry {
    /// Create a registry. Nothing is loaded until first use.
    pub fn new(
        collections: impl IntoIterator<Item = CollectionConfig>,
        loader: ModelLoader,
    ) -> MediaResult<Self> {
        let mut entries = HashMap::new();
        for config in collections {
            let shape = config.target_shape().map_err(|e| {
                MediaError::model_load(config.id.clone(), &config.model_file, e.to_string())
            })?;
            entries.insert(
                config.id.clone(),
                CollectionEntry {
                    target_frames: shape.frames,
                    config,
                },
            );
        }

        Ok(Self {
            collections: entries,
            loader,
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Registry backed by ONNX models from each collection's `model_file`.
    pub fn with_ort(collections: impl IntoIterator<Item = CollectionConfig>) -> MediaResult<Self> {
        Self::new(collections, OrtEmbeddingModel::loader())
    }

    /// Sequence length the collection's model expects.
    pub fn target_frames(&self, collection: &CollectionId) -> MediaResult<usize> {
        self.entry(collection).map(|e| e.target_frames)
    }

    pub fn collection_ids(&self) -> impl Iterator<Item = &CollectionId> {
        self.collections.keys()
    }

    /// Get the collection's model, loading it on first use.
    ///
    /// Concurrent first requests share one load.
    pub async fn get(&self, collection: &CollectionId) -> MediaResult<Arc<dyn EmbeddingModel>> {
        let entry = self.entry(collection)?;
        let slot = self.slot(collection)?;

        let result = slot
            .get_or_init(|| async {
                let loader = Arc::clone(&self.loader);
                let config = entry.config.clone();
                let path = config.model_file.clone();
                let start = Instant::now();

                let loaded = tokio::task::spawn_blocking(move || (*loader)(&config))
                    .await
                    .map_err(|e| MediaError::internal(format!("Model load task failed: {e}")))
                    .and_then(|r| r);

                metrics::record_model_load(collection.as_str(), loaded.is_ok());
                match loaded {
                    Ok(model) => {
                        info!(
                            collection = %collection,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Embedding model loaded"
                        );
                        Ok(model)
                    }
                    Err(e) => {
                        warn!(collection = %collection, error = %e, "Embedding model failed to load");
                        let reason = match e {
                            MediaError::ModelLoad { reason, .. } => reason,
                            other => other.to_string(),
                        };
                        Err(LoadFailure { path, reason })
                    }
                }
            })
            .await;

        match result {
            Ok(model) => Ok(Arc::clone(model)),
            Err(failure) => Err(MediaError::model_load(
                collection.clone(),
                failure.path.clone(),
                failure.reason.clone(),
            )),
        }
    }

    /// Forget a loaded or failed model so the next request loads it again.
    pub fn reload(&self, collection: &CollectionId) -> MediaResult<()> {
        self.entry(collection)?;
        let mut slots = self
            .slots
            .write()
            .map_err(|_| MediaError::internal("Model registry lock poisoned"))?;
        slots.remove(collection);
        info!(collection = %collection, "Embedding model scheduled for reload");
        Ok(())
    }

    fn entry(&self, collection: &CollectionId) -> MediaResult<&CollectionEntry> {
        self.collections
            .get(collection)
            .ok_or_else(|| MediaError::UnknownCollection(collection.clone()))
    }

    fn slot(&self, collection: &CollectionId) -> MediaResult<ModelSlot> {
        {
            let slots = self
                .slots
                .read()
                .map_err(|_| MediaError::internal("Model registry lock poisoned"))?;
            if let Some(slot) = slots.get(collection) {
                return Ok(Arc::clone(slot));
            }
        }

        let mut slots = self
            .slots
            .write()
            .map_err(|_| MediaError::internal("Model registry lock poisoned"))?;
        Ok(Arc::clone(slots.entry(collection.clone()).or_default()))
    }
}
