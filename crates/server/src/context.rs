use anyhow::{Context as AnyhowContext, Result};
use intent_classifier::{CatalogConfig, ClassificationEngine, IntentCatalog};
use intent_encoder::{model_dir, Embedder, EncoderMode, ModelSpec, TextEncoder};
use intent_feedback::FeedbackLog;
use std::path::PathBuf;
use std::sync::Arc;

/// Startup knobs for [`ServiceContext::initialize`]. `None` defers to the
/// process environment (`INTENT_EMBEDDING_MODE`, `INTENT_EMBEDDING_MODEL`,
/// `INTENT_MODEL_DIR`) or the built-in defaults.
#[derive(Debug, Default, Clone)]
pub struct ServiceOptions {
    pub data_root: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub embed_mode: Option<EncoderMode>,
    pub embed_model: Option<String>,
    pub model_dir: Option<PathBuf>,
}

/// Process-wide service state: the loaded encoder, the catalog-backed
/// engine, and the feedback log handle.
///
/// Constructed exactly once, eagerly, before the listener binds — there is
/// deliberately no lazy first-use path, so the load-once invariant needs no
/// runtime guard. Handlers share it through an `Arc`; everything inside is
/// read-only except the feedback log, which serializes its own appends.
pub struct ServiceContext {
    pub engine: ClassificationEngine,
    pub feedback: FeedbackLog,
    pub model_id: String,
}

impl ServiceContext {
    /// Load the encoder, build the catalog, and open the feedback log.
    /// Any failure here is fatal: the service must not start without its
    /// model.
    pub async fn initialize(options: ServiceOptions) -> Result<Self> {
        let mode = match options.embed_mode {
            Some(mode) => mode,
            None => EncoderMode::from_env()?,
        };
        let spec = match &options.embed_model {
            Some(id) => ModelSpec::for_model(id)?,
            None => ModelSpec::from_env()?,
        };
        let dir = options.model_dir.clone().unwrap_or_else(model_dir);

        let encoder: Arc<dyn Embedder> = Arc::new(
            TextEncoder::load_with(mode, spec, &dir)
                .context("failed to load the embedding model")?,
        );

        let config = match &options.catalog_path {
            Some(path) => CatalogConfig::from_file(path)
                .with_context(|| format!("failed to load catalog {}", path.display()))?,
            None => CatalogConfig::default(),
        };

        let feedback = FeedbackLog::at_data_root(options.data_root.as_deref());
        Self::with_encoder(encoder, &config, feedback).await
    }

    /// Assemble a context around an already-constructed encoder. This is the
    /// seam integration tests use to run the full HTTP surface against a
    /// stub or purpose-built embedder.
    pub async fn with_encoder(
        encoder: Arc<dyn Embedder>,
        config: &CatalogConfig,
        feedback: FeedbackLog,
    ) -> Result<Self> {
        let catalog = IntentCatalog::build(config, encoder.as_ref())
            .await
            .context("failed to build the intent catalog")?;
        let model_id = encoder.model_id().to_string();
        let engine = ClassificationEngine::new(encoder, catalog);

        log::info!(
            "Service context ready: model '{}', {} intents, feedback log at {}",
            model_id,
            engine.catalog().len(),
            feedback.path().display()
        );

        Ok(Self {
            engine,
            feedback,
            model_id,
        })
    }
}
