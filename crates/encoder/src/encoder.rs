use crate::error::{EncoderError, Result};
use crate::similarity::normalize;
use async_trait::async_trait;
use ndarray::{Array, Axis, Dimension, Ix2, Ix3};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Input, Session, SessionInputs};
use ort::tensor::TensorElementType;
use ort::value::{DynTensor, Tensor};
use ort::Error as OrtError;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

/// Backend selection. `Stub` produces deterministic hash-seeded unit vectors
/// and exists so tests and model-free environments can run the full service.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncoderMode {
    Onnx,
    Stub,
}

impl EncoderMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "stub" => Ok(Self::Stub),
            other => Err(EncoderError::ModelLoad(format!(
                "Unsupported embedding mode '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        let raw = env::var("INTENT_EMBEDDING_MODE").unwrap_or_else(|_| "onnx".to_string());
        Self::parse(&raw)
    }
}

/// Static description of a supported sentence-encoder model.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub id: String,
    pub dimension: usize,
    pub max_length: usize,
    pub max_batch: usize,
}

impl ModelSpec {
    /// Resolve a model id (case-insensitive) to its spec.
    pub fn for_model(model_id: &str) -> Result<Self> {
        match model_id.trim().to_ascii_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(Self {
                id: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                max_length: 256,
                max_batch: 32,
            }),
            "bge-small" | "bge-small-en-v1.5" => Ok(Self {
                id: "bge-small-en-v1.5".to_string(),
                dimension: 384,
                max_length: 512,
                max_batch: 32,
            }),
            other => Err(EncoderError::ModelLoad(format!(
                "Unknown embedding model id '{other}'. Available: all-MiniLM-L6-v2, bge-small-en-v1.5"
            ))),
        }
    }

    pub fn from_env() -> Result<Self> {
        let model_id =
            env::var("INTENT_EMBEDDING_MODEL").unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string());
        Self::for_model(&model_id)
    }

    fn assets_in(&self, model_dir: &Path) -> ModelAssets {
        let model_dir = model_dir.join(&self.id);
        ModelAssets {
            model_path: model_dir.join("model.onnx"),
            tokenizer_path: model_dir.join("tokenizer.json"),
        }
    }
}

struct ModelAssets {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
}

/// Directory holding `<model-id>/model.onnx` and `<model-id>/tokenizer.json`.
///
/// `INTENT_MODEL_DIR` wins; otherwise walk upward from the current directory
/// looking for a `models/` folder so `intentd` works from anywhere inside a
/// checkout, and finally fall back to the user cache.
pub fn model_dir() -> PathBuf {
    if let Ok(path) = env::var("INTENT_MODEL_DIR") {
        return PathBuf::from(path);
    }

    if let Ok(mut dir) = env::current_dir() {
        loop {
            let candidate = dir.join("models");
            if candidate.is_dir() {
                return candidate;
            }
            if !dir.pop() {
                break;
            }
        }
    }

    env::var("HOME")
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
        .join(".cache")
        .join("intentd")
        .join("models")
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

impl OrtBackend {
    fn new(spec: &ModelSpec, model_dir: &Path) -> Result<Self> {
        // Single-threaded tokenization keeps request latency predictable; the
        // catalog batch at startup is far too small to benefit from rayon.
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let assets = spec.assets_in(model_dir);
        if !assets.model_path.exists() || !assets.tokenizer_path.exists() {
            return Err(EncoderError::ModelLoad(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {}. Place the exported model there or set INTENT_MODEL_DIR.",
                spec.id,
                assets.model_path.display(),
                assets.tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| EncoderError::ModelLoad(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| EncoderError::ModelLoad(format!("Tokenizer truncation failed: {e}")))?;

        let (intra_threads, inter_threads) = default_ort_threads();
        let session_builder =
            Session::builder().map_err(|e| EncoderError::ModelLoad(format!("{e}")))?;
        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| EncoderError::ModelLoad(format!("Failed to set ORT intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| EncoderError::ModelLoad(format!("Failed to set ORT inter threads: {e}")))?
            .with_intra_op_spinning(false)
            .map_err(|e| EncoderError::ModelLoad(format!("Failed to set ORT intra spinning: {e}")))?
            .with_inter_op_spinning(false)
            .map_err(|e| EncoderError::ModelLoad(format!("Failed to set ORT inter spinning: {e}")))?
            .with_execution_providers(vec![CPUExecutionProvider::default().build()])
            .map_err(|e| {
                EncoderError::ModelLoad(format!("Failed to register CPU execution provider: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EncoderError::ModelLoad(format!("Failed to set optimization level: {e}")))?
            .commit_from_file(&assets.model_path)
            .map_err(|e| EncoderError::ModelLoad(format!("Failed to load ONNX model: {e}")))?;

        log::info!(
            "Loaded ONNX model '{}' (dim {}, max_length {}, batch {})",
            spec.id,
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| EncoderError::Inference(format!("Tokenization failed: {e}")))?;

            if encodings.is_empty() {
                continue;
            }

            let seq_len = encodings[0].len();
            if seq_len > self.max_length {
                return Err(EncoderError::Inference(format!(
                    "Tokenized length {} exceeds max_length {}",
                    seq_len, self.max_length
                )));
            }
            if encodings.iter().any(|e| e.len() != seq_len) {
                return Err(EncoderError::Inference(
                    "Inconsistent sequence lengths after padding".to_string(),
                ));
            }
            let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);

            let ids_array = Array::from_shape_vec((batch.len(), seq_len), ids)
                .map_err(|e| EncoderError::Inference(format!("IDs shape error: {e}")))?;
            let mask_array = Array::from_shape_vec((batch.len(), seq_len), masks)
                .map_err(|e| EncoderError::Inference(format!("Mask shape error: {e}")))?;
            let type_array = Array::from_shape_vec((batch.len(), seq_len), type_ids)
                .map_err(|e| EncoderError::Inference(format!("Types shape error: {e}")))?;
            let ids_shape = ids_array.raw_dim().into_dyn();

            let ids_tensor = Tensor::from_array(ids_array.into_dyn())
                .map_err(|e| to_inference_error(&e))?
                .upcast();
            let mask_tensor = Tensor::from_array(mask_array.into_dyn())
                .map_err(|e| to_inference_error(&e))?
                .upcast();
            let type_tensor = Tensor::from_array(type_array.into_dyn())
                .map_err(|e| to_inference_error(&e))?
                .upcast();

            let array = {
                let mut session = self
                    .session
                    .lock()
                    .map_err(|_| EncoderError::Inference("Failed to lock ONNX session".into()))?;

                let mut available: HashMap<String, DynTensor> = HashMap::new();
                available.insert("input_ids".to_string(), ids_tensor);
                available.insert("attention_mask".to_string(), mask_tensor);
                available.insert("token_type_ids".to_string(), type_tensor);

                let mut feed: HashMap<String, DynTensor> = HashMap::new();

                // Some sentence-encoder exports drop token_type_ids or add
                // extra inputs; feed zeros for anything we don't produce.
                for input in &session.inputs {
                    let key = input.name.clone();
                    if let Some(value) = available.get(&key) {
                        feed.insert(key, value.clone());
                    } else {
                        let zeros = zero_tensor(&ids_shape, input).map_err(|e| {
                            EncoderError::Inference(format!("Unsupported ONNX input '{key}': {e}"))
                        })?;
                        feed.insert(key, zeros);
                    }
                }

                let outputs = session
                    .run(SessionInputs::from(feed))
                    .map_err(|e| EncoderError::Inference(format!("ONNX forward failed: {e}")))?;

                if outputs.len() == 0 {
                    return Err(EncoderError::Inference(
                        "ONNX returned no outputs".to_string(),
                    ));
                }

                let array = outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        EncoderError::Inference(format!("Failed to decode ONNX output: {e}"))
                    })?
                    .to_owned();

                drop(outputs);
                drop(session);

                array
            };
            results.extend(embeddings_from_output(array, &mask_rows, self.dimension)?);
        }

        Ok(results)
    }
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    // Utterances are short; favor polite coexistence with the host process
    // over raw throughput.
    let intra_threads = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };

    (intra_threads.max(1), 1)
}

const fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(EncoderError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| EncoderError::Inference(format!("Bad output shape: {e}")))?;
            out.reserve(embeddings.len_of(Axis(0)));
            for row in embeddings.outer_iter() {
                let mut emb = row.to_owned().to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| EncoderError::Inference(format!("Bad output shape: {e}")))?;
            out.reserve(hidden.len_of(Axis(0)));
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let attn = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample.view(), &attn);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(EncoderError::Inference(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    if sample.is_empty() {
        return vec![];
    }

    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count == 0.0 {
        return sum;
    }

    for value in &mut sum {
        *value /= count;
    }

    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_ids = encoding.get_ids();
        let encoding_masks = encoding.get_attention_mask();
        let encoding_types = encoding.get_type_ids();

        for idx in 0..seq_len {
            ids.push(i64::from(*encoding_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding_types.get(idx).unwrap_or(&0)));
        }

        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

fn zero_tensor(shape: &ndarray::IxDyn, input: &Input) -> Result<DynTensor> {
    let tensor = match &input.input_type {
        ort::value::ValueType::Tensor { ty, .. } => match ty {
            TensorElementType::Int64 => {
                Tensor::from_array(ndarray::Array::<i64, _>::zeros(shape.clone()))
                    .map_err(|e| to_inference_error(&e))?
                    .upcast()
            }
            TensorElementType::Bool => {
                Tensor::from_array(ndarray::Array::from_elem(shape.clone(), false))
                    .map_err(|e| to_inference_error(&e))?
                    .upcast()
            }
            TensorElementType::Float32 => {
                Tensor::from_array(ndarray::Array::<f32, _>::zeros(shape.clone()))
                    .map_err(|e| to_inference_error(&e))?
                    .upcast()
            }
            other => {
                return Err(EncoderError::Inference(format!(
                    "Cannot synthesize zeros for tensor type {other:?} (input {})",
                    input.name
                )))
            }
        },
        other => {
            return Err(EncoderError::Inference(format!(
                "Unsupported input type for zero init: {other:?}"
            )))
        }
    };
    Ok(tensor)
}

fn to_inference_error(error: &OrtError) -> EncoderError {
    EncoderError::Inference(format!("{error}"))
}

#[derive(Clone)]
struct StubBackend {
    dimension: usize,
}

impl StubBackend {
    const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect()
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Object-safe embedding seam. The engine and the service façade only ever
/// see this trait, so tests can substitute a purpose-built encoder.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
    fn model_id(&self) -> &str;
}

/// Sentence encoder backed by ONNX Runtime, or by the deterministic stub.
pub struct TextEncoder {
    backend: Backend,
    spec: ModelSpec,
}

enum Backend {
    Onnx(Arc<OrtBackend>),
    Stub(StubBackend),
}

impl TextEncoder {
    /// Load the encoder from process environment. Fatal on failure: the
    /// classification service cannot start without its model.
    pub fn load() -> Result<Self> {
        Self::load_with(EncoderMode::from_env()?, ModelSpec::from_env()?, &model_dir())
    }

    pub fn load_with(mode: EncoderMode, spec: ModelSpec, model_dir: &Path) -> Result<Self> {
        let backend = match mode {
            EncoderMode::Stub => Backend::Stub(StubBackend::new(spec.dimension)),
            EncoderMode::Onnx => Backend::Onnx(Arc::new(OrtBackend::new(&spec, model_dir)?)),
        };
        Ok(Self { backend, spec })
    }

    /// Stub-backed encoder for tests.
    #[must_use]
    pub fn stub(spec: ModelSpec) -> Self {
        Self {
            backend: Backend::Stub(StubBackend::new(spec.dimension)),
            spec,
        }
    }
}

#[async_trait]
impl Embedder for TextEncoder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let owned = [text.to_string()];
        let mut embeddings = self.embed_batch(&owned).await?;
        embeddings
            .pop()
            .ok_or_else(|| EncoderError::Inference("Empty embedding result".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        match &self.backend {
            Backend::Stub(stub) => Ok(stub.embed_batch(texts)),
            Backend::Onnx(backend) => {
                let backend = backend.clone();
                let owned = texts.to_vec();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| EncoderError::Inference(format!("Join error: {e}")))?
            }
        }
    }

    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    fn model_id(&self) -> &str {
        &self.spec.id
    }
}
