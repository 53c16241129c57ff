//! # Intent Encoder
//!
//! Thin adapter around a pretrained sentence-encoder: text in, L2-normalized
//! embedding vector out. Runs the exported ONNX model on CPU via ONNX
//! Runtime, or a deterministic hash-seeded stub for tests and model-free
//! environments (`INTENT_EMBEDDING_MODE=stub`).
//!
//! The rest of the workspace depends only on the [`Embedder`] trait, so the
//! classification engine can be exercised with a purpose-built encoder.

mod encoder;
mod error;
mod similarity;

pub use encoder::{model_dir, Embedder, EncoderMode, ModelSpec, TextEncoder};
pub use error::{EncoderError, Result};
pub use similarity::{cosine_similarity, normalize};
