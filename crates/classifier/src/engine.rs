use crate::catalog::IntentCatalog;
use crate::error::Result;
use intent_encoder::{cosine_similarity, Embedder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Label returned when the catalog is empty. Not validated against the
/// catalog anywhere: feedback records may carry it (or any retired label).
pub const UNKNOWN_INTENT: &str = "unknown";

/// Outcome of a single classification. `confidence` is the raw cosine score
/// of the best match; clamp for display, never for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
}

impl ClassificationResult {
    /// Confidence clamped to `[0, 1]` for human-facing output.
    #[must_use]
    pub fn clamped_confidence(&self) -> f32 {
        self.confidence.clamp(0.0, 1.0)
    }
}

/// Nearest-neighbor intent classifier over a fixed catalog.
///
/// Scoring policy: a label's score is the *maximum* cosine similarity of the
/// query against that label's seed embeddings — one strong exemplar match is
/// sufficient. The engine always answers with its best guess; interpreting
/// low confidence is the caller's business.
pub struct ClassificationEngine {
    encoder: Arc<dyn Embedder>,
    catalog: IntentCatalog,
}

impl ClassificationEngine {
    #[must_use]
    pub fn new(encoder: Arc<dyn Embedder>, catalog: IntentCatalog) -> Self {
        Self { encoder, catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &IntentCatalog {
        &self.catalog
    }

    /// Classify an utterance. Empty transcripts are accepted; encoding
    /// failures propagate untouched.
    pub async fn classify(&self, transcript: &str) -> Result<ClassificationResult> {
        let query = self.encoder.embed(transcript).await?;
        Ok(best_match(&query, &self.catalog))
    }
}

/// Score the query against every catalog entry and pick the winner.
///
/// Ties break toward the earlier label: the running best starts at negative
/// infinity and is only replaced on a strictly greater score, so catalog
/// declaration order makes results reproducible even for pathological
/// all-equal scores.
#[must_use]
pub fn best_match(query: &[f32], catalog: &IntentCatalog) -> ClassificationResult {
    if catalog.is_empty() {
        return ClassificationResult {
            label: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
        };
    }

    let mut best_label: Option<&str> = None;
    let mut best_score = f32::NEG_INFINITY;

    for entry in catalog.entries() {
        let score = entry
            .example_embeddings
            .iter()
            .map(|example| cosine_similarity(query, example))
            .fold(f32::NEG_INFINITY, f32::max);

        if score > best_score {
            best_score = score;
            best_label = Some(&entry.label);
        }
    }

    match best_label {
        Some(label) => ClassificationResult {
            label: label.to_string(),
            confidence: best_score,
        },
        // Every label had zero examples; treat as no usable catalog.
        None => ClassificationResult {
            label: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
        },
    }
}
