use crate::error::{ClassifierError, Result};
use intent_encoder::Embedder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One configured intent: a label plus its seed example phrases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfigEntry {
    pub label: String,
    pub examples: Vec<String>,
}

/// Ordered intent → seed-phrase configuration.
///
/// Declaration order is load-bearing: the classification engine breaks score
/// ties by first-seen label, so the config is a JSON *array*, not an object.
/// The catalog is fixed for the process lifetime; swapping it requires a
/// restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogConfig {
    pub entries: Vec<CatalogConfigEntry>,
}

impl CatalogConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot serve meaningfully: an empty
    /// label set, duplicate or blank labels, or a label without examples.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(ClassifierError::InvalidCatalog(
                "catalog has no intent labels".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for entry in &self.entries {
            if entry.label.trim().is_empty() {
                return Err(ClassifierError::InvalidCatalog(
                    "catalog contains a blank intent label".to_string(),
                ));
            }
            if !seen.insert(entry.label.as_str()) {
                return Err(ClassifierError::InvalidCatalog(format!(
                    "duplicate intent label '{}'",
                    entry.label
                )));
            }
            if entry.examples.iter().all(|e| e.trim().is_empty()) {
                return Err(ClassifierError::InvalidCatalog(format!(
                    "intent '{}' has no non-empty example phrases",
                    entry.label
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

impl Default for CatalogConfig {
    /// The built-in seed catalog: seven canonical voice-command intents.
    fn default() -> Self {
        fn entry(label: &str, examples: &[&str]) -> CatalogConfigEntry {
            CatalogConfigEntry {
                label: label.to_string(),
                examples: examples.iter().map(ToString::to_string).collect(),
            }
        }

        Self {
            entries: vec![
                entry(
                    "add_wish",
                    &[
                        "I wish we had",
                        "would be nice if",
                        "can we add",
                        "idea for",
                        "we should build",
                        "it would help if",
                        "we need a way to",
                        "feature request",
                    ],
                ),
                entry(
                    "log_issue",
                    &[
                        "there's a bug",
                        "broken",
                        "error when",
                        "fails to",
                        "not working",
                        "crashed",
                        "exception in",
                        "something wrong with",
                    ],
                ),
                entry(
                    "log_friction",
                    &[
                        "annoying that",
                        "keeps happening",
                        "painful to",
                        "frustrating",
                        "slows me down",
                        "every time I have to",
                        "tedious",
                        "friction point",
                    ],
                ),
                entry(
                    "log_crit",
                    &[
                        "I noticed",
                        "observation",
                        "the design feels",
                        "UI looks",
                        "feels off",
                        "visually",
                        "the layout",
                        "spacing seems",
                    ],
                ),
                entry(
                    "record_learning",
                    &[
                        "I learned",
                        "TIL",
                        "figured out",
                        "turns out",
                        "the trick is",
                        "gotcha",
                        "lesson learned",
                        "discovered that",
                    ],
                ),
                entry(
                    "search",
                    &[
                        "find",
                        "where is",
                        "show me",
                        "look up",
                        "search for",
                        "what is the status of",
                    ],
                ),
                entry(
                    "ask_oracle",
                    &[
                        "what should I work on",
                        "project status",
                        "roadmap",
                        "health check",
                        "priorities",
                        "next actions",
                    ],
                ),
            ],
        }
    }
}

/// A label with its seed phrases and their precomputed embeddings, one
/// vector per phrase in the same order.
#[derive(Debug, Clone)]
pub struct IntentCatalogEntry {
    pub label: String,
    pub examples: Vec<String>,
    pub example_embeddings: Vec<Vec<f32>>,
}

/// Immutable catalog of intents with precomputed seed embeddings, built once
/// at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct IntentCatalog {
    entries: Vec<IntentCatalogEntry>,
}

impl IntentCatalog {
    /// Validate the config and encode every seed phrase in one batch.
    pub async fn build(config: &CatalogConfig, encoder: &dyn Embedder) -> Result<Self> {
        config.validate()?;

        let all_phrases: Vec<String> = config
            .entries
            .iter()
            .flat_map(|e| e.examples.iter().cloned())
            .collect();
        let mut all_embeddings = encoder.embed_batch(&all_phrases).await?.into_iter();

        let mut entries = Vec::with_capacity(config.entries.len());
        for entry in &config.entries {
            let example_embeddings: Vec<Vec<f32>> =
                (&mut all_embeddings).take(entry.examples.len()).collect();
            entries.push(IntentCatalogEntry {
                label: entry.label.clone(),
                examples: entry.examples.clone(),
                example_embeddings,
            });
        }

        log::info!(
            "Built intent catalog: {} labels, {} seed phrases",
            entries.len(),
            all_phrases.len()
        );

        Ok(Self { entries })
    }

    /// Assemble a catalog from prebuilt entries. Skips validation; the
    /// engine tolerates even an empty catalog by answering `unknown`.
    #[must_use]
    pub fn from_entries(entries: Vec<IntentCatalogEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[IntentCatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
