use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_label() -> String {
    "unknown".to_string()
}

/// One user-confirmed (or corrected) classification outcome.
///
/// Immutable once appended; identity is its position in the log. Label
/// fields are free-form strings and deliberately not validated against the
/// live catalog: a retired label may still appear historically. Missing
/// fields deserialize to defaults so old log lines stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    #[serde(default)]
    pub transcript: String,
    #[serde(default = "default_label")]
    pub user_label: String,
    #[serde(default = "default_label")]
    pub predicted: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub was_overridden: bool,
    #[serde(default)]
    pub ts: String,
}

impl TrainingSample {
    /// Build a sample stamped with the current UTC time. `user_label` (the
    /// button tap) is ground truth; `correct` is derived from it.
    #[must_use]
    pub fn new(
        transcript: impl Into<String>,
        user_label: impl Into<String>,
        predicted: impl Into<String>,
        confidence: f64,
        was_overridden: bool,
    ) -> Self {
        let user_label = user_label.into();
        let predicted = predicted.into();
        let correct = user_label == predicted;
        Self {
            transcript: transcript.into(),
            user_label,
            predicted,
            confidence: round_confidence(confidence),
            correct,
            was_overridden,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

/// Round to 4 decimal places for the wire and the log.
#[must_use]
pub fn round_confidence(confidence: f64) -> f64 {
    (confidence * 10_000.0).round() / 10_000.0
}

/// Per-label tally, keyed by `user_label` (ground truth).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentTally {
    pub total: u64,
    pub correct: u64,
}

/// Aggregate accuracy over the whole feedback log, recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub total: u64,
    pub accuracy: f64,
    pub by_intent: BTreeMap<String, IntentTally>,
}

impl TrainingStats {
    pub fn record(&mut self, sample: &TrainingSample) {
        self.total += 1;
        let tally = self.by_intent.entry(sample.user_label.clone()).or_default();
        tally.total += 1;
        if sample.correct {
            tally.correct += 1;
        }
    }

    /// Recompute `accuracy` from the tallies; 0 for an empty log.
    pub fn finalize(&mut self) {
        if self.total == 0 {
            self.accuracy = 0.0;
            return;
        }
        let correct: u64 = self.by_intent.values().map(|t| t.correct).sum();
        self.accuracy = round_accuracy(correct as f64 / self.total as f64);
    }
}

fn round_accuracy(accuracy: f64) -> f64 {
    (accuracy * 1_000.0).round() / 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn correct_is_derived_from_label_agreement() {
        let agree = TrainingSample::new("t", "search", "search", 0.9, false);
        assert!(agree.correct);

        let disagree = TrainingSample::new("t", "search", "log_issue", 0.9, true);
        assert!(!disagree.correct);
    }

    #[test]
    fn confidence_is_rounded_to_four_places() {
        let sample = TrainingSample::new("t", "search", "search", 0.123_456_789, false);
        assert_eq!(sample.confidence, 0.1235);
    }

    #[test]
    fn timestamp_is_utc_with_trailing_z() {
        let sample = TrainingSample::new("t", "search", "search", 0.5, false);
        assert!(sample.ts.ends_with('Z'), "ts = {}", sample.ts);
        assert!(sample.ts.contains('T'));
    }

    #[test]
    fn serialized_line_uses_wire_keys() {
        let sample = TrainingSample::new("hello", "search", "ask_oracle", 0.25, true);
        let value: serde_json::Value = serde_json::to_value(&sample).unwrap();
        for key in [
            "transcript",
            "user_label",
            "predicted",
            "confidence",
            "correct",
            "was_overridden",
            "ts",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let sample: TrainingSample = serde_json::from_str(r#"{"transcript":"hi"}"#).unwrap();
        assert_eq!(sample.user_label, "unknown");
        assert_eq!(sample.predicted, "unknown");
        assert_eq!(sample.confidence, 0.0);
        assert!(!sample.correct);
        assert!(!sample.was_overridden);
    }

    #[test]
    fn stats_accuracy_rounds_to_three_places() {
        let mut stats = TrainingStats::default();
        stats.record(&TrainingSample::new("a", "search", "search", 1.0, false));
        stats.record(&TrainingSample::new("b", "search", "log_issue", 1.0, false));
        stats.record(&TrainingSample::new("c", "search", "log_issue", 1.0, false));
        stats.finalize();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.accuracy, 0.333);
    }

    #[test]
    fn empty_stats_finalize_to_zero_accuracy() {
        let mut stats = TrainingStats::default();
        stats.finalize();
        assert_eq!(stats.accuracy, 0.0);
        assert!(stats.by_intent.is_empty());
    }
}
