//! # Intent Feedback
//!
//! Durable, append-only record of user-confirmed classification outcomes
//! (one JSON object per line) plus aggregate accuracy statistics derived by
//! re-reading the full log on demand. The log is the raw material for future
//! model refinement; nothing in it is ever updated or deleted.

mod error;
mod sample;
mod store;

pub use error::{FeedbackError, Result};
pub use store::{FeedbackLog, TRAINING_LOG_REL_PATH};
pub use sample::{round_confidence, IntentTally, TrainingSample, TrainingStats};
