//! Configuration for schema learning.
//!
//! - `InferenceConfig`: how many sampled values feed type inference
//! - `BuilderConfig`: freshness policy and notification buffering for builders
//!
//! Compression options live next to the compressor in
//! [`crate::compression::CompressionOptions`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SchemaError};
use crate::models::MAX_EXAMPLE_VALUES;

/// Default freshness window for extracted snapshots (24 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for type inference over sampled result values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Number of leading rows sampled per column
    pub max_samples: usize,
    /// Number of distinct example values kept per column
    pub max_examples: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_samples: 10,
            max_examples: MAX_EXAMPLE_VALUES,
        }
    }
}

impl InferenceConfig {
    /// Creates a new inference config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the sample window.
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Builder method to set the example cap, clamped to the model limit.
    pub fn with_max_examples(mut self, max_examples: usize) -> Self {
        self.max_examples = max_examples.min(MAX_EXAMPLE_VALUES);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_samples == 0 {
            return Err(SchemaError::configuration(
                "max_samples must be at least 1",
            ));
        }
        if self.max_examples > MAX_EXAMPLE_VALUES {
            return Err(SchemaError::configuration(format!(
                "max_examples must not exceed {}, got {}",
                MAX_EXAMPLE_VALUES, self.max_examples
            )));
        }
        Ok(())
    }
}

/// Configuration shared by every schema builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Maximum age of a snapshot before `extract_schema` re-extracts
    #[serde(with = "duration_secs")]
    pub max_age: Duration,
    /// Type inference settings for learning from results
    pub inference: InferenceConfig,
    /// Buffered change notifications per builder
    pub notification_capacity: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            inference: InferenceConfig::default(),
            notification_capacity: 64,
        }
    }
}

impl BuilderConfig {
    /// Creates a new builder config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the freshness window.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Builder method to set inference settings.
    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    /// Builder method to set the notification buffer size.
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.notification_capacity == 0 {
            return Err(SchemaError::configuration(
                "notification_capacity must be at least 1",
            ));
        }
        self.inference.validate()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
