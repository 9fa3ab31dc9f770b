//! Compression options.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Limits applied when projecting a snapshot for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// Maximum number of tables kept
    pub max_tables: usize,
    /// Maximum number of columns kept per table
    pub max_columns_per_table: usize,
    /// Sort tables named by the caller to the front
    pub prioritize_referenced: bool,
    /// Render relationships between surviving tables
    pub include_relationships: bool,
    /// Token budget for the rendered text (chars / 4)
    pub max_tokens: usize,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_tables: 20,
            max_columns_per_table: 20,
            prioritize_referenced: true,
            include_relationships: true,
            max_tokens: 4000,
        }
    }
}

impl CompressionOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the table limit.
    pub fn with_max_tables(mut self, max_tables: usize) -> Self {
        self.max_tables = max_tables;
        self
    }

    /// Builder method to set the per-table column limit.
    pub fn with_max_columns_per_table(mut self, max_columns: usize) -> Self {
        self.max_columns_per_table = max_columns;
        self
    }

    /// Builder method to enable/disable referenced-table prioritization.
    pub fn with_prioritize_referenced(mut self, enabled: bool) -> Self {
        self.prioritize_referenced = enabled;
        self
    }

    /// Builder method to enable/disable relationship output.
    pub fn with_relationships(mut self, enabled: bool) -> Self {
        self.include_relationships = enabled;
        self
    }

    /// Builder method to set the token budget.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        if self.max_tables == 0 {
            return Err(SchemaError::configuration("max_tables must be at least 1"));
        }
        if self.max_columns_per_table == 0 {
            return Err(SchemaError::configuration(
                "max_columns_per_table must be at least 1",
            ));
        }
        if self.max_tokens == 0 {
            return Err(SchemaError::configuration("max_tokens must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompressionOptions::default();
        assert_eq!(options.max_tables, 20);
        assert_eq!(options.max_columns_per_table, 20);
        assert!(options.prioritize_referenced);
        assert!(options.include_relationships);
        assert_eq!(options.max_tokens, 4000);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(CompressionOptions::new().with_max_tables(0).validate().is_err());
        assert!(
            CompressionOptions::new()
                .with_max_columns_per_table(0)
                .validate()
                .is_err()
        );
        assert!(CompressionOptions::new().with_max_tokens(0).validate().is_err());
    }
}
