//! Verifier configuration.

use serde::{Deserialize, Serialize};

use nexus_verifier_core::DigestLayout;

use crate::error::{Result, VerifierError};

/// Default upper bound on records in one packed batch.
pub const DEFAULT_MAX_BATCH_RECORDS: usize = 4096;

/// Configuration for the Verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// The one digest layout this deployment accepts.
    pub layout: DigestLayout,
    /// Batches with more records than this are rejected before decoding.
    pub max_batch_records: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            layout: DigestLayout::default(),
            max_batch_records: DEFAULT_MAX_BATCH_RECORDS,
        }
    }
}

impl VerifierConfig {
    /// Configuration for a given layout with default limits.
    pub fn with_layout(layout: DigestLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if self.max_batch_records == 0 {
            return Err(VerifierError::Config(
                "max_batch_records must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VerifierConfig::default();
        assert_eq!(config.layout.layout_id(), "NEXUS_RCT_V1");
        assert_eq!(config.max_batch_records, 4096);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: VerifierConfig = serde_json::from_str(
            r#"{"layout": {"kind": "chain_scoped", "domain": "anchor_RCT_V1", "chain_id": 421614}}"#,
        )
        .unwrap();
        assert_eq!(config.layout, DigestLayout::anchor_v1(421614));
        assert_eq!(config.max_batch_records, DEFAULT_MAX_BATCH_RECORDS);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = VerifierConfig {
            max_batch_records: 0,
            ..VerifierConfig::default()
        };
        assert!(matches!(config.validate(), Err(VerifierError::Config(_))));

        let config: VerifierConfig =
            serde_json::from_str(r#"{"layout": {"kind": "unscoped", "domain": ""}}"#).unwrap();
        assert!(matches!(config.validate(), Err(VerifierError::Core(_))));
    }
}
