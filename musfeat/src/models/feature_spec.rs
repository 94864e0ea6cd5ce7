//! Feature-set specification
//!
//! A feature-description file is a `;`-delimited list of feature
//! identifiers, e.g. `rms;zcr;mfcc`. Order and duplicates are preserved.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Token separating feature identifiers
pub const FEATURE_DELIMITER: char = ';';

/// Ordered, immutable list of feature identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    features: Vec<String>,
}

impl FeatureSpec {
    /// Parse a feature description
    ///
    /// Tokens are trimmed and empty tokens discarded. A description with no
    /// identifiers at all is rejected.
    pub fn parse(text: &str) -> PipelineResult<Self> {
        let features: Vec<String> = text
            .split(FEATURE_DELIMITER)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        if features.is_empty() {
            return Err(PipelineError::Config(
                "feature description contains no feature identifiers".to_string(),
            ));
        }

        Ok(Self { features })
    }

    /// Read and parse a feature-description file
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "cannot read feature description {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&text)
    }

    /// Feature identifiers in order
    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
