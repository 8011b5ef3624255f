//! Analysis configuration.

use crate::Error;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

fn default_max_iteration() -> usize {
    10
}

fn default_override_threshold() -> usize {
    5
}

/// A forced summary label for one function, as written in configuration.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SummaryLabel {
    /// Force the summary to "deterministic".
    #[serde(rename = "DET")]
    Det,
    /// Force the summary to "not deterministic".
    #[serde(rename = "NOTDET")]
    NotDet,
    /// Force the summary to Top.
    #[serde(rename = "TOP")]
    Top,
    /// Not a forced summary: marks a reset function, whose call re-labels
    /// its receiver as known when all arguments are already known.
    #[serde(rename = "FORCEDET")]
    ForceDet,
}

/// Configuration shared by the bundled analyses.
///
/// `function_labels` maps a qualified function name (`Class.name`) or a
/// class-wide wildcard (`Class*`) to a forced summary, short-circuiting
/// summary resolution for matching call sites. `FORCEDET` labels are not
/// summaries; loading moves them into `reset_functions`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// The cap on interprocedural passes. At least 1.
    #[serde(default = "default_max_iteration")]
    pub max_iteration: usize,
    /// Track exception-handler reachability per block during the
    /// determinism analysis.
    #[serde(default)]
    pub track_exception: bool,
    /// Virtual call sites with more overrides than this are treated as
    /// opaque instead of enumerated.
    #[serde(default = "default_override_threshold")]
    pub override_threshold: usize,
    #[serde(default)]
    pub function_labels: FxHashMap<String, SummaryLabel>,
    /// Qualified names of functions that reset their receiver to a known
    /// value when all their arguments are already known.
    #[serde(default)]
    pub reset_functions: FxHashSet<String>,
}

impl Default for AnalysisConfig {
    fn default() -> AnalysisConfig {
        AnalysisConfig {
            max_iteration: default_max_iteration(),
            track_exception: false,
            override_threshold: default_override_threshold(),
            function_labels: FxHashMap::default(),
            reset_functions: FxHashSet::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    /// Load a configuration from a JSON document and normalize it.
    pub fn from_json(json: &str) -> Result<AnalysisConfig, Error> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.normalized()
    }

    /// Validate the configuration and fold `FORCEDET` labels into the
    /// reset-function set.
    pub fn normalized(mut self) -> Result<AnalysisConfig, Error> {
        if self.max_iteration == 0 {
            return Err(Error::Configuration(
                "max_iteration must be at least 1".to_string(),
            ));
        }
        let reset: Vec<String> = self
            .function_labels
            .iter()
            .filter(|(_, &label)| label == SummaryLabel::ForceDet)
            .map(|(name, _)| name.clone())
            .collect();
        for name in reset {
            self.function_labels.remove(&name);
            self.reset_functions.insert(name);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AnalysisConfig::new();
        assert_eq!(config.max_iteration, 10);
        assert_eq!(config.override_threshold, 5);
        assert!(!config.track_exception);
        assert!(config.function_labels.is_empty());
    }

    #[test]
    fn from_json_reads_labels() {
        let config = AnalysisConfig::from_json(
            r#"{
                "max_iteration": 3,
                "track_exception": true,
                "function_labels": {
                    "Math.random": "NOTDET",
                    "Calendar*": "TOP",
                    "Builder.fill": "FORCEDET"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_iteration, 3);
        assert!(config.track_exception);
        assert_eq!(
            config.function_labels.get("Math.random"),
            Some(&SummaryLabel::NotDet)
        );
        assert_eq!(
            config.function_labels.get("Calendar*"),
            Some(&SummaryLabel::Top)
        );
        // FORCEDET is a reset marker, not a summary.
        assert!(!config.function_labels.contains_key("Builder.fill"));
        assert!(config.reset_functions.contains("Builder.fill"));
    }

    #[test]
    fn zero_iterations_is_invalid() {
        let result = AnalysisConfig::from_json(r#"{"max_iteration": 0}"#);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
