use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Declarative form of a normalizer, as it appears in scenario files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizerSpec {
    /// Strip leading/trailing whitespace before replacements run.
    #[serde(default = "default_trim")]
    pub trim: bool,
    /// Ordered regex replacements, applied after trimming.
    #[serde(default)]
    pub replace: Vec<ReplaceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceSpec {
    pub pattern: String,
    #[serde(default)]
    pub with: String,
}

fn default_trim() -> bool {
    true
}

/// Compiled value normalizer: optional trim followed by ordered
/// replace-all regex substitutions. Applied to both sides of a value
/// comparison and to correlation key parts.
#[derive(Debug, Clone)]
pub struct Normalizer {
    trim: bool,
    replacements: Vec<(Regex, String)>,
}

impl Normalizer {
    pub fn compile(spec: &NormalizerSpec) -> Result<Self, VerifyError> {
        let mut replacements = Vec::with_capacity(spec.replace.len());
        for rule in &spec.replace {
            let regex = Regex::new(&rule.pattern).map_err(|e| {
                VerifyError::Config(format!("Invalid normalizer pattern {:?}: {e}", rule.pattern))
            })?;
            replacements.push((regex, rule.with.clone()));
        }
        Ok(Self {
            trim: spec.trim,
            replacements,
        })
    }

    pub fn apply(&self, value: &str) -> String {
        let mut current = if self.trim {
            value.trim().to_string()
        } else {
            value.to_string()
        };
        for (regex, replacement) in &self.replacements {
            current = regex.replace_all(&current, replacement.as_str()).into_owned();
        }
        current
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            trim: true,
            replacements: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_then_replace() {
        let spec = NormalizerSpec {
            trim: true,
            replace: vec![ReplaceSpec {
                pattern: "^RA-".to_string(),
                with: String::new(),
            }],
        };
        let normalizer = Normalizer::compile(&spec).unwrap();
        assert_eq!(normalizer.apply("RA-12345 "), "12345");
        assert_eq!(normalizer.apply("12345"), "12345");
    }

    #[test]
    fn test_ordered_replacements() {
        let spec = NormalizerSpec {
            trim: false,
            replace: vec![
                ReplaceSpec {
                    pattern: "a".to_string(),
                    with: "b".to_string(),
                },
                ReplaceSpec {
                    pattern: "bb".to_string(),
                    with: "c".to_string(),
                },
            ],
        };
        let normalizer = Normalizer::compile(&spec).unwrap();
        assert_eq!(normalizer.apply("ab"), "c");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let spec = NormalizerSpec {
            trim: true,
            replace: vec![ReplaceSpec {
                pattern: "(".to_string(),
                with: String::new(),
            }],
        };
        assert!(matches!(
            Normalizer::compile(&spec),
            Err(VerifyError::Config(_))
        ));
    }
}
