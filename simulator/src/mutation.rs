//! Field mutation pipeline applied to every routed message. Rules are
//! declarative (inline config or an external YAML/JSON file), evaluated
//! in declaration order; earlier mutations are visible to later rules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors from rule loading and application.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Rule {rule:?} references missing tag {tag} in strict mode")]
    StrictModeViolation { rule: String, tag: u32 },

    #[error("Invalid rule {rule:?}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Cannot load rules file: {0}")]
    RulesFile(String),
}

/// Declarative rule shape as it appears in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub when: WhenSpec,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhenSpec {
    /// Empty matches any message type.
    #[serde(default)]
    pub msg_types: Vec<String>,
    /// All conditions must hold.
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    pub tag: u32,
    pub exists: Option<bool>,
    pub equals: Option<String>,
    pub regex: Option<String>,
    pub tag_in: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ActionSpec {
    #[serde(rename = "SET")]
    Set { tag: u32, value: String },
    #[serde(rename = "REMOVE")]
    Remove { tag: u32 },
    #[serde(rename = "PREFIX")]
    Prefix { tag: u32, value: String },
    #[serde(rename = "SUFFIX")]
    Suffix { tag: u32, value: String },
    #[serde(rename = "REGEX_REPLACE")]
    RegexReplace {
        tag: u32,
        pattern: String,
        replacement: String,
    },
    #[serde(rename = "COPY")]
    Copy { from_tag: u32, to_tag: u32 },
}

#[derive(Debug)]
enum Predicate {
    Exists(bool),
    Equals(String),
    Matches(Regex),
    In(BTreeSet<String>),
}

#[derive(Debug)]
struct Condition {
    tag: u32,
    predicates: Vec<Predicate>,
}

#[derive(Debug)]
enum Action {
    Set { tag: u32, value: String },
    Remove { tag: u32 },
    Prefix { tag: u32, value: String },
    Suffix { tag: u32, value: String },
    RegexReplace { tag: u32, regex: Regex, replacement: String },
    Copy { from_tag: u32, to_tag: u32 },
}

#[derive(Debug)]
struct Rule {
    name: String,
    msg_types: BTreeSet<String>,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
}

/// Compiled rule set. Immutable after construction; application mutates
/// caller-owned field maps only.
#[derive(Debug)]
pub struct MutationEngine {
    rules: Vec<Rule>,
    strict_mode: bool,
}

impl MutationEngine {
    pub fn compile(specs: &[RuleSpec], strict_mode: bool) -> Result<Self, MutationError> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            rules.push(compile_rule(spec)?);
        }
        Ok(Self { rules, strict_mode })
    }

    /// Load rules from a YAML or JSON file holding a list of rules.
    pub fn load_file(path: &Path, strict_mode: bool) -> Result<Self, MutationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MutationError::RulesFile(format!("{}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let specs: Vec<RuleSpec> = if is_json {
            serde_json::from_str(&text).map_err(|e| MutationError::RulesFile(e.to_string()))?
        } else {
            serde_yaml::from_str(&text).map_err(|e| MutationError::RulesFile(e.to_string()))?
        };
        Self::compile(&specs, strict_mode)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Apply every matching rule in declaration order.
    pub fn apply(
        &self,
        msg_type: &str,
        fields: &mut BTreeMap<u32, String>,
    ) -> Result<(), MutationError> {
        for rule in &self.rules {
            if !rule.msg_types.is_empty() && !rule.msg_types.contains(msg_type) {
                continue;
            }
            if !self.conditions_hold(rule, fields)? {
                continue;
            }
            debug!(rule = %rule.name, msg_type, "Applying mutation rule");
            self.run_actions(rule, fields)?;
        }
        Ok(())
    }

    fn conditions_hold(
        &self,
        rule: &Rule,
        fields: &BTreeMap<u32, String>,
    ) -> Result<bool, MutationError> {
        for condition in &rule.conditions {
            let value = fields.get(&condition.tag);
            for predicate in &condition.predicates {
                // Presence checks treat absence as an answer; the other
                // predicates need a value and trip the strict-mode rule.
                let holds = match (predicate, value) {
                    (Predicate::Exists(wanted), v) => v.is_some() == *wanted,
                    (_, None) => {
                        if self.strict_mode {
                            return Err(MutationError::StrictModeViolation {
                                rule: rule.name.clone(),
                                tag: condition.tag,
                            });
                        }
                        return Ok(false);
                    }
                    (Predicate::Equals(expected), Some(v)) => v == expected,
                    (Predicate::Matches(regex), Some(v)) => regex.is_match(v),
                    (Predicate::In(set), Some(v)) => set.contains(v),
                };
                if !holds {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn run_actions(
        &self,
        rule: &Rule,
        fields: &mut BTreeMap<u32, String>,
    ) -> Result<(), MutationError> {
        for action in &rule.actions {
            match action {
                Action::Set { tag, value } => {
                    fields.insert(*tag, value.clone());
                }
                Action::Remove { tag } => {
                    if fields.remove(tag).is_none() {
                        self.missing(rule, *tag)?;
                    }
                }
                Action::Prefix { tag, value } => match fields.get_mut(tag) {
                    Some(existing) => *existing = format!("{value}{existing}"),
                    None => self.missing(rule, *tag)?,
                },
                Action::Suffix { tag, value } => match fields.get_mut(tag) {
                    Some(existing) => existing.push_str(value),
                    None => self.missing(rule, *tag)?,
                },
                Action::RegexReplace {
                    tag,
                    regex,
                    replacement,
                } => match fields.get_mut(tag) {
                    Some(existing) => {
                        *existing = regex.replace_all(existing, replacement.as_str()).into_owned()
                    }
                    None => self.missing(rule, *tag)?,
                },
                Action::Copy { from_tag, to_tag } => match fields.get(from_tag).cloned() {
                    Some(value) => {
                        fields.insert(*to_tag, value);
                    }
                    None => self.missing(rule, *from_tag)?,
                },
            }
        }
        Ok(())
    }

    /// Missing action target: strict mode fails the message, otherwise
    /// the action is skipped.
    fn missing(&self, rule: &Rule, tag: u32) -> Result<(), MutationError> {
        if self.strict_mode {
            return Err(MutationError::StrictModeViolation {
                rule: rule.name.clone(),
                tag,
            });
        }
        debug!(rule = %rule.name, tag, "Skipping action on missing tag");
        Ok(())
    }
}

fn compile_rule(spec: &RuleSpec) -> Result<Rule, MutationError> {
    let mut conditions = Vec::with_capacity(spec.when.conditions.len());
    for condition in &spec.when.conditions {
        let mut predicates = Vec::new();
        if let Some(wanted) = condition.exists {
            predicates.push(Predicate::Exists(wanted));
        }
        if let Some(expected) = &condition.equals {
            predicates.push(Predicate::Equals(expected.clone()));
        }
        if let Some(pattern) = &condition.regex {
            let regex = Regex::new(pattern).map_err(|e| MutationError::InvalidRule {
                rule: spec.name.clone(),
                reason: format!("condition regex {pattern:?}: {e}"),
            })?;
            predicates.push(Predicate::Matches(regex));
        }
        if let Some(values) = &condition.tag_in {
            predicates.push(Predicate::In(values.iter().cloned().collect()));
        }
        if predicates.is_empty() {
            return Err(MutationError::InvalidRule {
                rule: spec.name.clone(),
                reason: format!("condition on tag {} has no predicate", condition.tag),
            });
        }
        conditions.push(Condition {
            tag: condition.tag,
            predicates,
        });
    }

    let mut actions = Vec::with_capacity(spec.actions.len());
    for action in &spec.actions {
        actions.push(match action {
            ActionSpec::Set { tag, value } => Action::Set {
                tag: *tag,
                value: value.clone(),
            },
            ActionSpec::Remove { tag } => Action::Remove { tag: *tag },
            ActionSpec::Prefix { tag, value } => Action::Prefix {
                tag: *tag,
                value: value.clone(),
            },
            ActionSpec::Suffix { tag, value } => Action::Suffix {
                tag: *tag,
                value: value.clone(),
            },
            ActionSpec::RegexReplace {
                tag,
                pattern,
                replacement,
            } => Action::RegexReplace {
                tag: *tag,
                regex: Regex::new(pattern).map_err(|e| MutationError::InvalidRule {
                    rule: spec.name.clone(),
                    reason: format!("action regex {pattern:?}: {e}"),
                })?,
                replacement: replacement.clone(),
            },
            ActionSpec::Copy { from_tag, to_tag } => Action::Copy {
                from_tag: *from_tag,
                to_tag: *to_tag,
            },
        });
    }

    Ok(Rule {
        name: spec.name.clone(),
        msg_types: spec.when.msg_types.iter().cloned().collect(),
        conditions,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fields(pairs: &[(u32, &str)]) -> BTreeMap<u32, String> {
        pairs
            .iter()
            .map(|&(tag, value)| (tag, value.to_string()))
            .collect()
    }

    fn engine_from_yaml(yaml: &str, strict: bool) -> MutationEngine {
        let specs: Vec<RuleSpec> = serde_yaml::from_str(yaml).unwrap();
        MutationEngine::compile(&specs, strict).unwrap()
    }

    #[test]
    fn test_prefix_and_set() {
        let engine = engine_from_yaml(
            r#"
- name: tag-order
  when:
    msg_types: ["D"]
  actions:
    - action: PREFIX
      tag: 11
      value: "RA-"
    - action: SET
      tag: 9001
      value: "RAPID_ADDITION"
"#,
            false,
        );
        let mut map = fields(&[(11, "ORDER-001"), (55, "IBM")]);
        engine.apply("D", &mut map).unwrap();
        assert_eq!(map.get(&11).map(String::as_str), Some("RA-ORDER-001"));
        assert_eq!(map.get(&9001).map(String::as_str), Some("RAPID_ADDITION"));
        assert_eq!(map.get(&55).map(String::as_str), Some("IBM"));
    }

    #[test]
    fn test_msg_type_gate() {
        let engine = engine_from_yaml(
            r#"
- name: only-orders
  when:
    msg_types: ["D"]
  actions:
    - action: SET
      tag: 58
      value: mutated
"#,
            false,
        );
        let mut map = fields(&[(11, "X")]);
        engine.apply("8", &mut map).unwrap();
        assert!(!map.contains_key(&58));
    }

    #[test]
    fn test_conditions_all_must_hold() {
        let engine = engine_from_yaml(
            r#"
- name: guarded
  when:
    conditions:
      - tag: 55
        equals: IBM
      - tag: 54
        tag_in: ["1", "2"]
  actions:
    - action: SET
      tag: 58
      value: hit
"#,
            false,
        );
        let mut hit = fields(&[(55, "IBM"), (54, "1")]);
        engine.apply("D", &mut hit).unwrap();
        assert!(hit.contains_key(&58));

        let mut miss = fields(&[(55, "IBM"), (54, "5")]);
        engine.apply("D", &mut miss).unwrap();
        assert!(!miss.contains_key(&58));
    }

    #[test]
    fn test_missing_condition_tag_lenient_vs_strict() {
        let yaml = r#"
- name: needs-41
  when:
    conditions:
      - tag: 41
        equals: X
  actions:
    - action: SET
      tag: 58
      value: hit
"#;
        let lenient = engine_from_yaml(yaml, false);
        let mut map = fields(&[(11, "A")]);
        lenient.apply("D", &mut map).unwrap();
        assert!(!map.contains_key(&58));

        let strict = engine_from_yaml(yaml, true);
        let mut map = fields(&[(11, "A")]);
        assert!(matches!(
            strict.apply("D", &mut map),
            Err(MutationError::StrictModeViolation { tag: 41, .. })
        ));
    }

    #[test]
    fn test_exists_false_matches_absence() {
        let engine = engine_from_yaml(
            r#"
- name: default-account
  when:
    conditions:
      - tag: 1
        exists: false
  actions:
    - action: SET
      tag: 1
      value: HOUSE
"#,
            true,
        );
        let mut map = fields(&[(11, "A")]);
        engine.apply("D", &mut map).unwrap();
        assert_eq!(map.get(&1).map(String::as_str), Some("HOUSE"));
    }

    #[test]
    fn test_action_on_missing_tag_skips_or_fails() {
        let yaml = r#"
- name: rename
  actions:
    - action: PREFIX
      tag: 41
      value: "RA-"
    - action: SET
      tag: 58
      value: done
"#;
        let lenient = engine_from_yaml(yaml, false);
        let mut map = fields(&[(11, "A")]);
        lenient.apply("D", &mut map).unwrap();
        // Prefix skipped, later actions still ran.
        assert_eq!(map.get(&58).map(String::as_str), Some("done"));

        let strict = engine_from_yaml(yaml, true);
        let mut map = fields(&[(11, "A")]);
        assert!(strict.apply("D", &mut map).is_err());
    }

    #[test]
    fn test_earlier_mutations_visible_to_later_rules() {
        let engine = engine_from_yaml(
            r#"
- name: first
  actions:
    - action: SET
      tag: 55
      value: IBM
- name: second
  when:
    conditions:
      - tag: 55
        equals: IBM
  actions:
    - action: SUFFIX
      tag: 55
      value: ".N"
"#,
            false,
        );
        let mut map = fields(&[(11, "A")]);
        engine.apply("D", &mut map).unwrap();
        assert_eq!(map.get(&55).map(String::as_str), Some("IBM.N"));
    }

    #[test]
    fn test_regex_replace_and_copy() {
        let engine = engine_from_yaml(
            r#"
- name: rewrite
  actions:
    - action: REGEX_REPLACE
      tag: 11
      pattern: "^ORD"
      replacement: "X"
    - action: COPY
      from_tag: 11
      to_tag: 41
"#,
            false,
        );
        let mut map = fields(&[(11, "ORD-1")]);
        engine.apply("D", &mut map).unwrap();
        assert_eq!(map.get(&11).map(String::as_str), Some("X-1"));
        assert_eq!(map.get(&41).map(String::as_str), Some("X-1"));
    }

    #[test]
    fn test_invalid_regex_rejected_at_compile() {
        let specs: Vec<RuleSpec> = serde_yaml::from_str(
            r#"
- name: broken
  actions:
    - action: REGEX_REPLACE
      tag: 11
      pattern: "("
      replacement: ""
"#,
        )
        .unwrap();
        assert!(matches!(
            MutationEngine::compile(&specs, false),
            Err(MutationError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_load_rules_file_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
- name: from-file
  actions:
    - action: SET
      tag: 58
      value: loaded
"#
        )
        .unwrap();
        let engine = MutationEngine::load_file(file.path(), false).unwrap();
        assert_eq!(engine.rule_count(), 1);
        let mut map = fields(&[]);
        engine.apply("D", &mut map).unwrap();
        assert_eq!(map.get(&58).map(String::as_str), Some("loaded"));
    }
}
