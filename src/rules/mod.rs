//! Ordered threshold rules mapping a metric value to a color.

use serde::Serialize;

use crate::errors::CoreError;
use crate::models::{RulePatch, ThresholdRule};

/// First-match-wins rule list. Order is whatever the caller built; nothing is
/// sorted implicitly, so reordering rules can change classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    rules: Vec<ThresholdRule>,
    fallback_color: String,
}

impl RuleSet {
    pub fn new(rules: Vec<ThresholdRule>, fallback_color: impl Into<String>) -> Self {
        Self {
            rules,
            fallback_color: fallback_color.into(),
        }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn fallback_color(&self) -> &str {
        &self.fallback_color
    }

    /// Color of the first rule satisfied by `value`, or the fallback color.
    pub fn classify(&self, value: f64) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(value))
            .map(|rule| rule.color.as_str())
            .unwrap_or(&self.fallback_color)
    }

    pub fn set_rule(&mut self, index: usize, rule: ThresholdRule) -> Result<(), CoreError> {
        let slot = self.slot_mut(index)?;
        *slot = rule;
        Ok(())
    }

    /// Merges a partial edit into the rule at `index` and returns the result.
    pub fn patch_rule(&mut self, index: usize, patch: RulePatch) -> Result<&ThresholdRule, CoreError> {
        let slot = self.slot_mut(index)?;
        patch.apply_to(slot);
        Ok(&*slot)
    }

    pub fn add_rule(&mut self, rule: ThresholdRule) {
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, index: usize) -> Result<ThresholdRule, CoreError> {
        self.check_index(index)?;
        Ok(self.rules.remove(index))
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut ThresholdRule, CoreError> {
        let len = self.rules.len();
        self.rules
            .get_mut(index)
            .ok_or(CoreError::IndexOutOfRange { index, len })
    }

    fn check_index(&self, index: usize) -> Result<(), CoreError> {
        if index < self.rules.len() {
            Ok(())
        } else {
            Err(CoreError::IndexOutOfRange {
                index,
                len: self.rules.len(),
            })
        }
    }
}
