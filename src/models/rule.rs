use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Evaluates `value <op> threshold`. NaN never matches.
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => value == threshold,
            Operator::Gt => value > threshold,
            Operator::Ge => value >= threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            "=" | "==" => Ok(Operator::Eq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            other => Err(CoreError::Validation(format!("unknown operator '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRule {
    pub color: String,
    pub operator: Operator,
    pub value: f64,
}

impl ThresholdRule {
    pub fn new(color: impl Into<String>, operator: Operator, value: f64) -> Self {
        Self {
            color: color.into(),
            operator,
            value,
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        self.operator.matches(value, self.value)
    }
}

/// Single-field edits coming from the sidebar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RulePatch {
    pub color: Option<String>,
    pub operator: Option<Operator>,
    pub value: Option<f64>,
}

impl RulePatch {
    pub fn apply_to(self, rule: &mut ThresholdRule) {
        if let Some(color) = self.color {
            rule.color = color;
        }
        if let Some(operator) = self.operator {
            rule.operator = operator;
        }
        if let Some(value) = self.value {
            rule.value = value;
        }
    }
}
