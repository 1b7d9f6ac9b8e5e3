//! Label and field selectors used by list, watch and delete-collection
//!
//! Label selectors support the full Kubernetes syntax and are matched with
//! `kube::core::Selector`:
//! - Equality: `key=value` or `key==value`
//! - Inequality: `key!=value`
//! - Set-based: `key in (value1,value2)` or `key notin (value1,value2)`
//! - Existence: `key` or `!key`
//!
//! Field selectors address any dotted path in the stored object
//! (`metadata.name`, `spec.nodeName`, `status.phase`, ...) with `=`, `==`
//! and `!=`. A missing field compares as the empty string.

use crate::{Error, Result};
use kube::core::{Expression, Selector, SelectorExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Split on commas that are not inside a parenthesised value set
fn split_requirements(selector: &str) -> Result<Vec<&str>> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut depth = 0i32;

    for (i, ch) in selector.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::Invalid(format!(
                        "unbalanced parentheses in selector: {}",
                        selector
                    )));
                }
            }
            ',' if depth == 0 => {
                result.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(Error::Invalid(format!(
            "unbalanced parentheses in selector: {}",
            selector
        )));
    }
    if start < selector.len() {
        result.push(&selector[start..]);
    }

    Ok(result)
}

fn parse_value_set(requirement: &str, rest: &str) -> Result<BTreeSet<String>> {
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| Error::Invalid(format!("invalid value set: {}", requirement)))?;
    Ok(inner.split(',').map(|v| v.trim().to_string()).collect())
}

fn checked_key<'a>(requirement: &str, key: &'a str) -> Result<&'a str> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(Error::Invalid(format!(
            "invalid selector requirement: {}",
            requirement
        )));
    }
    Ok(key)
}

/// Parse a Kubernetes label selector string
///
/// An empty selector matches everything.
///
/// ```
/// use kube_fake_clientset::selector::parse_label_selector;
///
/// assert!(parse_label_selector("app=web,tier in (frontend,edge)").is_ok());
/// assert!(parse_label_selector("app in frontend").is_err());
/// ```
pub fn parse_label_selector(selector: &str) -> Result<Selector> {
    let mut expressions = Vec::new();

    for requirement in split_requirements(selector)? {
        let requirement = requirement.trim();
        if requirement.is_empty() {
            continue;
        }

        let expression = if let Some((key, rest)) = requirement.split_once(" notin ") {
            let key = checked_key(requirement, key)?;
            Expression::NotIn(key.to_string(), parse_value_set(requirement, rest)?)
        } else if let Some((key, rest)) = requirement.split_once(" in ") {
            let key = checked_key(requirement, key)?;
            Expression::In(key.to_string(), parse_value_set(requirement, rest)?)
        } else if let Some(key) = requirement.strip_prefix('!') {
            Expression::DoesNotExist(checked_key(requirement, key)?.to_string())
        } else if let Some((key, value)) = requirement.split_once("!=") {
            let key = checked_key(requirement, key)?;
            Expression::NotIn(key.to_string(), BTreeSet::from([value.trim().to_string()]))
        } else if let Some((key, value)) = requirement
            .split_once("==")
            .or_else(|| requirement.split_once('='))
        {
            let key = checked_key(requirement, key)?;
            Expression::In(key.to_string(), BTreeSet::from([value.trim().to_string()]))
        } else {
            Expression::Exists(checked_key(requirement, requirement)?.to_string())
        };
        expressions.push(expression);
    }

    Ok(Selector::from_iter(expressions))
}

/// Match labels against a label selector string
///
/// ```
/// use std::collections::BTreeMap;
/// use kube_fake_clientset::selector::matches_label_selector;
///
/// let labels = BTreeMap::from([("app".to_string(), "web".to_string())]);
/// assert!(matches_label_selector(&labels, "app=web").unwrap());
/// assert!(!matches_label_selector(&labels, "app!=web").unwrap());
/// ```
pub fn matches_label_selector(labels: &BTreeMap<String, String>, selector: &str) -> Result<bool> {
    Ok(parse_label_selector(selector)?.matches(labels))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldOp {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRequirement {
    path: Vec<String>,
    op: FieldOp,
    value: String,
}

impl FieldRequirement {
    fn matches(&self, object: &Value) -> bool {
        let actual = lookup_field(object, &self.path).unwrap_or_default();
        match self.op {
            FieldOp::Equals => actual == self.value,
            FieldOp::NotEquals => actual != self.value,
        }
    }
}

fn lookup_field(object: &Value, path: &[String]) -> Option<String> {
    let value = path
        .iter()
        .try_fold(object, |current, segment| current.get(segment.as_str()))?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A parsed field selector; all requirements must hold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn parse(selector: &str) -> Result<Self> {
        let mut requirements = Vec::new();

        for requirement in selector.split(',') {
            let requirement = requirement.trim();
            if requirement.is_empty() {
                continue;
            }

            let (field, op, value) = if let Some((f, v)) = requirement.split_once("!=") {
                (f, FieldOp::NotEquals, v)
            } else if let Some((f, v)) = requirement.split_once("==") {
                (f, FieldOp::Equals, v)
            } else if let Some((f, v)) = requirement.split_once('=') {
                (f, FieldOp::Equals, v)
            } else {
                return Err(Error::Invalid(format!(
                    "invalid field selector requirement: {}",
                    requirement
                )));
            };

            let field = checked_key(requirement, field)?;
            let path: Vec<String> = field.split('.').map(str::to_string).collect();
            if path.iter().any(String::is_empty) {
                return Err(Error::Invalid(format!(
                    "invalid field path in selector: {}",
                    field
                )));
            }

            requirements.push(FieldRequirement {
                path,
                op,
                value: value.trim().to_string(),
            });
        }

        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, object: &Value) -> bool {
        self.requirements.iter().all(|r| r.matches(object))
    }
}

/// Combined label and field selection over a stored object
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    labels: Selector,
    fields: FieldSelector,
}

impl ObjectFilter {
    /// A filter that accepts every object
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn new(label_selector: Option<&str>, field_selector: Option<&str>) -> Result<Self> {
        Ok(Self {
            labels: parse_label_selector(label_selector.unwrap_or_default())?,
            fields: FieldSelector::parse(field_selector.unwrap_or_default())?,
        })
    }

    pub fn matches(&self, object: &Value) -> bool {
        if !self.fields.matches(object) {
            return false;
        }
        let labels: BTreeMap<String, String> = object
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| serde_json::from_value(l.clone()).ok())
            .unwrap_or_default();
        self.labels.matches(&labels)
    }
}
