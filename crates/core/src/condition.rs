//! Store-evaluable write conditions.

use std::cmp::Ordering;
use std::fmt;

use crate::value::{Item, Value};

/// A boolean condition over the attributes of a single stored item.
///
/// Conditions are evaluated by the store atomically with a write. The same
/// tree can also be evaluated locally with [`Condition::evaluate`], which
/// follows the store's rules: a comparison against a missing attribute
/// never holds, except `Ne` which does.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    Exists(String),
    NotExists(String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(name.into(), value.into())
    }

    pub fn ne(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ne(name.into(), value.into())
    }

    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lt(name.into(), value.into())
    }

    pub fn le(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Le(name.into(), value.into())
    }

    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gt(name.into(), value.into())
    }

    pub fn ge(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ge(name.into(), value.into())
    }

    pub fn exists(name: impl Into<String>) -> Self {
        Condition::Exists(name.into())
    }

    pub fn not_exists(name: impl Into<String>) -> Self {
        Condition::NotExists(name.into())
    }

    /// Combines two conditions with AND, flattening nested conjunctions.
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::And(mut left), Condition::And(right)) => {
                left.extend(right);
                Condition::And(left)
            }
            (Condition::And(mut left), other) => {
                left.push(other);
                Condition::And(left)
            }
            (this, Condition::And(mut right)) => {
                right.insert(0, this);
                Condition::And(right)
            }
            (this, other) => Condition::And(vec![this, other]),
        }
    }

    /// Combines two conditions with OR, flattening nested disjunctions.
    pub fn or(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::Or(mut left), Condition::Or(right)) => {
                left.extend(right);
                Condition::Or(left)
            }
            (Condition::Or(mut left), other) => {
                left.push(other);
                Condition::Or(left)
            }
            (this, Condition::Or(mut right)) => {
                right.insert(0, this);
                Condition::Or(right)
            }
            (this, other) => Condition::Or(vec![this, other]),
        }
    }

    /// Evaluates the condition against a stored item (`None` when absent).
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        let lookup = |name: &String| item.and_then(|item| item.get(name.as_str()));
        let compare = |name: &String, value: &Value| lookup(name).and_then(|v| v.compare(value));

        match self {
            Condition::Eq(name, value) => compare(name, value) == Some(Ordering::Equal),
            Condition::Ne(name, value) => compare(name, value) != Some(Ordering::Equal),
            Condition::Lt(name, value) => compare(name, value) == Some(Ordering::Less),
            Condition::Le(name, value) => {
                matches!(compare(name, value), Some(Ordering::Less | Ordering::Equal))
            }
            Condition::Gt(name, value) => compare(name, value) == Some(Ordering::Greater),
            Condition::Ge(name, value) => {
                matches!(
                    compare(name, value),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            }
            Condition::Exists(name) => lookup(name).is_some(),
            Condition::NotExists(name) => lookup(name).is_none(),
            Condition::And(conditions) => conditions.iter().all(|c| c.evaluate(item)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.evaluate(item)),
        }
    }

    /// Returns the attribute names referenced by the condition, in order of
    /// first appearance.
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Condition::And(conditions) | Condition::Or(conditions) => {
                for condition in conditions {
                    condition.collect_names(names);
                }
            }
            other => {
                if let Some(name) = other.attribute_name() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
    }

    /// Returns the attribute and operand of a leaf comparison.
    pub fn comparison(&self) -> Option<(&str, &Value)> {
        match self {
            Condition::Eq(name, value)
            | Condition::Ne(name, value)
            | Condition::Lt(name, value)
            | Condition::Le(name, value)
            | Condition::Gt(name, value)
            | Condition::Ge(name, value) => Some((name, value)),
            _ => None,
        }
    }

    fn attribute_name(&self) -> Option<&str> {
        match self {
            Condition::Exists(name) | Condition::NotExists(name) => Some(name),
            other => other.comparison().map(|(name, _)| name),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, conditions: &[Condition], op: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            write!(f, " {op} ")?;
        }
        write!(f, "{condition}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Eq(name, value) => write!(f, "{name} = {value}"),
            Condition::Ne(name, value) => write!(f, "{name} <> {value}"),
            Condition::Lt(name, value) => write!(f, "{name} < {value}"),
            Condition::Le(name, value) => write!(f, "{name} <= {value}"),
            Condition::Gt(name, value) => write!(f, "{name} > {value}"),
            Condition::Ge(name, value) => write!(f, "{name} >= {value}"),
            Condition::Exists(name) => write!(f, "attribute_exists({name})"),
            Condition::NotExists(name) => write!(f, "attribute_not_exists({name})"),
            Condition::And(conditions) => write_joined(f, conditions, "AND"),
            Condition::Or(conditions) => write_joined(f, conditions, "OR"),
        }
    }
}
