//! Node property values.
//!
//! A value is a scalar or a string collection. Collections merge by union;
//! scalars already on a node are never overwritten by a merge.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Property map of a node. Ordered so snapshots and reports are deterministic.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

impl PropertyValue {
    pub fn str(value: impl Into<String>) -> Self {
        PropertyValue::Str(value.into())
    }

    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PropertyValue::Set(values.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            PropertyValue::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Every string this value contributes, in order. Scalars yield one
    /// element, collections yield their members.
    pub fn strings(&self) -> Vec<String> {
        match self {
            PropertyValue::Bool(b) => vec![b.to_string()],
            PropertyValue::Int(i) => vec![i.to_string()],
            PropertyValue::Float(f) => vec![f.to_string()],
            PropertyValue::Str(s) => vec![s.clone()],
            PropertyValue::List(items) => items.clone(),
            PropertyValue::Set(items) => items.iter().cloned().collect(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, PropertyValue::List(_) | PropertyValue::Set(_))
    }

    /// Whether the value is, or contains, `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            PropertyValue::Str(s) => s == needle,
            PropertyValue::List(items) => items.iter().any(|i| i == needle),
            PropertyValue::Set(items) => items.contains(needle),
            other => other.strings().iter().any(|s| s == needle),
        }
    }

    /// Whether [`absorb`](Self::absorb) can take `incoming` in: a set takes
    /// strings and string collections, a list takes string collections.
    pub fn accepts(&self, incoming: &PropertyValue) -> bool {
        matches!(
            (self, incoming),
            (
                PropertyValue::Set(_),
                PropertyValue::Set(_) | PropertyValue::List(_) | PropertyValue::Str(_)
            ) | (PropertyValue::List(_), PropertyValue::List(_) | PropertyValue::Set(_))
        )
    }

    /// Fold `incoming` into `self` without ever replacing a scalar.
    ///
    /// Sets are unioned, lists are extended with members they do not already
    /// hold, a set/list pair is unioned into a set. Scalars keep their current
    /// value. Returns whether `self` changed.
    pub fn absorb(&mut self, incoming: PropertyValue) -> bool {
        match (self, incoming) {
            (PropertyValue::Set(cur), PropertyValue::Set(new)) => {
                let before = cur.len();
                cur.extend(new);
                cur.len() != before
            }
            (PropertyValue::Set(cur), PropertyValue::List(new)) => {
                let before = cur.len();
                cur.extend(new);
                cur.len() != before
            }
            (PropertyValue::Set(cur), PropertyValue::Str(new)) => cur.insert(new),
            (PropertyValue::List(cur), PropertyValue::List(new)) => {
                let mut changed = false;
                for item in new {
                    if !cur.contains(&item) {
                        cur.push(item);
                        changed = true;
                    }
                }
                changed
            }
            (cur @ PropertyValue::List(_), PropertyValue::Set(new)) => {
                let mut merged: BTreeSet<String> = cur.strings().into_iter().collect();
                merged.extend(new);
                *cur = PropertyValue::Set(merged);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Str(s) => write!(f, "{s:?}"),
            PropertyValue::List(items) => write!(f, "{items:?}"),
            PropertyValue::Set(items) => write!(f, "{items:?}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<BTreeSet<String>> for PropertyValue {
    fn from(value: BTreeSet<String>) -> Self {
        PropertyValue::Set(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::List(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Fill `target` from `incoming` using [`PropertyValue::absorb`] for keys
/// both maps share. Returns whether anything changed.
pub fn absorb_properties(target: &mut Properties, incoming: Properties) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
                changed = true;
            }
            Some(current) => {
                if *current != value {
                    changed |= current.absorb(value);
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_unions_sets_and_keeps_scalars() {
        let mut aliases = PropertyValue::set(["a", "b"]);
        assert!(aliases.absorb(PropertyValue::set(["b", "c"])));
        assert_eq!(aliases, PropertyValue::set(["a", "b", "c"]));

        let mut name = PropertyValue::str("kept");
        assert!(!name.accepts(&PropertyValue::str("other")));
        assert!(!name.absorb(PropertyValue::str("other")));
        assert_eq!(name.as_str(), Some("kept"));
    }

    #[test]
    fn absorb_extends_lists_without_duplicates() {
        let mut list = PropertyValue::List(vec!["x".into()]);
        assert!(list.absorb(PropertyValue::List(vec!["x".into(), "y".into()])));
        assert_eq!(list, PropertyValue::List(vec!["x".into(), "y".into()]));
        assert!(!list.absorb(PropertyValue::List(vec!["y".into()])));
    }

    #[test]
    fn contains_looks_inside_collections() {
        assert!(PropertyValue::set(["thread", "threads"]).contains("threads"));
        assert!(PropertyValue::str("thread").contains("thread"));
        assert!(!PropertyValue::str("thread").contains("threads"));
        assert!(PropertyValue::Int(7).contains("7"));
    }
}
