//! Relation re-targeting: rewrite raw-term triples onto canonical keys.

use crate::schema::{Namespace, RETARGET_DROPPED_RELATIONS};
use crate::synonym::AliasMap;
use kgfuse_graph::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A relation endpoint: an already-resolved node, or a raw term string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Node(NodeId),
    Term(String),
}

impl Endpoint {
    pub fn term(s: impl Into<String>) -> Self {
        Endpoint::Term(s.into())
    }

    pub fn as_term(&self) -> Option<&str> {
        match self {
            Endpoint::Term(s) => Some(s),
            Endpoint::Node(_) => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Node(id) => write!(f, "#{id}"),
            Endpoint::Term(s) => write!(f, "{s:?}"),
        }
    }
}

/// `(start, relation type, end)` as it comes out of extraction.
///
/// Serialized as a JSON triple: `[12, "mention in comment", "thread pool"]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawTriple(pub Endpoint, pub String, pub Endpoint);

impl RawTriple {
    pub fn new(start: Endpoint, rel_type: impl Into<String>, end: Endpoint) -> Self {
        Self(start, rel_type.into(), end)
    }

    pub fn start(&self) -> &Endpoint {
        &self.0
    }

    pub fn rel_type(&self) -> &str {
        &self.1
    }

    pub fn end(&self) -> &Endpoint {
        &self.2
    }
}

impl fmt::Display for RawTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -[{}]-> {})", self.0, self.1, self.2)
    }
}

/// Maps raw strings to every canonical key whose synset lists them.
#[derive(Debug, Clone, Default)]
pub struct RelationRetargeter {
    alias_to_keys: HashMap<String, BTreeSet<String>>,
}

impl RelationRetargeter {
    pub fn new(alias_map: &AliasMap) -> Self {
        let mut alias_to_keys: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (key, aliases) in alias_map {
            for alias in aliases {
                alias_to_keys
                    .entry(alias.clone())
                    .or_default()
                    .insert(key.clone());
            }
        }
        Self { alias_to_keys }
    }

    fn targets(&self, endpoint: &Endpoint) -> Vec<Endpoint> {
        match endpoint {
            Endpoint::Node(_) => vec![endpoint.clone()],
            Endpoint::Term(raw) => match self.alias_to_keys.get(raw) {
                Some(keys) if !keys.is_empty() => {
                    keys.iter().cloned().map(Endpoint::Term).collect()
                }
                _ => vec![endpoint.clone()],
            },
        }
    }

    /// Rewrite every triple onto canonical keys.
    ///
    /// `has operation` / `can be operated` triples are dropped; strings in no
    /// synset pass through unchanged; strings in several synsets expand into
    /// the cross product. Ends that name an operation are left as they are:
    /// term synonyms never apply in the operation namespace.
    pub fn retarget<I>(&self, triples: I) -> BTreeSet<RawTriple>
    where
        I: IntoIterator<Item = RawTriple>,
    {
        let mut out = BTreeSet::new();
        for RawTriple(start, rel_type, end) in triples {
            if RETARGET_DROPPED_RELATIONS.contains(&rel_type.as_str()) {
                continue;
            }
            let ends = match Namespace::end_of(&rel_type) {
                Namespace::Operation => vec![end],
                Namespace::Term => self.targets(&end),
            };
            for s in self.targets(&start) {
                for e in &ends {
                    out.insert(RawTriple(s.clone(), rel_type.clone(), e.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, r: &str, e: &str) -> RawTriple {
        RawTriple::new(Endpoint::term(s), r, Endpoint::term(e))
    }

    fn alias_map() -> AliasMap {
        let mut map = AliasMap::new();
        map.insert("list".into(), vec!["list".into(), "lists".into()]);
        map.insert("array list".into(), vec!["array list".into(), "ArrayList".into()]);
        map.insert("vector".into(), vec!["vector".into(), "array".into()]);
        map.insert("array".into(), vec!["array".into(), "arrays".into()]);
        map
    }

    #[test]
    fn rewrites_onto_canonical_keys_and_expands_ambiguity() {
        let r = RelationRetargeter::new(&alias_map());
        let out = r.retarget([t("ArrayList", "is a", "lists"), t("array", "part of", "lists")]);
        assert!(out.contains(&t("array list", "is a", "list")));
        assert!(out.contains(&t("vector", "part of", "list")));
        assert!(out.contains(&t("array", "part of", "list")));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn unknown_strings_pass_through_and_ids_are_kept() {
        let r = RelationRetargeter::new(&alias_map());
        let linkage = RawTriple::new(
            Endpoint::Node(NodeId::new(7)),
            "mention in comment",
            Endpoint::term("mutex"),
        );
        let out = r.retarget([linkage.clone()]);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), vec![linkage]);
    }

    #[test]
    fn operation_synthesis_relations_are_dropped() {
        let r = RelationRetargeter::new(&alias_map());
        let out = r.retarget([
            t("list", "has operation", "add"),
            t("list", "can be operated", "sort"),
            t("list", "instance of", "sort"),
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn operation_ends_bypass_term_synonyms() {
        let mut map = alias_map();
        map.insert("sorting".into(), vec!["sorting".into(), "sort".into()]);
        let r = RelationRetargeter::new(&map);
        let out: Vec<RawTriple> = r
            .retarget([t("ArrayList", "instance of", "sort")])
            .into_iter()
            .collect();
        assert_eq!(out, vec![t("array list", "instance of", "sort")]);
    }

    #[test]
    fn triples_deserialize_from_mixed_json() {
        let triple: RawTriple =
            serde_json::from_str(r#"[12, "mention in comment", "thread pool"]"#).unwrap();
        assert_eq!(triple.start(), &Endpoint::Node(NodeId::new(12)));
        assert_eq!(triple.end().as_term(), Some("thread pool"));
    }
}
