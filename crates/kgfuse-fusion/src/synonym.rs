//! Synonym clustering of raw terms.
//!
//! Clustering is a pure batch step: it partitions the raw term set into
//! synsets and produces the alias map the canonicalizer and the relation
//! re-targeter work from. No graph node is touched here.

use crate::lemma::{normalize, select_name, word_count};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Canonical key -> every raw surface form in its synset.
pub type AliasMap = BTreeMap<String, Vec<String>>;

/// A cluster of raw terms considered synonyms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synset {
    pub key: String,
    pub terms: BTreeSet<String>,
}

/// Groups a set of raw strings into synsets.
pub trait SynonymOracle {
    fn cluster(&self, terms: &BTreeSet<String>) -> Vec<Synset>;
}

/// Clusters terms that share a lemma, optionally widened by a curated
/// synonym table (`canonical -> [synonyms]`).
#[derive(Debug, Clone, Default)]
pub struct LemmaSynonymOracle {
    /// lemma of a synonym -> canonical entry of the table
    table: HashMap<String, String>,
}

impl LemmaSynonymOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: &AliasMap) -> Self {
        let mut index = HashMap::new();
        for (canonical, synonyms) in table {
            index.insert(normalize(canonical), canonical.clone());
            for synonym in synonyms {
                index
                    .entry(normalize(synonym))
                    .or_insert_with(|| canonical.clone());
            }
        }
        Self { table: index }
    }
}

impl SynonymOracle for LemmaSynonymOracle {
    fn cluster(&self, terms: &BTreeSet<String>) -> Vec<Synset> {
        // group key -> (preferred key, members)
        let mut groups: BTreeMap<String, (Option<String>, BTreeSet<String>)> = BTreeMap::new();
        for term in terms {
            let lemma = normalize(term);
            let (group, preferred) = match self.table.get(&lemma) {
                Some(canonical) => (format!("table:{canonical}"), Some(canonical.clone())),
                None => (format!("lemma:{lemma}"), None),
            };
            let entry = groups.entry(group).or_insert((preferred, BTreeSet::new()));
            entry.1.insert(term.clone());
        }

        groups
            .into_values()
            .filter_map(|(preferred, members)| {
                let first = members.iter().next()?.clone();
                let key = match preferred {
                    Some(canonical) if members.contains(&canonical) => canonical,
                    _ => select_name(&first, &members),
                };
                Some(Synset { key, terms: members })
            })
            .collect()
    }
}

/// Run `oracle` over `terms` and flatten the result into an alias map.
pub fn cluster_terms<O: SynonymOracle + ?Sized>(oracle: &O, terms: &BTreeSet<String>) -> AliasMap {
    let mut map = AliasMap::new();
    for synset in oracle.cluster(terms) {
        let aliases = map.entry(synset.key).or_default();
        for term in synset.terms {
            if !aliases.contains(&term) {
                aliases.push(term);
            }
        }
    }
    map
}

/// Canonical keys in node-creation order: fewer words first, then lexical.
pub fn creation_order(map: &AliasMap) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort_by(|a, b| word_count(a).cmp(&word_count(b)).then_with(|| a.cmp(b)));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lemma_oracle_groups_surface_forms() {
        let terms = set(&["Array List", "ArrayList", "array-list", "hash map"]);
        let map = cluster_terms(&LemmaSynonymOracle::new(), &terms);
        assert_eq!(map.len(), 2);
        let aliases = &map["ArrayList"];
        assert_eq!(aliases.len(), 3);
        assert!(map.contains_key("hash map"));
    }

    #[test]
    fn table_widens_clusters_and_fixes_the_key() {
        let mut table = AliasMap::new();
        table.insert("hash map".into(), vec!["hash table".into(), "dictionary".into()]);
        let oracle = LemmaSynonymOracle::with_table(&table);
        let map = cluster_terms(&oracle, &set(&["hash table", "Dictionary", "hash map"]));
        assert_eq!(map.len(), 1);
        assert_eq!(map["hash map"].len(), 3);
    }

    #[test]
    fn creation_order_is_shortest_first() {
        let mut map = AliasMap::new();
        map.insert("thread pool executor".into(), vec![]);
        map.insert("thread".into(), vec![]);
        map.insert("thread pool".into(), vec![]);
        assert_eq!(
            creation_order(&map),
            vec!["thread", "thread pool", "thread pool executor"]
        );
    }
}
