//! External-fact records ("items") and the property-id name table.

use crate::artifact::read_json;
use crate::error::Result;
use crate::schema::{ALIAS_EN, DESCRIPTION_EN, WD_ITEM_ID, WIKIDATA_NAME};
use kgfuse_graph::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Descriptions/snippets containing one of these mark meta-pages, not facts.
pub const SNIPPET_DENYLIST: &[&str] = &[
    "scientific article",
    "wikimedia template",
    "wikimedia list article",
    "wikipedia template",
    "wikibase wikis",
    "wikimedia",
];

/// Item names containing one of these are never linked.
pub const NAME_DENYLIST: &[&str] = &[
    "scientific article",
    "wikimedia template",
    "wikimedia list article",
    "wikipedia template",
    "wikibase wikis",
    "wikimedia",
    "wikibase",
    "wikidata",
];

/// `instance of` targets that disqualify an item: film, wiki, gene.
pub const DENIED_CLASSES: &[&str] = &["Q11424", "Q15138389", "Q7187"];

pub const INSTANCE_OF: &str = "P31";

/// One title-search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleHit {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

impl TitleHit {
    pub fn is_denied(&self) -> bool {
        let snippet = self.snippet.to_lowercase();
        SNIPPET_DENYLIST.iter().any(|d| snippet.contains(d))
    }
}

/// Target of a claim: another item, or a plain literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClaimValue {
    Item(String),
    Literal(String),
}

impl ClaimValue {
    pub fn as_str(&self) -> &str {
        match self {
            ClaimValue::Item(s) | ClaimValue::Literal(s) => s,
        }
    }
}

/// `Q` followed by digits.
pub fn is_item_id(s: &str) -> bool {
    s.len() > 1 && s.starts_with('Q') && s[1..].bytes().all(|b| b.is_ascii_digit())
}

/// An external-fact candidate. Missing text fields deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub aliases: BTreeSet<String>,
    /// property id (`P31`) -> claim values
    pub claims: BTreeMap<String, Vec<ClaimValue>>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn with_claim(mut self, property: impl Into<String>, value: ClaimValue) -> Self {
        self.claims.entry(property.into()).or_default().push(value);
        self
    }

    /// `(property id, target item id)` for every item-valued claim.
    pub fn references(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.claims.iter().flat_map(|(p, values)| {
            values.iter().filter_map(move |v| match v {
                ClaimValue::Item(id) if is_item_id(id) => Some((p.as_str(), id.as_str())),
                _ => None,
            })
        })
    }

    pub fn neighbour_ids(&self) -> BTreeSet<String> {
        self.references().map(|(_, id)| id.to_string()).collect()
    }

    pub fn instance_of(&self) -> impl Iterator<Item = &str> + '_ {
        self.claims
            .get(INSTANCE_OF)
            .into_iter()
            .flatten()
            .map(ClaimValue::as_str)
    }

    /// Never link to meta-pages, films, wikis or genes.
    pub fn is_valid(&self) -> bool {
        let name = self.name.to_lowercase();
        if NAME_DENYLIST.iter().any(|d| name.contains(d)) {
            return false;
        }
        !self.instance_of().any(|class| DENIED_CLASSES.contains(&class))
    }

    /// Non-relation properties to copy onto a graph node.
    ///
    /// Literal claims are kept under their human-readable property name;
    /// literals whose property has no name are dropped.
    pub fn fact_properties(&self, table: &PropertyTable) -> Properties {
        let mut props = Properties::new();
        props.insert(WD_ITEM_ID.to_string(), PropertyValue::str(&self.id));
        props.insert(WIKIDATA_NAME.to_string(), PropertyValue::str(&self.name));
        props.insert(DESCRIPTION_EN.to_string(), PropertyValue::str(&self.description));
        props.insert(ALIAS_EN.to_string(), PropertyValue::Set(self.aliases.clone()));

        for (pid, values) in &self.claims {
            let literals: Vec<String> = values
                .iter()
                .filter_map(|v| match v {
                    ClaimValue::Literal(s) => Some(s.clone()),
                    ClaimValue::Item(_) => None,
                })
                .collect();
            if literals.is_empty() {
                continue;
            }
            let Some(name) = table.name(pid) else {
                continue;
            };
            let value = match <[String; 1]>::try_from(literals) {
                Ok([single]) => PropertyValue::Str(single),
                Err(many) => PropertyValue::List(many),
            };
            props.insert(name.to_string(), value);
        }
        props
    }
}

// ============================================================================
// Property table
// ============================================================================

const DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    ("P31", "instance of"),
    ("P279", "subclass of"),
    ("P361", "part of"),
    ("P527", "has part"),
    ("P366", "use"),
    ("P1552", "has quality"),
    ("P460", "said to be the same as"),
    ("P461", "opposite of"),
    ("P1889", "different from"),
    ("P144", "based on"),
    ("P155", "follows"),
    ("P156", "followed by"),
    ("P737", "influenced by"),
    ("P1535", "used by"),
    ("P2283", "uses"),
    ("P178", "developer"),
    ("P170", "creator"),
    ("P277", "programmed in"),
    ("P306", "operating system"),
    ("P348", "software version identifier"),
    ("P571", "inception"),
    ("P856", "official website"),
    ("P1324", "source code repository"),
    ("P1482", "Stack Exchange tag"),
    ("P2184", "history of topic"),
    ("P3966", "programming paradigm"),
    ("P1401", "bug tracking system"),
    ("P275", "copyright license"),
];

/// Property id -> human-readable relation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTable {
    names: BTreeMap<String, String>,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self {
            names: DEFAULT_PROPERTIES
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl PropertyTable {
    /// Defaults extended (and overridden) by a JSON `{ "P123": "name" }` file.
    pub fn load(path: &Path) -> Result<Self> {
        let extra: BTreeMap<String, String> = read_json(path)?;
        let mut table = Self::default();
        table.names.extend(extra);
        Ok(table)
    }

    pub fn name(&self, property_id: &str) -> Option<&str> {
        self.names.get(property_id).map(String::as_str)
    }

    pub fn insert(&mut self, property_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(property_id.into(), name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_checks_name_and_class() {
        let ok = Item::new("Q1", "thread", "unit of execution");
        assert!(ok.is_valid());
        assert!(!Item::new("Q2", "Wikimedia disambiguation page", "").is_valid());
        let film = Item::new("Q3", "Thread", "2016 film")
            .with_claim("P31", ClaimValue::Item("Q11424".into()));
        assert!(!film.is_valid());
    }

    #[test]
    fn denied_snippets() {
        let hit = TitleHit {
            id: "Q9".into(),
            title: "Q9".into(),
            snippet: "Wikimedia template".into(),
        };
        assert!(hit.is_denied());
    }

    #[test]
    fn fact_properties_keep_named_literals_only() {
        let item = Item::new("Q1", "thread", "unit of execution")
            .with_alias("thread of execution")
            .with_claim("P31", ClaimValue::Item("Q5".into()))
            .with_claim("P1482", ClaimValue::Literal("multithreading".into()))
            .with_claim("P9999", ClaimValue::Literal("dropped".into()));
        let props = item.fact_properties(&PropertyTable::default());
        assert_eq!(props[WD_ITEM_ID], PropertyValue::str("Q1"));
        assert_eq!(props["Stack Exchange tag"], PropertyValue::str("multithreading"));
        assert!(!props.contains_key("instance of"));
        assert!(!props.values().any(|v| v.contains("dropped")));
        assert_eq!(item.neighbour_ids().into_iter().collect::<Vec<_>>(), vec!["Q5"]);
    }

    #[test]
    fn missing_fields_deserialize_empty() {
        let item: Item = serde_json::from_str(r#"{ "id": "Q7" }"#).unwrap();
        assert_eq!(item.name, "");
        assert!(item.is_valid());
    }
}
