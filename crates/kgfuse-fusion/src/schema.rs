//! Label, property and relation names shared by every fusion pass.
//!
//! These strings end up in persisted graphs, so they are part of the on-disk
//! schema: renaming one breaks reconciliation against older snapshots.

// ============================================================================
// Labels
// ============================================================================

pub const LABEL_DOMAIN_TERM: &str = "domain term";
pub const LABEL_OPERATION: &str = "operation";
pub const LABEL_WIKIDATA: &str = "wikidata";

/// Code-element kinds whose identity is their fully qualified name.
pub const QUALIFIED_NAME_LABELS: &[&str] = &[
    "class",
    "package",
    "method",
    "interface",
    "exception class",
    "enum class",
    "error class",
    "annotation class",
    "construct method",
    "primary type",
    "base override method",
    "field of class",
    "enum constants",
];

/// Code-element kinds that need `(qualified_name, short_description)` to be unique.
pub const DESCRIPTION_QUALIFIED_LABELS: &[&str] = &[
    "parameter",
    "return value",
    "exception condition",
    "field",
    "value",
];

// ============================================================================
// Properties
// ============================================================================

pub const TERM_NAME: &str = "term_name";
pub const OPERATION_NAME: &str = "operation_name";
pub const WD_ITEM_ID: &str = "wd_item_id";
pub const WIKIDATA_NAME: &str = "wikidata_name";
pub const ALIAS: &str = "alias";
pub const LEMMA: &str = "lemma";
pub const QUALIFIED_NAME: &str = "qualified_name";
pub const SHORT_DESCRIPTION: &str = "short_description";
pub const DESCRIPTION_EN: &str = "description_en";
pub const ALIAS_EN: &str = "alias_en";
pub const NAME_EN: &str = "name_en";

// ============================================================================
// Relations
// ============================================================================

pub const REL_REPRESENT: &str = "represent";
pub const REL_EXTENDS: &str = "extends";
pub const REL_IS_A: &str = "is a";
pub const REL_HAS_OPERATION: &str = "has operation";
pub const REL_INSTANCE_OF: &str = "instance of";
pub const REL_CAN_BE_OPERATED: &str = "can be operated";
pub const REL_CORRESPONDING_CONCEPT: &str = "corresponding concept";
pub const REL_CORRESPONDING_OPERATION: &str = "corresponding operation";

/// Relation types whose end side names an operation rather than a domain term.
pub const OPERATION_END_RELATIONS: &[&str] =
    &[REL_HAS_OPERATION, REL_INSTANCE_OF, REL_CAN_BE_OPERATED];

/// Relation types dropped before re-targeting; they are re-synthesized from
/// method names instead.
pub const RETARGET_DROPPED_RELATIONS: &[&str] = &[REL_HAS_OPERATION, REL_CAN_BE_OPERATED];

/// Which namespace a relation endpoint resolves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Term,
    Operation,
}

impl Namespace {
    pub fn label(self) -> &'static str {
        match self {
            Namespace::Term => LABEL_DOMAIN_TERM,
            Namespace::Operation => LABEL_OPERATION,
        }
    }

    pub fn primary_property(self) -> &'static str {
        match self {
            Namespace::Term => TERM_NAME,
            Namespace::Operation => OPERATION_NAME,
        }
    }

    /// Namespace for the end side of `rel_type`.
    pub fn end_of(rel_type: &str) -> Self {
        if OPERATION_END_RELATIONS.contains(&rel_type) {
            Namespace::Operation
        } else {
            Namespace::Term
        }
    }
}
