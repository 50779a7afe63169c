//! Identifier canonicalisation and the cross-source reference bag
//!
//! All identifiers are stored in a canonical short form: the well-known URL
//! prefixes (OpenAlex, DOI, ORCID, Wikidata, ROR) are stripped once at the
//! cache write boundary. Everything downstream assumes bare IDs.

use serde::{Deserialize, Serialize};

/// URL prefixes stripped from incoming identifiers.
const URL_PREFIXES: [&str; 5] = [
    "https://openalex.org/",
    "https://doi.org/",
    "https://orcid.org/",
    "https://www.wikidata.org/wiki/",
    "https://ror.org/",
];

/// Strip a known identifier URL prefix, if present.
///
/// `https://openalex.org/W123` → `W123`, bare IDs pass through unchanged.
pub fn strip_url(id: &str) -> &str {
    for prefix in URL_PREFIXES {
        if let Some(rest) = id.strip_prefix(prefix) {
            return rest;
        }
    }
    id
}

/// Like [`strip_url`], for optional owned identifiers.
pub fn strip_url_opt(id: Option<String>) -> Option<String> {
    id.map(|v| strip_url(&v).to_string())
}

/// A bag of optional identifiers used to look up one work across sources.
///
/// At least one identifier must be present for the reference to be usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub openalex_id: Option<String>,
    pub doi: Option<String>,
    pub pubmed_id: Option<String>,
    pub s2_id: Option<String>,
    pub scopus_id: Option<String>,
    pub wos_id: Option<String>,
    pub dimensions_id: Option<String>,
    pub nacsos_id: Option<String>,
}

/// Field names of [`Reference`], in storage order.
pub const ID_FIELDS: [&str; 8] = [
    "openalex_id",
    "doi",
    "pubmed_id",
    "s2_id",
    "scopus_id",
    "wos_id",
    "dimensions_id",
    "nacsos_id",
];

impl Reference {
    /// Iterate `(field, value)` pairs for all identifiers that are set.
    pub fn ids(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("openalex_id", self.openalex_id.as_deref()),
            ("doi", self.doi.as_deref()),
            ("pubmed_id", self.pubmed_id.as_deref()),
            ("s2_id", self.s2_id.as_deref()),
            ("scopus_id", self.scopus_id.as_deref()),
            ("wos_id", self.wos_id.as_deref()),
            ("dimensions_id", self.dimensions_id.as_deref()),
            ("nacsos_id", self.nacsos_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
    }

    /// Get an identifier by field name.
    pub fn get(&self, field: &str) -> Option<&str> {
        match field {
            "openalex_id" => self.openalex_id.as_deref(),
            "doi" => self.doi.as_deref(),
            "pubmed_id" => self.pubmed_id.as_deref(),
            "s2_id" => self.s2_id.as_deref(),
            "scopus_id" => self.scopus_id.as_deref(),
            "wos_id" => self.wos_id.as_deref(),
            "dimensions_id" => self.dimensions_id.as_deref(),
            "nacsos_id" => self.nacsos_id.as_deref(),
            _ => None,
        }
    }

    /// Set an identifier by field name. Unknown fields are ignored.
    pub fn set(&mut self, field: &str, value: String) {
        let slot = match field {
            "openalex_id" => &mut self.openalex_id,
            "doi" => &mut self.doi,
            "pubmed_id" => &mut self.pubmed_id,
            "s2_id" => &mut self.s2_id,
            "scopus_id" => &mut self.scopus_id,
            "wos_id" => &mut self.wos_id,
            "dimensions_id" => &mut self.dimensions_id,
            "nacsos_id" => &mut self.nacsos_id,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Number of identifiers that are set.
    pub fn id_count(&self) -> usize {
        self.ids().count()
    }

    /// True when no identifier is set.
    pub fn is_empty(&self) -> bool {
        self.ids().next().is_none()
    }

    /// True when this reference shares at least one identifier value with
    /// `other` in the same field.
    pub fn matches(&self, other: &Reference) -> bool {
        self.ids()
            .any(|(field, value)| other.get(field) == Some(value))
    }

    /// Canonicalise all identifiers in place (strip URL prefixes).
    pub fn canonicalise(&mut self) {
        for field in ID_FIELDS {
            if let Some(value) = self.get(field) {
                let stripped = strip_url(value);
                if stripped.len() != value.len() {
                    let stripped = stripped.to_string();
                    self.set(field, stripped);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_openalex_prefix() {
        assert_eq!(strip_url("https://openalex.org/W123"), "W123");
    }

    #[test]
    fn strip_doi_prefix() {
        assert_eq!(strip_url("https://doi.org/10.1/x"), "10.1/x");
    }

    #[test]
    fn strip_ror_prefix() {
        assert_eq!(strip_url("https://ror.org/02jx3x895"), "02jx3x895");
    }

    #[test]
    fn bare_id_unchanged() {
        assert_eq!(strip_url("W123"), "W123");
        assert_eq!(strip_url("10.1/x"), "10.1/x");
    }

    #[test]
    fn unknown_url_unchanged() {
        assert_eq!(strip_url("https://example.org/W123"), "https://example.org/W123");
    }

    #[test]
    fn ids_iterates_set_fields() {
        let reference = Reference {
            openalex_id: Some("W1".into()),
            doi: Some("10.1/x".into()),
            ..Default::default()
        };
        let ids: Vec<_> = reference.ids().collect();
        assert_eq!(ids, vec![("openalex_id", "W1"), ("doi", "10.1/x")]);
    }

    #[test]
    fn get_set_roundtrip() {
        let mut reference = Reference::default();
        reference.set("scopus_id", "2-s2.0-1".into());
        assert_eq!(reference.get("scopus_id"), Some("2-s2.0-1"));
        assert_eq!(reference.get("wos_id"), None);
        assert_eq!(reference.id_count(), 1);
    }

    #[test]
    fn matches_on_any_shared_id() {
        let a = Reference {
            openalex_id: Some("W1".into()),
            doi: Some("10.1/x".into()),
            ..Default::default()
        };
        let b = Reference {
            doi: Some("10.1/x".into()),
            ..Default::default()
        };
        let c = Reference {
            doi: Some("10.1/y".into()),
            ..Default::default()
        };
        assert!(a.matches(&b));
        assert!(b.matches(&a));
        assert!(!a.matches(&c));
    }

    #[test]
    fn matches_requires_same_field() {
        // Same value in a different field is not a match
        let a = Reference {
            pubmed_id: Some("123".into()),
            ..Default::default()
        };
        let b = Reference {
            s2_id: Some("123".into()),
            ..Default::default()
        };
        assert!(!a.matches(&b));
    }

    #[test]
    fn canonicalise_strips_all() {
        let mut reference = Reference {
            openalex_id: Some("https://openalex.org/W9".into()),
            doi: Some("https://doi.org/10.2/z".into()),
            pubmed_id: Some("42".into()),
            ..Default::default()
        };
        reference.canonicalise();
        assert_eq!(reference.openalex_id.as_deref(), Some("W9"));
        assert_eq!(reference.doi.as_deref(), Some("10.2/z"));
        assert_eq!(reference.pubmed_id.as_deref(), Some("42"));
    }

    #[test]
    fn empty_reference() {
        assert!(Reference::default().is_empty());
    }
}
