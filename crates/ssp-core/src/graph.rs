//! Graph content: an ordered set of subject/predicate/object triples

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// A node or edge label in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Term {
    Iri {
        value: String,
    },
    Blank {
        value: String,
    },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    pub fn blank(value: impl Into<String>) -> Self {
        Term::Blank {
            value: value.into(),
        }
    }

    /// Plain literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            lang: None,
        }
    }

    pub fn lang_literal(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            lang: Some(lang.into()),
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }

    /// IRI text, blank label or literal lexical form.
    pub fn value(&self) -> &str {
        match self {
            Term::Iri { value } | Term::Blank { value } | Term::Literal { value, .. } => value,
        }
    }
}

impl std::fmt::Display for Term {
    /// N-Triples rendering of the term.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Iri { value } => write!(f, "<{}>", value),
            Term::Blank { value } => write!(f, "_:{}", value),
            Term::Literal {
                value,
                datatype,
                lang,
            } => {
                f.write_str("\"")?;
                for ch in value.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        other => write!(f, "{}", other)?,
                    }
                }
                f.write_str("\"")?;
                if let Some(lang) = lang {
                    write!(f, "@{}", lang)
                } else if let Some(datatype) = datatype.as_deref().filter(|dt| *dt != XSD_STRING) {
                    write!(f, "^^<{}>", datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Triple {
            subject,
            predicate,
            object,
        }
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Structured content of one resource. Opaque to the cache engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            triples: BTreeSet::new(),
        }
    }

    /// Add a triple. Returns false if it was already present.
    pub fn insert(&mut self, subject: Term, predicate: Term, object: Term) -> bool {
        self.triples.insert(Triple::new(subject, predicate, object))
    }

    pub fn add(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    /// Total number of triples.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Iterate over all triples in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Add every triple of `other`.
    pub fn merge(&mut self, other: &Graph) {
        self.triples.extend(other.triples.iter().cloned());
    }

    /// Add every triple of `other` with its blank nodes relabelled under
    /// `scope`, keeping them apart from blank nodes of other graphs.
    pub fn merge_scoped(&mut self, other: &Graph, scope: &str) {
        let relabel = |term: &Term| match term {
            Term::Blank { value } => Term::blank(format!("{}_{}", scope, value)),
            term => term.clone(),
        };
        self.triples.extend(
            other
                .triples
                .iter()
                .map(|t| Triple::new(relabel(&t.subject), relabel(&t.predicate), relabel(&t.object))),
        );
    }

    /// Triples matching the given pattern; `None` matches anything.
    pub fn matching<'a, 'b>(
        &'a self,
        subject: Option<&'b Term>,
        predicate: Option<&'b Term>,
        object: Option<&'b Term>,
    ) -> impl Iterator<Item = &'a Triple> + use<'a, 'b> {
        self.triples.iter().filter(move |t| {
            subject.is_none_or(|s| &t.subject == s)
                && predicate.is_none_or(|p| &t.predicate == p)
                && object.is_none_or(|o| &t.object == o)
        })
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Graph {
            triples: iter.into_iter().collect(),
        }
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.triples.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::collections::btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_escaping() {
        let term = Term::literal("say \"hi\"\n");
        assert_eq!(term.to_string(), r#""say \"hi\"\n""#);
    }

    #[test]
    fn test_xsd_string_is_implicit() {
        let term = Term::typed("x", XSD_STRING);
        assert_eq!(term.to_string(), "\"x\"");
        let term = Term::typed("21.5", "http://www.w3.org/2001/XMLSchema#double");
        assert_eq!(term.to_string(), "\"21.5\"^^<http://www.w3.org/2001/XMLSchema#double>");
    }

    #[test]
    fn test_matching() {
        let mut graph = Graph::new();
        let s = Term::iri("http://example.org/s");
        graph.insert(s.clone(), Term::iri(RDF_TYPE), Term::iri("http://example.org/Sensor"));
        graph.insert(s.clone(), Term::iri("http://example.org/value"), Term::literal("1"));
        graph.insert(Term::iri("http://example.org/t"), Term::iri(RDF_TYPE), Term::iri("http://example.org/Sensor"));

        assert_eq!(graph.matching(Some(&s), None, None).count(), 2);
        let rdf_type = Term::iri(RDF_TYPE);
        assert_eq!(graph.matching(None, Some(&rdf_type), None).count(), 2);
        assert!(!graph.insert(s, Term::iri(RDF_TYPE), Term::iri("http://example.org/Sensor")));
    }

    #[test]
    fn test_matches_outlive_the_pattern_terms() {
        let mut graph = Graph::new();
        graph.insert(Term::iri("urn:a"), Term::iri("urn:p"), Term::literal("1"));
        graph.insert(Term::iri("urn:b"), Term::iri("urn:p"), Term::literal("2"));

        let mut found: Vec<&Triple> = Vec::new();
        for subject in ["urn:a", "urn:b"] {
            let pattern = Term::iri(subject);
            found.extend(graph.matching(Some(&pattern), None, None));
        }
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].object, Term::literal("2"));
    }
}
