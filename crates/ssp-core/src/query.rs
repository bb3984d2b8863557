//! Basic graph pattern queries over the union of cached graphs
//!
//! Supports a SPARQL-style subset:
//!
//! ```text
//! PREFIX ex: <http://example.org/>
//! SELECT ?sensor ?val WHERE { ?sensor a ex:Sensor . ?sensor ex:value ?val } LIMIT 10
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::CacheHandle;
use crate::error::{Result, SspError};
use crate::format::TermReader;
use crate::graph::{Graph, RDF_TYPE, Term};

const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternTerm {
    Variable(String),
    Constant(Term),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl TriplePattern {
    fn terms(&self) -> [&PatternTerm; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

/// One solution: variable name to bound term.
pub type Row = BTreeMap<String, Term>;

/// A parsed SELECT query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Projected variables; empty means `*`.
    pub projection: Vec<String>,
    pub patterns: Vec<TriplePattern>,
    pub limit: Option<usize>,
}

/// Tabular outcome of a query. Derived data, never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults {
    pub variables: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    pub duration: Duration,
}

impl Query {
    pub fn parse(text: &str) -> Result<Query> {
        Parser {
            reader: TermReader::new(text),
            prefixes: HashMap::new(),
        }
        .parse()
        .map_err(SspError::Query)
    }

    /// Result columns, in projection order or order of first appearance for `*`.
    pub fn variables(&self) -> Vec<String> {
        if !self.projection.is_empty() {
            return self.projection.clone();
        }
        let mut variables = Vec::new();
        for pattern in &self.patterns {
            for term in pattern.terms() {
                if let PatternTerm::Variable(name) = term {
                    if !variables.contains(name) {
                        variables.push(name.clone());
                    }
                }
            }
        }
        variables
    }

    /// Evaluate against one graph by nested-loop join over the patterns.
    pub fn evaluate(&self, graph: &Graph) -> Vec<Row> {
        let mut solutions: Vec<HashMap<&str, &Term>> = vec![HashMap::new()];
        for pattern in &self.patterns {
            let mut next = Vec::new();
            for solution in &solutions {
                let bound = |term: &PatternTerm| -> Option<Term> {
                    match term {
                        PatternTerm::Constant(term) => Some(term.clone()),
                        PatternTerm::Variable(name) => {
                            solution.get(name.as_str()).map(|t| (*t).clone())
                        }
                    }
                };
                let (s, p, o) = (
                    bound(&pattern.subject),
                    bound(&pattern.predicate),
                    bound(&pattern.object),
                );
                for triple in graph.matching(s.as_ref(), p.as_ref(), o.as_ref()) {
                    let mut extended = solution.clone();
                    let consistent = [
                        (&pattern.subject, &triple.subject),
                        (&pattern.predicate, &triple.predicate),
                        (&pattern.object, &triple.object),
                    ]
                    .into_iter()
                    .all(|(slot, value)| match slot {
                        PatternTerm::Constant(_) => true,
                        PatternTerm::Variable(name) => {
                            *extended.entry(name.as_str()).or_insert(value) == value
                        }
                    });
                    if consistent {
                        next.push(extended);
                    }
                }
            }
            solutions = next;
            if solutions.is_empty() {
                break;
            }
        }

        let variables = self.variables();
        solutions
            .into_iter()
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|solution| {
                variables
                    .iter()
                    .filter_map(|name| {
                        solution
                            .get(name.as_str())
                            .map(|term| (name.clone(), (*term).clone()))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Parse and run `text` over every live cached graph.
pub async fn execute(cache: &CacheHandle, text: &str) -> Result<QueryResults> {
    let query = Query::parse(text)?;
    let started = Instant::now();
    let union = cache.union_graph().await?;
    let rows = query.evaluate(&union);
    Ok(QueryResults {
        variables: query.variables(),
        rows,
        duration: started.elapsed(),
    })
}

/// All cached triples whose subject is `subject`.
pub async fn describe(cache: &CacheHandle, subject: &str) -> Result<Graph> {
    let subject = Term::iri(subject);
    let union = cache.union_graph().await?;
    Ok(union
        .matching(Some(&subject), None, None)
        .cloned()
        .collect())
}

struct Parser<'a> {
    reader: TermReader<'a>,
    prefixes: HashMap<String, String>,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> std::result::Result<Query, String> {
        loop {
            self.reader.skip_whitespace();
            if !self.keyword("PREFIX") {
                break;
            }
            self.reader.skip_whitespace();
            let prefix = self.name().to_string();
            if !self.reader.eat(':') {
                return Err(self.expected("':' after prefix name"));
            }
            self.reader.skip_whitespace();
            let namespace = self.reader.read_iri_text()?;
            self.prefixes.insert(prefix, namespace);
        }

        if !self.keyword("SELECT") {
            return Err(self.expected("SELECT"));
        }
        let projection = self.projection()?;

        self.reader.skip_whitespace();
        self.keyword("WHERE");
        self.reader.skip_whitespace();
        if !self.reader.eat('{') {
            return Err(self.expected("'{'"));
        }
        let patterns = self.patterns()?;

        self.reader.skip_whitespace();
        let limit = if self.keyword("LIMIT") {
            self.reader.skip_whitespace();
            let digits = self.reader.take_while(|c| c.is_ascii_digit());
            Some(digits.parse::<usize>().map_err(|_| self.expected("a LIMIT count"))?)
        } else {
            None
        };

        self.reader.skip_whitespace();
        if !self.reader.at_end() {
            return Err(format!("unexpected input at column {}", self.reader.column()));
        }

        let query = Query {
            projection,
            patterns,
            limit,
        };
        let known = query_variables(&query.patterns);
        if let Some(unknown) = query.projection.iter().find(|v| !known.contains(v)) {
            return Err(format!("?{} is not used in the pattern", unknown));
        }
        Ok(query)
    }

    fn projection(&mut self) -> std::result::Result<Vec<String>, String> {
        self.reader.skip_whitespace();
        if self.reader.eat('*') {
            return Ok(Vec::new());
        }
        let mut projection = Vec::new();
        while matches!(self.reader.peek(), Some('?' | '$')) {
            projection.push(self.variable()?);
            self.reader.skip_whitespace();
        }
        if projection.is_empty() {
            return Err(self.expected("'*' or a variable"));
        }
        Ok(projection)
    }

    fn patterns(&mut self) -> std::result::Result<Vec<TriplePattern>, String> {
        let mut patterns = Vec::new();
        loop {
            self.reader.skip_whitespace();
            if self.reader.eat('}') {
                break;
            }
            if self.reader.at_end() {
                return Err("unterminated group pattern".to_string());
            }
            let subject = self.pattern_term()?;
            self.reader.skip_whitespace();
            let predicate = self.pattern_term()?;
            self.reader.skip_whitespace();
            let object = self.pattern_term()?;
            patterns.push(TriplePattern {
                subject,
                predicate,
                object,
            });
            self.reader.skip_whitespace();
            self.reader.eat('.');
        }
        if patterns.is_empty() {
            return Err("empty group pattern".to_string());
        }
        Ok(patterns)
    }

    fn pattern_term(&mut self) -> std::result::Result<PatternTerm, String> {
        let term = match self.reader.peek() {
            Some('?' | '$') => return self.variable().map(PatternTerm::Variable),
            Some('<') => self.reader.read_iri()?,
            Some('"') => self.reader.read_literal()?,
            Some('_') => self.reader.read_blank()?,
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.number()?,
            Some(c) if c.is_alphabetic() => {
                let name = self.name();
                if name == "a" && self.reader.peek() != Some(':') {
                    Term::iri(RDF_TYPE)
                } else {
                    let prefix = name.to_string();
                    if !self.reader.eat(':') {
                        return Err(self.expected("a prefixed name"));
                    }
                    let local = self.name();
                    let namespace = self
                        .prefixes
                        .get(&prefix)
                        .ok_or_else(|| format!("undeclared prefix {}:", prefix))?;
                    Term::iri(format!("{}{}", namespace, local))
                }
            }
            _ => return Err(self.expected("a term")),
        };
        Ok(PatternTerm::Constant(term))
    }

    fn variable(&mut self) -> std::result::Result<String, String> {
        self.reader.bump();
        let name = self.name();
        if name.is_empty() {
            return Err(self.expected("a variable name"));
        }
        Ok(name.to_string())
    }

    fn number(&mut self) -> std::result::Result<Term, String> {
        let text = self
            .reader
            .take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
        let text = text.trim_end_matches('.');
        if text.parse::<i64>().is_ok() {
            Ok(Term::typed(text, XSD_INTEGER))
        } else if text.parse::<f64>().is_ok() {
            Ok(Term::typed(text, XSD_DECIMAL))
        } else {
            Err(format!("invalid number {:?}", text))
        }
    }

    fn name(&mut self) -> &'a str {
        self.reader
            .take_while(|c| c.is_alphanumeric() || c == '_' || c == '-')
    }

    /// Consume `word` (case-insensitive) if it is next in the input.
    fn keyword(&mut self, word: &str) -> bool {
        let rest = self.reader.rest();
        let matches = rest
            .get(..word.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(word))
            && !rest[word.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if matches {
            for _ in 0..word.len() {
                self.reader.bump();
            }
        }
        matches
    }

    fn expected(&self, what: &str) -> String {
        format!("expected {} at column {}", what, self.reader.column())
    }
}

fn query_variables(patterns: &[TriplePattern]) -> Vec<&String> {
    patterns
        .iter()
        .flat_map(|pattern| pattern.terms())
        .filter_map(|term| match term {
            PatternTerm::Variable(name) => Some(name),
            PatternTerm::Constant(_) => None,
        })
        .collect()
}
