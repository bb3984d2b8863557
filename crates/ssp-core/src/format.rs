//! Wire formats for graph content and content negotiation

use std::path::Path;

use rio_api::model as rio;
use rio_api::parser::TriplesParser;
use rio_turtle::{TurtleError, TurtleParser};

use crate::error::SspError;
use crate::graph::{Graph, Term, Triple};

/// Serialisations the gateway can produce and consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    NTriples,
    Turtle,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::NTriples, Format::Turtle, Format::Json];

    pub fn media_type(&self) -> &'static str {
        match self {
            Format::NTriples => "application/n-triples",
            Format::Turtle => "text/turtle",
            Format::Json => "application/json",
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "application/n-triples" | "text/plain" | "*/*" | "application/*" | "text/*" => {
                Some(Format::NTriples)
            }
            "text/turtle" | "application/x-turtle" => Some(Format::Turtle),
            "application/json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Pick the format for an `Accept` header. A missing header means N-Triples;
    /// `None` means nothing acceptable is supported.
    pub fn negotiate(accept: Option<&str>) -> Option<Self> {
        let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
            return Some(Format::NTriples);
        };

        let mut ranges: Vec<(f32, usize, &str)> = accept
            .split(',')
            .enumerate()
            .map(|(position, range)| {
                let mut parts = range.split(';');
                let media_type = parts.next().unwrap_or_default().trim();
                let quality = parts
                    .filter_map(|param| param.trim().strip_prefix("q="))
                    .find_map(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                (quality, position, media_type)
            })
            .filter(|(quality, _, _)| *quality > 0.0)
            .collect();

        ranges.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        ranges
            .into_iter()
            .find_map(|(_, _, media_type)| Format::from_media_type(media_type))
    }

    /// Detect the format of a local file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("nt") => Some(Format::NTriples),
            Some("ttl") => Some(Format::Turtle),
            Some("json") => Some(Format::Json),
            _ => None,
        }
    }

    pub fn serialize(&self, graph: &Graph) -> Result<String, SspError> {
        match self {
            // Every N-Triples document is also a Turtle document.
            Format::NTriples | Format::Turtle => {
                let mut out = String::new();
                for triple in graph {
                    out.push_str(&triple.to_string());
                    out.push('\n');
                }
                Ok(out)
            }
            Format::Json => {
                serde_json::to_string_pretty(graph).map_err(|e| SspError::Format(e.to_string()))
            }
        }
    }

    pub fn parse(&self, text: &str) -> Result<Graph, SspError> {
        match self {
            Format::NTriples => parse_ntriples(text),
            Format::Turtle => parse_turtle(text),
            Format::Json => serde_json::from_str(text).map_err(|e| SspError::Format(e.to_string())),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.media_type())
    }
}

/// Parse a Turtle document. Relative IRIs are rejected since there is no base.
pub fn parse_turtle(text: &str) -> Result<Graph, SspError> {
    let mut graph = Graph::new();
    TurtleParser::new(text.as_bytes(), None)
        .parse_all(&mut |triple| -> Result<(), TurtleError> {
            graph.add(from_rio(&triple));
            Ok(())
        })
        .map_err(|e| SspError::Format(format!("turtle: {}", e)))?;
    Ok(graph)
}

fn from_rio(triple: &rio::Triple<'_>) -> Triple {
    let subject = match triple.subject {
        rio::Subject::NamedNode(node) => Term::iri(node.iri),
        rio::Subject::BlankNode(node) => Term::blank(node.id),
        // Quoted triples only occur with RDF-star, which Turtle 1.1 lacks.
        _ => Term::blank(triple.subject.to_string()),
    };
    let object = match triple.object {
        rio::Term::NamedNode(node) => Term::iri(node.iri),
        rio::Term::BlankNode(node) => Term::blank(node.id),
        rio::Term::Literal(rio::Literal::Simple { value }) => Term::literal(value),
        rio::Term::Literal(rio::Literal::LanguageTaggedString { value, language }) => {
            Term::lang_literal(value, language)
        }
        rio::Term::Literal(rio::Literal::Typed { value, datatype }) => Term::typed(value, datatype.iri),
        _ => Term::literal(triple.object.to_string()),
    };
    Triple::new(subject, Term::iri(triple.predicate.iri), object)
}

/// Parse an N-Triples document.
pub fn parse_ntriples(text: &str) -> Result<Graph, SspError> {
    let mut graph = Graph::new();
    for (index, line) in text.lines().enumerate() {
        let mut reader = TermReader::new(line);
        reader.skip_whitespace();
        if reader.at_end() || reader.peek() == Some('#') {
            continue;
        }
        let triple = read_statement(&mut reader)
            .map_err(|e| SspError::Format(format!("line {}: {}", index + 1, e)))?;
        graph.add(triple);
    }
    Ok(graph)
}

fn read_statement(reader: &mut TermReader<'_>) -> Result<Triple, String> {
    let subject = match reader.peek() {
        Some('<') => reader.read_iri()?,
        Some('_') => reader.read_blank()?,
        _ => return Err(format!("expected subject at column {}", reader.column())),
    };
    reader.skip_whitespace();
    let predicate = reader.read_iri()?;
    reader.skip_whitespace();
    let object = match reader.peek() {
        Some('<') => reader.read_iri()?,
        Some('_') => reader.read_blank()?,
        Some('"') => reader.read_literal()?,
        _ => return Err(format!("expected object at column {}", reader.column())),
    };
    reader.skip_whitespace();
    if !reader.eat('.') {
        return Err(format!("expected '.' at column {}", reader.column()));
    }
    reader.skip_whitespace();
    if !reader.at_end() && reader.peek() != Some('#') {
        return Err(format!("trailing content at column {}", reader.column()));
    }
    Ok(Triple::new(subject, predicate, object))
}

/// Cursor over one line of term syntax, shared with the query parser.
pub(crate) struct TermReader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TermReader<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        TermReader { input, pos: 0 }
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub(crate) fn column(&self) -> usize {
        self.pos + 1
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    pub(crate) fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub(crate) fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Consume characters while `accept` holds and return them.
    pub(crate) fn take_while(&mut self, accept: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    pub(crate) fn read_iri_text(&mut self) -> Result<String, String> {
        if !self.eat('<') {
            return Err(format!("expected '<' at column {}", self.column()));
        }
        let value = self.take_while(|c| c != '>' && !c.is_whitespace()).to_string();
        if !self.eat('>') {
            return Err(format!("unterminated IRI at column {}", self.column()));
        }
        if value.is_empty() {
            return Err("empty IRI".to_string());
        }
        Ok(value)
    }

    pub(crate) fn read_iri(&mut self) -> Result<Term, String> {
        self.read_iri_text().map(Term::iri)
    }

    pub(crate) fn read_blank(&mut self) -> Result<Term, String> {
        if !(self.eat('_') && self.eat(':')) {
            return Err(format!("expected blank node at column {}", self.column()));
        }
        let label = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '-');
        if label.is_empty() {
            return Err(format!("empty blank node label at column {}", self.column()));
        }
        Ok(Term::blank(label))
    }

    pub(crate) fn read_literal(&mut self) -> Result<Term, String> {
        if !self.eat('"') {
            return Err(format!("expected '\"' at column {}", self.column()));
        }
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated literal".to_string()),
                Some('"') => break,
                Some('\\') => value.push(self.read_escape()?),
                Some(ch) => value.push(ch),
            }
        }

        if self.eat('@') {
            let lang = self.take_while(|c| c.is_ascii_alphanumeric() || c == '-');
            if lang.is_empty() {
                return Err(format!("empty language tag at column {}", self.column()));
            }
            Ok(Term::lang_literal(value, lang))
        } else if self.rest().starts_with("^^") {
            self.pos += 2;
            let datatype = self.read_iri_text()?;
            Ok(Term::typed(value, datatype))
        } else {
            Ok(Term::literal(value))
        }
    }

    fn read_escape(&mut self) -> Result<char, String> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('b') => Ok('\u{8}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.read_code_point(4),
            Some('U') => self.read_code_point(8),
            other => Err(format!("invalid escape {:?}", other)),
        }
    }

    fn read_code_point(&mut self, digits: usize) -> Result<char, String> {
        let end = self.pos + digits;
        let hex = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| "truncated unicode escape".to_string())?;
        let code = u32::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| format!("invalid code point {:X}", code))
    }
}
