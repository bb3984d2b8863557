//! CoRE link format (`/.well-known/core`) parsing

use std::collections::BTreeMap;

use crate::transport::CoapError;

pub const WELL_KNOWN_CORE: &str = "/.well-known/core";

/// One advertised resource with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub path: String,
    /// Attribute values; flag attributes such as `obs` map to an empty list.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Link {
    pub fn attribute(&self, key: &str) -> Option<&[String]> {
        self.attributes.get(key).map(Vec::as_slice)
    }

    pub fn is_observable(&self) -> bool {
        self.attributes.contains_key("obs")
    }
}

/// Parse a link-format document such as
/// `</temp>;rt="temperature";obs,</light>;if="sensor"`.
pub fn parse(text: &str) -> Result<Vec<Link>, CoapError> {
    split_outside_quotes(text, ',')
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_link)
        .collect()
}

fn parse_link(entry: &str) -> Result<Link, CoapError> {
    let mut parts = split_outside_quotes(entry, ';').into_iter();
    let target = parts.next().unwrap_or_default().trim();
    let path = target
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| CoapError::LinkFormat(format!("bad link target {:?}", target)))?;

    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for attribute in parts.map(str::trim).filter(|a| !a.is_empty()) {
        match attribute.split_once('=') {
            None => {
                attributes.entry(attribute.to_string()).or_default();
            }
            Some((key, value)) => {
                let value = value.trim();
                let unquoted = match value.strip_prefix('"') {
                    Some(rest) => rest
                        .strip_suffix('"')
                        .ok_or_else(|| CoapError::LinkFormat(format!("unterminated value in {:?}", attribute)))?,
                    None => value,
                };
                attributes
                    .entry(key.trim().to_string())
                    .or_default()
                    .extend(unquoted.split_whitespace().map(str::to_string));
            }
        }
    }

    Ok(Link {
        path: format!("/{}", path.trim_start_matches('/')),
        attributes,
    })
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (index, c) in text.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            pieces.push(&text[start..index]);
            start = index + c.len_utf8();
        }
    }
    pieces.push(&text[start..]);
    pieces
}
