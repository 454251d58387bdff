//! Band selection: typed selectors built at the configuration boundary and the
//! matching rules applied to source bands.
//!
//! A single selector is conjunctive (every field it carries must match), a list of
//! selectors is disjunctive (any selector may match), and no list at all selects
//! every band.
use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::BandInfo;

/// Expected value of a description or metadata field
#[derive(Clone, Debug)]
pub enum MatchValue {
    Literal(String),
    Pattern(Regex),
}

impl MatchValue {
    /// Converts a boundary string: `/.../` becomes a compiled pattern, anything else a literal.
    pub fn parse(s: &str) -> std::result::Result<Self, regex::Error> {
        match s.strip_prefix('/').and_then(|rest| rest.strip_suffix('/')) {
            Some(pattern) => Ok(MatchValue::Pattern(Regex::new(pattern)?)),
            None => Ok(MatchValue::Literal(s.to_string())),
        }
    }

    /// Description semantics: literals match as substrings.
    pub fn is_found_in(&self, text: &str) -> bool {
        match self {
            MatchValue::Literal(s) => text.contains(s.as_str()),
            MatchValue::Pattern(re) => re.is_match(text),
        }
    }

    /// Metadata semantics: literals must equal the value.
    pub fn matches_value(&self, text: &str) -> bool {
        match self {
            MatchValue::Literal(s) => text == s,
            MatchValue::Pattern(re) => re.is_match(text),
        }
    }
}

impl PartialEq for MatchValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MatchValue::Literal(a), MatchValue::Literal(b)) => a == b,
            (MatchValue::Pattern(a), MatchValue::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for MatchValue {
    fn from(s: &str) -> Self {
        MatchValue::Literal(s.to_string())
    }
}

impl From<Regex> for MatchValue {
    fn from(re: Regex) -> Self {
        MatchValue::Pattern(re)
    }
}

impl fmt::Display for MatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchValue::Literal(s) => write!(f, "{:?}", s),
            MatchValue::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Declarative band predicate; all present fields must match
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BandSelector {
    pub id: Option<usize>,
    pub description: Option<MatchValue>,
    pub metadata: BTreeMap<String, MatchValue>,
}

impl BandSelector {
    pub fn by_id(id: usize) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_description<V: Into<MatchValue>>(value: V) -> Self {
        Self {
            description: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata<K: Into<String>, V: Into<MatchValue>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, band: &BandInfo) -> bool {
        if self.id.is_some_and(|id| id != band.id) {
            return false;
        }
        if let Some(description) = &self.description {
            if !description.is_found_in(&band.description) {
                return false;
            }
        }
        self.metadata.iter().all(|(key, expected)| {
            band.metadata
                .get(key)
                .is_some_and(|actual| expected.matches_value(actual))
        })
    }

    /// Parses one `-b` item: an integer selects by id, `/.../` by description
    /// pattern, anything else by description substring.
    pub fn from_token(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::selector("\"\"", "empty band selector"));
        }
        if let Ok(id) = token.parse::<i64>() {
            return positive_id(id, token).map(Self::by_id);
        }
        let value = MatchValue::parse(token).map_err(|e| Error::selector(token, e))?;
        Ok(Self::by_description(value))
    }

    /// Parses a comma-separated `-b` argument
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',').map(Self::from_token).collect()
    }

    /// Builds a selector from one entry of a JSON `bands` array. String values of
    /// the shape `/.../` become patterns.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::selector(value, "selector must be an object"))?;
        let mut selector = Self::default();
        for (key, field) in object {
            match key.as_str() {
                "id" => {
                    let id = field
                        .as_i64()
                        .ok_or_else(|| Error::selector(value, "`id` must be an integer"))?;
                    selector.id = Some(positive_id(id, value)?);
                }
                "description" => {
                    selector.description = Some(json_match_value(field, value, "description")?);
                }
                "metaData" => {
                    let entries = field
                        .as_object()
                        .ok_or_else(|| Error::selector(value, "`metaData` must be an object"))?;
                    for (md_key, md_value) in entries {
                        selector
                            .metadata
                            .insert(md_key.clone(), json_match_value(md_value, value, md_key)?);
                    }
                }
                other => {
                    return Err(Error::selector(value, format!("unknown field `{}`", other)));
                }
            }
        }
        Ok(selector)
    }
}

fn positive_id<S: fmt::Display>(id: i64, selector: S) -> Result<usize> {
    if id < 1 {
        return Err(Error::selector(selector, "band ids start at 1"));
    }
    Ok(id as usize)
}

fn json_match_value(field: &Value, selector: &Value, name: &str) -> Result<MatchValue> {
    let s = field
        .as_str()
        .ok_or_else(|| Error::selector(selector, format!("`{}` must be a string", name)))?;
    MatchValue::parse(s).map_err(|e| Error::selector(selector, e))
}

impl fmt::Display for BandSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = self.id {
            parts.push(format!("id: {}", id));
        }
        if let Some(description) = &self.description {
            parts.push(format!("description: {}", description));
        }
        if !self.metadata.is_empty() {
            let md = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("metaData: {{{}}}", md));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// True if no selectors were given or any of them matches the band
pub fn matches_any(selectors: Option<&[BandSelector]>, band: &BandInfo) -> bool {
    match selectors {
        None => true,
        Some(selectors) => selectors.iter().any(|s| s.matches(band)),
    }
}

/// Filters bands in source order. An empty result is returned as is; callers
/// decide how to report it.
pub fn select_bands(selectors: Option<&[BandSelector]>, bands: &[BandInfo]) -> Vec<BandInfo> {
    bands
        .iter()
        .filter(|band| matches_any(selectors, band))
        .cloned()
        .collect()
}
