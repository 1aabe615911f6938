//! # Cache Key Generator
//!
//! Cache keys are shared with any other process reading the same store, so
//! their formats are fixed:
//!
//! | Resource        | Key                                                  |
//! |-----------------|------------------------------------------------------|
//! | chapter listing | `chapters:release/11/<release>/mms`                  |
//! | node by URL     | `node:<full url>`                                    |
//! | search          | `search:<release>:<k1>=<v1>&<k2>=<v2>...` (keys sorted) |
//!
//! Search parameters are normalized before the key is built: keys are sorted
//! ascending and boolean values are rendered as lowercase `true`/`false`,
//! so the same search expressed in a different parameter order or with
//! `True`/`TRUE` collapses to one key.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded;

/// Prefix of chapter listing keys
pub const CHAPTERS_PREFIX: &str = "chapters:";

/// Prefix of node-by-URL keys
pub const NODE_PREFIX: &str = "node:";

/// Prefix of search result keys
pub const SEARCH_PREFIX: &str = "search:";

/// All key prefixes, in the order they are reported by cache introspection
pub const KEY_PREFIXES: [&str; 3] = [CHAPTERS_PREFIX, NODE_PREFIX, SEARCH_PREFIX];

/// Endpoint path of a release's linearization, relative to the API base URL
pub fn release_endpoint(release_id: &str) -> String {
    format!("release/11/{}/mms", release_id)
}

/// Key of a release's chapter listing
pub fn chapters_key(release_id: &str) -> String {
    format!("{}{}", CHAPTERS_PREFIX, release_endpoint(release_id))
}

/// Key of a node addressed by its full URL
pub fn node_key(url: &str) -> String {
    format!("{}{}", NODE_PREFIX, url)
}

/// Key of a search within a release
pub fn search_key(release_id: &str, params: &SearchParams) -> String {
    format!("{}{}:{}", SEARCH_PREFIX, release_id, params)
}

/// A single search parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Flag(bool),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("true"),
            Self::Flag(false) => f.write_str("false"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Parse boolean text in any letter case
pub fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

struct FlagVisitor;

impl<'de> Visitor<'de> for FlagVisitor {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean or `true`/`false` in any case")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
        Ok(value)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
        parse_flag(value).ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

/// Deserialize a flag from a boolean or from boolean text in any case
///
/// Query strings only ever carry text, so `True` and `TRUE` must map to the
/// same flag as `true`.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    deserializer.deserialize_any(FlagVisitor)
}

/// Normalized, ordered set of search parameters
///
/// Display renders the canonical `k=v&k=v` form used in search keys. Text
/// values are form-encoded there, so a `&` or `=` inside a value cannot be
/// mistaken for a separator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    params: BTreeMap<String, ParamValue>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a boolean flag
    pub fn flag<K: Into<String>>(mut self, key: K, value: bool) -> Self {
        self.params.insert(key.into(), ParamValue::Flag(value));
        self
    }

    /// Insert a text value; boolean text in any case is normalized to a flag
    pub fn text<K: Into<String>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
        let value = value.as_ref();
        let normalized = match parse_flag(value) {
            Some(flag) => ParamValue::Flag(flag),
            None => ParamValue::Text(value.to_string()),
        };
        self.params.insert(key.into(), normalized);
        self
    }

    /// Parameters as owned pairs, in key order, for the upstream query string
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str("&")?;
            }
            match value {
                ParamValue::Text(text) => {
                    write!(f, "{}=", key)?;
                    for chunk in form_urlencoded::byte_serialize(text.as_bytes()) {
                        f.write_str(chunk)?;
                    }
                }
                ParamValue::Flag(_) => write!(f, "{}={}", key, value)?,
            }
        }
        Ok(())
    }
}

/// Search request as accepted on the inbound surface
///
/// Field names follow the taxonomy API's query parameter names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQuery {
    pub q: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub use_flexisearch: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub flat_results: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub highlighting_enabled: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub include_keyword_result: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub medical_coding_mode: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub subtree_filter_uses_foundation_descendants: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties_to_be_searched: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            q: String::new(),
            use_flexisearch: false,
            flat_results: true,
            highlighting_enabled: true,
            include_keyword_result: false,
            medical_coding_mode: true,
            subtree_filter_uses_foundation_descendants: false,
            chapter_filter: None,
            properties_to_be_searched: None,
        }
    }
}

impl SearchQuery {
    pub fn new<S: Into<String>>(q: S) -> Self {
        Self {
            q: q.into(),
            ..Default::default()
        }
    }

    /// Every parameter, flags included, in normalized form
    pub fn to_params(&self) -> SearchParams {
        let mut params = SearchParams::new()
            .text("q", &self.q)
            .flag("useFlexisearch", self.use_flexisearch)
            .flag("flatResults", self.flat_results)
            .flag("highlightingEnabled", self.highlighting_enabled)
            .flag("includeKeywordResult", self.include_keyword_result)
            .flag("medicalCodingMode", self.medical_coding_mode)
            .flag(
                "subtreeFilterUsesFoundationDescendants",
                self.subtree_filter_uses_foundation_descendants,
            );

        if let Some(filter) = &self.chapter_filter {
            params = params.text("chapterFilter", filter);
        }
        if let Some(properties) = &self.properties_to_be_searched {
            params = params.text("propertiesToBeSearched", properties);
        }

        params
    }
}
