//! Metadir configuration.
//!
//! Loaded from `_mmmeta/config.yml`:
//!
//! ```yaml
//! metadata:
//!   unique: content_hash
//!   file_name: _file_name
//!   required: [foreign_id]
//!   dedup:
//!     unique: foreign_id
//!     max: published_at
//!   include: [title, publisher:name]
//! public:
//!   url: https://my_bucket.s3.eu-central-1.amazonaws.com/foo/{_file_name}
//! ```
//!
//! A missing or empty file yields [`Config::default`].

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Default unique key.
pub const DEFAULT_UNIQUE: &str = "content_hash";

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    public: Option<BTreeMap<String, String>>,
    #[serde(default)]
    remote: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    unique: Option<String>,
    file_name: Option<String>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    dedup: BTreeMap<String, String>,
}

/// Configuration for a metadir; read-only within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Field identifying a record across stores and the log.
    pub unique: String,

    /// Field naming the artifact file, relative to the files root.
    pub file_name: String,

    /// Additional required fields.
    pub required: Vec<String>,

    /// Deduplication settings; every value is a required field.
    pub dedup: BTreeMap<String, String>,

    /// Optional fields kept in the meta store.
    pub include: Vec<String>,

    /// Output-URL templates, `{field}` placeholders.
    pub public: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unique: DEFAULT_UNIQUE.to_string(),
            file_name: DEFAULT_UNIQUE.to_string(),
            required: Vec::new(),
            dedup: BTreeMap::new(),
            include: Vec::new(),
            public: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed YAML.
    pub fn from_yaml(text: &str) -> CoreResult<Self> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| CoreError::config(e.to_string()))?;
        if !doc.is_mapping() {
            return Ok(Self::default());
        }
        let raw: RawConfig =
            serde_yaml::from_value(doc).map_err(|e| CoreError::config(e.to_string()))?;

        let meta = raw.metadata.unwrap_or_default();
        let unique = meta.unique.unwrap_or_else(|| DEFAULT_UNIQUE.to_string());
        let file_name = meta.file_name.unwrap_or_else(|| unique.clone());
        let mut public = raw.remote.unwrap_or_default();
        public.extend(raw.public.unwrap_or_default());

        Ok(Self {
            unique,
            file_name,
            required: meta.required,
            dedup: meta.dedup,
            include: meta.include,
            public,
        })
    }

    /// Sets the unique key. The file-name key follows it unless set later.
    #[must_use]
    pub fn unique(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if self.file_name == self.unique {
            self.file_name = key.clone();
        }
        self.unique = key;
        self
    }

    /// Sets the file-name key.
    #[must_use]
    pub fn file_name(mut self, key: impl Into<String>) -> Self {
        self.file_name = key.into();
        self
    }

    /// Adds required keys.
    #[must_use]
    pub fn required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds included keys.
    #[must_use]
    pub fn include<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds an output-URL template.
    #[must_use]
    pub fn public(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.public.insert(name.into(), template.into());
        self
    }

    /// Unique key, file-name key, required keys and dedup keys.
    pub fn required_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        keys.insert(self.unique.clone());
        keys.insert(self.file_name.clone());
        keys.extend(self.required.iter().cloned());
        keys.extend(self.dedup.values().cloned());
        keys
    }

    /// Required keys plus included keys.
    pub fn keys(&self) -> BTreeSet<String> {
        let mut keys = self.required_keys();
        keys.extend(self.include.iter().cloned());
        keys
    }

    /// True when meta rows are restricted to [`Config::keys`].
    pub fn restricts_fields(&self) -> bool {
        !self.include.is_empty()
    }

    /// Renders every output-URL template against `record`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Template`] if a placeholder names a field the
    /// record lacks.
    pub fn public_urls(&self, record: &Record) -> CoreResult<BTreeMap<String, String>> {
        self.public
            .iter()
            .map(|(name, template)| Ok((name.clone(), render(template, record)?)))
            .collect()
    }
}

fn render(template: &str, record: &Record) -> CoreResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let field = &after[..end];
        let value = record
            .get(field)
            .filter(|v| !v.is_null())
            .ok_or_else(|| CoreError::Template {
                template: template.to_string(),
                field: field.to_string(),
            })?;
        out.push_str(&value.canonical());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
