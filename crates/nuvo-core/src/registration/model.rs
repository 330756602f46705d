//! Registration documents as published by a source.
//!
//! Root index:
//! ```json
//! { "count": 2, "items": [ <page>, <page> ] }
//! ```
//! A page is either inlined (`items` present, `@id` optional) or a pointer
//! to a document holding the items:
//! ```json
//! { "@id": "https://x/reg/foo/page/1.0.0/1.5.0.json", "lower": "1.0.0", "upper": "1.5.0", "count": 3 }
//! ```
//! Pages are kept as raw JSON in the root so that one unreadable page does
//! not hide the others.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::version::NuGetVersion;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationIndexDocument {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationPageDocument {
    /// Required for remote pages; inlined pages may omit it.
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Url>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub lower: Option<NuGetVersion>,
    #[serde(default)]
    pub upper: Option<NuGetVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<RegistrationLeafDocument>>,
}

impl RegistrationPageDocument {
    pub fn is_inlined(&self) -> bool {
        self.items.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationLeafDocument {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Url>,
    #[serde(rename = "catalogEntry")]
    pub catalog_entry: CatalogEntry,
    #[serde(
        rename = "packageContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub package_content: Option<String>,
}

impl RegistrationLeafDocument {
    /// The catalog entry, with the leaf's download link filled in when the
    /// entry itself has none.
    pub fn into_entry(self) -> CatalogEntry {
        let mut entry = self.catalog_entry;
        if entry.package_content.is_none() {
            entry.package_content = self.package_content;
        }
        entry
    }
}

/// Metadata of one published package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub version: NuGetVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_groups: Vec<DependencyGroup>,
    #[serde(default, with = "published_format", skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub authors: Vec<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_content: Option<String>,
}

/// Year the registry stamps on unlisted packages.
const UNLISTED_YEAR: i32 = 1900;

impl CatalogEntry {
    pub fn new(id: impl Into<String>, version: NuGetVersion) -> Self {
        Self {
            id: id.into(),
            version,
            listed: None,
            dependency_groups: Vec::new(),
            published: None,
            description: None,
            authors: Vec::new(),
            tags: Vec::new(),
            project_url: None,
            package_content: None,
        }
    }

    /// Explicit `listed` flag when present; otherwise unlisted iff the
    /// publication date carries the unlisted sentinel year.
    pub fn is_listed(&self) -> bool {
        self.listed.unwrap_or_else(|| {
            self.published
                .map_or(true, |published| published.year() != UNLISTED_YEAR)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    Single(String),
    Multiple(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::Single(s)) if s.is_empty() => Vec::new(),
        Some(StringOrList::Single(s)) => vec![s],
        Some(StringOrList::Multiple(list)) => list,
    })
}

/// Timestamps are RFC 3339; some feeds omit the offset, which is read as UTC.
mod published_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(published) => serializer.serialize_str(&published.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if let Ok(published) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(published.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}
