//! Merging registration pages into one ordered version list.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::version::NuGetVersion;

use super::model::{CatalogEntry, RegistrationLeafDocument, RegistrationPageDocument};

/// Where a page's items came from, or why they are missing.
#[derive(Debug)]
pub(crate) enum PageContent {
    /// Remote page not fetched yet.
    Pending,
    Loaded(Vec<RegistrationLeafDocument>),
    Missing(String),
}

/// One page of the root index, kept at its declared position while remote
/// pages are fetched in any order.
#[derive(Debug)]
pub(crate) struct PageSlot {
    pub url: Url,
    pub lower: Option<NuGetVersion>,
    pub upper: Option<NuGetVersion>,
    pub declared_count: Option<usize>,
    pub inlined: bool,
    pub content: PageContent,
}

impl PageSlot {
    /// Read the page declared at `position` of the root index at `root`.
    /// A page that cannot be read is recorded as missing.
    pub fn from_value(root: &Url, position: usize, value: Value) -> Self {
        match RegistrationPageDocument::deserialize(&value) {
            Ok(page) => Self::from_document(root, position, page),
            Err(e) => {
                tracing::warn!("Page {} of {} is malformed: {}", position, root, e);
                Self {
                    url: declared_id(&value)
                        .unwrap_or_else(|| anchor(root, &format!("page/{position}"))),
                    lower: declared_version(&value, "lower"),
                    upper: declared_version(&value, "upper"),
                    declared_count: value
                        .get("count")
                        .and_then(Value::as_u64)
                        .and_then(|count| usize::try_from(count).ok()),
                    inlined: value.get("items").is_some(),
                    content: PageContent::Missing(format!("malformed page: {e}")),
                }
            }
        }
    }

    fn from_document(root: &Url, position: usize, page: RegistrationPageDocument) -> Self {
        let inlined = page.is_inlined();
        let url = match (&page.id, &page.lower, &page.upper) {
            (Some(id), _, _) => id.clone(),
            (None, Some(lower), Some(upper)) => anchor(root, &format!("page/{lower}/{upper}")),
            (None, _, _) => anchor(root, &format!("page/{position}")),
        };
        let content = match page.items {
            Some(items) => PageContent::Loaded(items),
            None if page.id.is_some() => PageContent::Pending,
            None => PageContent::Missing("remote page has no @id".to_string()),
        };
        Self {
            url,
            lower: page.lower,
            upper: page.upper,
            declared_count: page.count,
            inlined,
            content,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.content, PageContent::Pending)
    }
}

fn anchor(root: &Url, fragment: &str) -> Url {
    let mut url = root.clone();
    url.set_fragment(Some(fragment));
    url
}

fn declared_id(value: &Value) -> Option<Url> {
    value
        .get("@id")
        .and_then(Value::as_str)
        .and_then(|id| Url::parse(id).ok())
}

fn declared_version(value: &Value, key: &str) -> Option<NuGetVersion> {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| NuGetVersion::parse(raw).ok())
}

/// Summary of one page as it was declared and loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub url: Url,
    pub lower: Option<NuGetVersion>,
    pub upper: Option<NuGetVersion>,
    pub inlined: bool,
    /// Entries the page contributed before de-duplication; `None` when the
    /// page could not be loaded.
    pub loaded: Option<usize>,
}

/// A page whose versions are missing from the merged index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageGap {
    pub url: Url,
    pub lower: Option<NuGetVersion>,
    pub upper: Option<NuGetVersion>,
    pub reason: String,
}

/// Every known version of a package in ascending order.
#[derive(Debug, Clone)]
pub struct RegistrationIndex {
    package_id: String,
    url: Url,
    entries: Vec<CatalogEntry>,
    pages: Vec<PageSummary>,
    gaps: Vec<PageGap>,
}

impl RegistrationIndex {
    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Root registration document the index was built from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }

    pub fn versions(&self) -> impl Iterator<Item = &NuGetVersion> {
        self.entries.iter().map(|entry| &entry.version)
    }

    pub fn find(&self, version: &NuGetVersion) -> Option<&CatalogEntry> {
        self.entries
            .binary_search_by(|entry| entry.version.cmp(version))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn listed(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|entry| entry.is_listed())
    }

    /// Highest listed version, skipping pre-releases unless asked for.
    pub fn latest(&self, include_prerelease: bool) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| entry.is_listed())
            .find(|entry| include_prerelease || !entry.version.is_prerelease())
    }

    pub fn pages(&self) -> &[PageSummary] {
        &self.pages
    }

    pub fn gaps(&self) -> &[PageGap] {
        &self.gaps
    }

    /// Whether every declared page contributed its entries.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every declared page was unreachable.
#[derive(Debug)]
pub(crate) struct NothingLoaded {
    pub gaps: Vec<PageGap>,
}

/// Merge loaded pages in declared order. Versions are compared semantically;
/// when two pages list the same version the earlier page wins.
pub(crate) fn merge_pages(
    package_id: &str,
    url: Url,
    slots: Vec<PageSlot>,
) -> Result<RegistrationIndex, NothingLoaded> {
    let declared = slots.len();
    let mut merged: BTreeMap<NuGetVersion, CatalogEntry> = BTreeMap::new();
    let mut pages = Vec::with_capacity(declared);
    let mut gaps = Vec::new();

    for slot in slots {
        let loaded = match slot.content {
            PageContent::Loaded(items) => {
                let count = items.len();
                for leaf in items {
                    let entry = leaf.into_entry();
                    match merged.entry(entry.version.clone()) {
                        Entry::Vacant(vacant) => {
                            vacant.insert(entry);
                        }
                        Entry::Occupied(kept) => {
                            tracing::debug!(
                                "{} {} listed again in {}; keeping {}",
                                package_id,
                                entry.version,
                                slot.url,
                                kept.get().version
                            );
                        }
                    }
                }
                if let Some(declared_count) = slot.declared_count
                    && declared_count != count
                {
                    tracing::debug!(
                        "Page {} declares {} entries but holds {}",
                        slot.url,
                        declared_count,
                        count
                    );
                }
                Some(count)
            }
            PageContent::Missing(reason) => {
                gaps.push(PageGap {
                    url: slot.url.clone(),
                    lower: slot.lower.clone(),
                    upper: slot.upper.clone(),
                    reason,
                });
                None
            }
            PageContent::Pending => {
                gaps.push(PageGap {
                    url: slot.url.clone(),
                    lower: slot.lower.clone(),
                    upper: slot.upper.clone(),
                    reason: "page was never fetched".to_string(),
                });
                None
            }
        };

        pages.push(PageSummary {
            url: slot.url,
            lower: slot.lower,
            upper: slot.upper,
            inlined: slot.inlined,
            loaded,
        });
    }

    if declared > 0 && gaps.len() == declared {
        return Err(NothingLoaded { gaps });
    }

    Ok(RegistrationIndex {
        package_id: package_id.to_string(),
        url,
        entries: merged.into_values().collect(),
        pages,
        gaps,
    })
}
