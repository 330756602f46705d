//! Package registration lookup against a source's registration endpoints.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::{DataClient, FetchError, FetchedDocument};
use crate::resource::Resource;
use crate::version::NuGetVersion;

use super::RegistrationError;
use super::merge::{PageContent, PageSlot, RegistrationIndex, merge_pages};
use super::model::{CatalogEntry, RegistrationIndexDocument, RegistrationPageDocument};

const ID_PLACEHOLDER: &str = "{id}";
const MAX_PACKAGE_ID_LEN: usize = 100;

/// A registration endpoint expanded per package id.
///
/// Endpoints either carry an `{id}` placeholder or are a base URL to which
/// `{id}/index.json` is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationTemplate {
    raw: String,
}

impl RegistrationTemplate {
    pub fn from_endpoint(endpoint: &Url) -> Self {
        // URL parsing percent-encodes the braces
        let raw = endpoint
            .as_str()
            .replace("%7Bid%7D", ID_PLACEHOLDER)
            .replace("%7bid%7d", ID_PLACEHOLDER);

        if raw.contains(ID_PLACEHOLDER) {
            return Self { raw };
        }

        let mut base = raw;
        if !base.ends_with('/') {
            base.push('/');
        }
        base.push_str("{id}/index.json");
        Self { raw: base }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Root document URL for `package_id`, which is lower-cased.
    pub fn expand(&self, package_id: &str) -> Result<Url, RegistrationError> {
        let expanded = self
            .raw
            .replace(ID_PLACEHOLDER, &package_id.to_lowercase());
        Url::parse(&expanded).map_err(|source| RegistrationError::InvalidTemplate {
            template: self.raw.clone(),
            source,
        })
    }
}

/// Package ids are 1-100 characters of letters, digits, `.`, `-` and `_`.
pub fn validate_package_id(package_id: &str) -> Result<(), RegistrationError> {
    let valid = !package_id.is_empty()
        && package_id.len() <= MAX_PACKAGE_ID_LEN
        && package_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        && !package_id.starts_with('.')
        && !package_id.contains("..");

    if valid {
        Ok(())
    } else {
        Err(RegistrationError::InvalidPackageId(package_id.to_string()))
    }
}

/// Progress of one registration lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unresolved,
    TemplateChosen,
    RootFetched,
    PagesFetching,
    Merged,
    Ready,
    Failed,
}

impl RegistrationState {
    pub fn can_advance_to(self, next: RegistrationState) -> bool {
        use RegistrationState::*;
        matches!(
            (self, next),
            (Unresolved, TemplateChosen)
                | (Unresolved, Failed)
                | (TemplateChosen, RootFetched)
                | (TemplateChosen, Failed)
                | (RootFetched, PagesFetching)
                | (RootFetched, Merged)
                | (RootFetched, Failed)
                | (PagesFetching, Merged)
                | (PagesFetching, Failed)
                | (Merged, Ready)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RegistrationState::Ready | RegistrationState::Failed)
    }
}

struct Lookup<'a> {
    package_id: &'a str,
    state: RegistrationState,
}

impl<'a> Lookup<'a> {
    fn new(package_id: &'a str) -> Self {
        Self {
            package_id,
            state: RegistrationState::Unresolved,
        }
    }

    fn advance(&mut self, next: RegistrationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal registration transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!("{}: {:?} -> {:?}", self.package_id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: RegistrationError) -> RegistrationError {
        self.advance(RegistrationState::Failed);
        error
    }
}

/// Looks up package registrations on one source.
#[derive(Debug)]
pub struct RegistrationResource {
    client: Arc<DataClient>,
    templates: Vec<RegistrationTemplate>,
    max_concurrent_pages: usize,
}

impl Resource for RegistrationResource {}

impl RegistrationResource {
    /// Templates are tried in the order the endpoints are given.
    pub fn new(client: Arc<DataClient>, endpoints: &[Url]) -> Self {
        let max_concurrent_pages = client.settings().max_concurrent_pages.max(1);
        Self {
            client,
            templates: endpoints
                .iter()
                .map(RegistrationTemplate::from_endpoint)
                .collect(),
            max_concurrent_pages,
        }
    }

    pub fn templates(&self) -> &[RegistrationTemplate] {
        &self.templates
    }

    /// Candidate root document URLs for `package_id`, in template order.
    pub fn resolve_template(&self, package_id: &str) -> Result<Vec<Url>, RegistrationError> {
        validate_package_id(package_id)?;
        self.templates
            .iter()
            .map(|template| template.expand(package_id))
            .collect()
    }

    /// Every version of `package_id`, or `None` when the package is unknown.
    ///
    /// Templates are tried in order; the first reachable root document is
    /// used. Pages that cannot be loaded are reported as gaps on the index
    /// unless none could be loaded at all.
    pub async fn get_index(
        &self,
        package_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<RegistrationIndex>, RegistrationError> {
        let mut lookup = Lookup::new(package_id);

        let candidates = match self.resolve_template(package_id) {
            Ok(candidates) => candidates,
            Err(e) => return Err(lookup.fail(e)),
        };
        lookup.advance(RegistrationState::TemplateChosen);

        let root = match self.fetch_root(package_id, &candidates, cancel).await {
            Ok(Some(root)) => root,
            Ok(None) => {
                lookup.advance(RegistrationState::Failed);
                return Ok(None);
            }
            Err(e) => return Err(lookup.fail(e)),
        };

        let document = match RegistrationIndexDocument::deserialize(root.json()) {
            Ok(document) => document,
            Err(source) => {
                return Err(lookup.fail(RegistrationError::InvalidDocument {
                    url: root.url.clone(),
                    source,
                }));
            }
        };
        lookup.advance(RegistrationState::RootFetched);

        let mut slots: Vec<PageSlot> = document
            .items
            .into_iter()
            .enumerate()
            .map(|(position, page)| PageSlot::from_value(&root.url, position, page))
            .collect();

        if slots.iter().any(PageSlot::is_pending) {
            lookup.advance(RegistrationState::PagesFetching);
            if let Err(e) = self.fetch_pages(&mut slots, cancel).await {
                return Err(lookup.fail(e));
            }
        }

        match merge_pages(package_id, root.url.clone(), slots) {
            Ok(index) => {
                lookup.advance(RegistrationState::Merged);
                if !index.is_complete() {
                    tracing::warn!(
                        "Registration of {} is missing {} page(s)",
                        package_id,
                        index.gaps().len()
                    );
                }
                lookup.advance(RegistrationState::Ready);
                Ok(Some(index))
            }
            Err(nothing) => Err(lookup.fail(RegistrationError::Unavailable {
                package_id: package_id.to_string(),
                reasons: nothing
                    .gaps
                    .into_iter()
                    .map(|gap| format!("{}: {}", gap.url, gap.reason))
                    .collect(),
            })),
        }
    }

    /// The entry for exactly `version`, if the package lists it.
    pub async fn get_version(
        &self,
        package_id: &str,
        version: &NuGetVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<CatalogEntry>, RegistrationError> {
        let index = self.get_index(package_id, cancel).await?;
        Ok(index.and_then(|index| index.find(version).cloned()))
    }

    /// First reachable root document. `None` when every candidate answered
    /// 404; an error when some candidate failed otherwise.
    async fn fetch_root(
        &self,
        package_id: &str,
        candidates: &[Url],
        cancel: &CancellationToken,
    ) -> Result<Option<FetchedDocument>, RegistrationError> {
        let mut failures = Vec::new();

        for url in candidates {
            match self.client.fetch(url, cancel).await {
                Ok(document) => return Ok(Some(document)),
                Err(FetchError::Cancelled) => return Err(RegistrationError::Cancelled),
                Err(e) if e.is_not_found() => {
                    tracing::debug!("{} is not registered at {}", package_id, url);
                }
                Err(e @ FetchError::MalformedResponse { .. }) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Registration endpoint {} failed: {}", url, e);
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            Ok(None)
        } else {
            Err(RegistrationError::Unavailable {
                package_id: package_id.to_string(),
                reasons: failures,
            })
        }
    }

    /// Fetch every pending page, at most `max_concurrent_pages` at a time.
    /// Results land in their declared slot whatever order they complete in.
    async fn fetch_pages(
        &self,
        slots: &mut [PageSlot],
        cancel: &CancellationToken,
    ) -> Result<(), RegistrationError> {
        let pending: Vec<(usize, Url)> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_pending())
            .map(|(position, slot)| (position, slot.url.clone()))
            .collect();

        let mut fetches = stream::iter(pending)
            .map(|(position, url)| async move {
                let outcome = self.client.fetch(&url, cancel).await;
                (position, url, outcome)
            })
            .buffer_unordered(self.max_concurrent_pages);

        while let Some((position, url, outcome)) = fetches.next().await {
            let content = match outcome {
                Err(FetchError::Cancelled) => return Err(RegistrationError::Cancelled),
                Err(e) => {
                    tracing::warn!("Registration page {} unavailable: {}", url, e);
                    PageContent::Missing(e.to_string())
                }
                Ok(document) => page_items(&url, &document),
            };
            slots[position].content = content;
        }

        Ok(())
    }
}

fn page_items(url: &Url, document: &FetchedDocument) -> PageContent {
    match RegistrationPageDocument::deserialize(document.json()) {
        Ok(RegistrationPageDocument {
            items: Some(items), ..
        }) => PageContent::Loaded(items),
        Ok(_) => {
            tracing::warn!("Registration page {} has no items", url);
            PageContent::Missing("page document has no items".to_string())
        }
        Err(e) => {
            tracing::warn!("Registration page {} is malformed: {}", url, e);
            PageContent::Missing(format!("malformed page: {e}"))
        }
    }
}
