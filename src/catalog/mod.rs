pub mod spotify;

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactSink;
use crate::config::CatalogConfig;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("invalid entity type '{0}' (expected artist, album, track, playlist, show or episode)")]
    InvalidEntityType(String),
    #[error("catalog client is not connected")]
    NotConnected,
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// The unit a catalog search is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Artist,
    Album,
    Track,
    Playlist,
    Show,
    Episode,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Artist,
        Self::Album,
        Self::Track,
        Self::Playlist,
        Self::Show,
        Self::Episode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Track => "track",
            Self::Playlist => "playlist",
            Self::Show => "show",
            Self::Episode => "episode",
        }
    }

    /// Key of the paged section in a search response ("artists", "tracks", ...).
    pub fn plural(self) -> &'static str {
        match self {
            Self::Artist => "artists",
            Self::Album => "albums",
            Self::Track => "tracks",
            Self::Playlist => "playlists",
            Self::Show => "shows",
            Self::Episode => "episodes",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| CatalogError::InvalidEntityType(s.to_string()))
    }
}

/// When a paginated search stops requesting pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStop {
    /// Stop on the first page that returns no items.
    #[default]
    EmptyItems,
    /// Stop when the page carries no link to a following page.
    NoNextLink,
}

/// One raw page of search results, still in wire form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub next: Option<String>,
    /// Size of the whole collection, when the endpoint reports it.
    #[serde(default)]
    pub total: Option<u32>,
}

/// Narrow view of the remote catalog. Auth and token refresh live behind it.
pub trait CatalogApi {
    /// Check connectivity once. `false` means resolution must fall back offline.
    fn is_connected(&self) -> bool;

    /// Fetch one page of search results for `entity`.
    fn search(
        &self,
        query: &str,
        entity: EntityType,
        market: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchPage>;

    /// Fetch audio-feature payloads for a batch of track ids.
    fn audio_features(&self, ids: &[String]) -> Result<Vec<serde_json::Value>>;

    /// Fetch one page of the user's saved tracks, newest first.
    fn saved_tracks(&self, market: &str, limit: u32, offset: u32) -> Result<SearchPage>;
}

/// A search hit reduced to what matching needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateItem {
    pub name: String,
    pub id: String,
    /// Credited artists (albums and tracks).
    pub artist_ids: Vec<String>,
    /// Parent album (tracks only).
    pub album_id: Option<String>,
}

#[derive(Deserialize)]
struct ItemPayload {
    name: String,
    id: String,
    #[serde(default)]
    artists: Vec<RefPayload>,
    #[serde(default)]
    album: Option<RefPayload>,
}

#[derive(Deserialize)]
struct RefPayload {
    #[serde(default)]
    id: Option<String>,
}

impl CandidateItem {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            artist_ids: Vec::new(),
            album_id: None,
        }
    }

    /// Parse a search item. Only name, id and the artist/album references
    /// are kept; anything else in the payload is ignored.
    pub fn from_payload(value: serde_json::Value) -> Result<Self> {
        let item: ItemPayload = serde_json::from_value(value)
            .map_err(|e| CatalogError::Malformed(format!("search item: {e}")))?;
        Ok(Self {
            name: item.name,
            id: item.id,
            artist_ids: item.artists.into_iter().filter_map(|a| a.id).collect(),
            album_id: item.album.and_then(|a| a.id),
        })
    }
}

/// Ordered field filters for a search, e.g. `artist:Mazzy Star album:Debut`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    fields: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields.push((field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render as the catalog's field-filter query string.
    pub fn to_query(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Paginates the catalog search for one entity type.
pub struct CatalogQuery<'a> {
    api: &'a dyn CatalogApi,
    config: &'a CatalogConfig,
    sink: &'a ArtifactSink,
}

impl<'a> CatalogQuery<'a> {
    pub fn new(api: &'a dyn CatalogApi, config: &'a CatalogConfig, sink: &'a ArtifactSink) -> Self {
        Self { api, config, sink }
    }

    /// Page through the entire result set and return every candidate.
    ///
    /// A failing page ends the loop and whatever was accumulated so far is
    /// returned; the failure is only logged.
    pub fn query_all(&self, params: &SearchParams, entity: EntityType) -> Vec<CandidateItem> {
        let query = params.to_query();
        let limit = self.config.page_limit;
        let mut items = Vec::new();
        let mut offset: u32 = 0;
        let mut page = 0;

        loop {
            if offset >= self.config.max_offset {
                log::warn!(
                    "Hit catalog offset limit for {entity} query '{query}' at offset {offset}"
                );
                break;
            }

            page += 1;
            let batch = match self.api.search(&query, entity, &self.config.market, limit, offset) {
                Ok(batch) => batch,
                Err(e) => {
                    log::warn!("Search failed for {entity} query '{query}' page {page}: {e}");
                    break;
                }
            };

            let count = batch.items.len();
            log::trace!("{entity} query '{query}' page {page}: {count} items");
            if count == 0 && self.config.page_stop == PageStop::EmptyItems {
                break;
            }

            for raw in batch.items {
                match CandidateItem::from_payload(raw) {
                    Ok(item) => items.push(item),
                    Err(e) => log::debug!("Skipping {entity} item: {e}"),
                }
            }

            if batch.next.is_none() && self.config.page_stop == PageStop::NoNextLink {
                break;
            }

            offset = offset.saturating_add(limit);
            self.pause();
        }

        self.sink.save(&format!("query_all_{}", entity.plural()), &items);
        items
    }

    /// Don't bombard the API.
    fn pause(&self) {
        if self.config.rate_limit_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.rate_limit_ms));
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    /// Scripted catalog: pages per entity type, served in order.
    #[derive(Default)]
    pub struct FakeCatalog {
        pub connected: bool,
        pub pages: RefCell<HashMap<EntityType, Vec<Result<SearchPage>>>>,
        pub features: Vec<serde_json::Value>,
        pub calls: Cell<usize>,
        pub queries: RefCell<Vec<String>>,
        /// The saved-track collection, served in `limit`-sized slices.
        pub saved: Vec<serde_json::Value>,
        /// Offsets whose saved-track page fails.
        pub saved_failures: Vec<u32>,
    }

    impl FakeCatalog {
        pub fn connected() -> Self {
            Self { connected: true, ..Self::default() }
        }

        pub fn push_page(&self, entity: EntityType, page: Result<SearchPage>) {
            self.pages.borrow_mut().entry(entity).or_default().push(page);
        }

        /// Queue a page of `(name, id)` items with an optional next link.
        pub fn push_items(&self, entity: EntityType, items: &[(&str, &str)], has_next: bool) {
            let items = items
                .iter()
                .map(|(name, id)| json!({"name": name, "id": id, "type": entity.as_str()}))
                .collect();
            let next = has_next.then(|| "https://api.example/next".to_string());
            self.push_page(entity, Ok(SearchPage { items, next, total: None }));
        }

        pub fn push_raw(&self, entity: EntityType, items: Vec<serde_json::Value>) {
            self.push_page(entity, Ok(SearchPage { items, next: None, total: None }));
        }
    }

    impl CatalogApi for FakeCatalog {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn search(
            &self,
            query: &str,
            entity: EntityType,
            _market: &str,
            _limit: u32,
            _offset: u32,
        ) -> Result<SearchPage> {
            self.calls.set(self.calls.get() + 1);
            self.queries.borrow_mut().push(query.to_string());
            let mut pages = self.pages.borrow_mut();
            match pages.get_mut(&entity) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Ok(SearchPage::default()),
            }
        }

        fn audio_features(&self, ids: &[String]) -> Result<Vec<serde_json::Value>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .features
                .iter()
                .filter(|f| f["id"].as_str().is_some_and(|id| ids.iter().any(|i| i == id)))
                .cloned()
                .collect())
        }

        fn saved_tracks(&self, _market: &str, limit: u32, offset: u32) -> Result<SearchPage> {
            self.calls.set(self.calls.get() + 1);
            self.queries.borrow_mut().push(format!("me/tracks?offset={offset}"));
            if self.saved_failures.contains(&offset) {
                return Err(CatalogError::Malformed(format!("page at offset {offset}")));
            }
            let start = (offset as usize).min(self.saved.len());
            let end = (start + limit as usize).min(self.saved.len());
            let next = (end < self.saved.len()).then(|| "https://api.example/next".to_string());
            Ok(SearchPage {
                items: self.saved[start..end].to_vec(),
                next,
                total: Some(self.saved.len() as u32),
            })
        }
    }
}
