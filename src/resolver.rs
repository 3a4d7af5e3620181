use thiserror::Error;

use crate::artifacts::ArtifactSink;
use crate::catalog::{CandidateItem, CatalogApi, CatalogQuery, EntityType, SearchParams};
use crate::config::AppConfig;
use crate::fallback::{NOT_FOUND, OfflineIds};
use crate::matcher::FuzzyMatcher;
use crate::normalize::normalize;
use crate::source::SourceRecord;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("empty {0} keyword")]
    EmptyKeyword(EntityType),
}

/// How one identifier was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Picked from live catalog candidates.
    Matched {
        id: String,
        confidence: f64,
        ambiguous: bool,
    },
    /// Taken from the offline table.
    Fallback { id: String },
    /// Nothing found; stored as the sentinel.
    Unresolved,
}

impl Resolution {
    /// Identifier to store, [`NOT_FOUND`] when unresolved.
    pub fn id(&self) -> &str {
        match self {
            Self::Matched { id, .. } | Self::Fallback { id } => id,
            Self::Unresolved => NOT_FOUND,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// A source record with all three identifiers attached.
#[derive(Debug, Clone)]
pub struct ResolvedRecord<'r> {
    pub record: &'r SourceRecord,
    pub artist: Resolution,
    pub album: Resolution,
    pub track: Resolution,
}

impl ResolvedRecord<'_> {
    pub fn artist_id(&self) -> &str {
        self.artist.id()
    }

    pub fn album_id(&self) -> &str {
        self.album.id()
    }

    pub fn track_id(&self) -> &str {
        self.track.id()
    }
}

enum Backend<'a> {
    Live {
        query: CatalogQuery<'a>,
        matcher: FuzzyMatcher<'a>,
    },
    Offline(OfflineIds),
}

/// Turns names into catalog identifiers, live or offline.
///
/// The backend is chosen once at construction: connectivity is checked a
/// single time and never re-checked.
pub struct Resolver<'a> {
    backend: Backend<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(api: &'a dyn CatalogApi, config: &'a AppConfig, sink: &'a ArtifactSink) -> Self {
        let live = if !config.catalog.enabled {
            log::info!("Catalog lookups disabled, using offline identifiers");
            false
        } else {
            api.is_connected()
        };

        let backend = if live {
            Backend::Live {
                query: CatalogQuery::new(api, &config.catalog, sink),
                matcher: FuzzyMatcher::new(config.catalog.confidence_threshold, sink),
            }
        } else {
            Backend::Offline(OfflineIds::from_config(&config.offline))
        };
        Self { backend }
    }

    pub fn offline(ids: OfflineIds) -> Self {
        Self { backend: Backend::Offline(ids) }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.backend, Backend::Live { .. })
    }

    /// Resolve a bare keyword, scoped only by its own entity type.
    pub fn resolve(&self, entity: EntityType, keyword: &str) -> Result<Resolution, ResolveError> {
        let params = SearchParams::new().with(entity.as_str(), normalize(keyword));
        self.run(entity, keyword, &params, |_| true)
    }

    pub fn resolve_artist(&self, artist_name: &str) -> Result<Resolution, ResolveError> {
        let params = SearchParams::new().with("artist", normalize(artist_name));
        self.run(EntityType::Artist, artist_name, &params, |_| true)
    }

    /// Album lookup scoped by the artist already resolved for this record.
    pub fn resolve_album(
        &self,
        artist_name: &str,
        artist_id: &str,
        album_title: &str,
        year: Option<i64>,
    ) -> Result<Resolution, ResolveError> {
        let mut params = SearchParams::new()
            .with("artist", normalize(artist_name))
            .with("album", album_title);
        if let Some(year) = year {
            params = params.with("year", year.to_string());
        }
        self.run(EntityType::Album, album_title, &params, |c| {
            c.artist_ids.iter().any(|a| a == artist_id)
        })
    }

    /// Track lookup scoped by the record's album.
    pub fn resolve_track(
        &self,
        artist_name: &str,
        album_title: &str,
        album_id: &str,
        track_title: &str,
    ) -> Result<Resolution, ResolveError> {
        let params = SearchParams::new()
            .with("artist", normalize(artist_name))
            .with("album", normalize(album_title))
            .with("track", normalize(track_title));
        self.run(EntityType::Track, track_title, &params, |c| {
            c.album_id.as_deref() == Some(album_id)
        })
    }

    /// Artist, then album, then track. Each is attempted exactly once.
    pub fn resolve_record<'r>(
        &self,
        record: &'r SourceRecord,
    ) -> Result<ResolvedRecord<'r>, ResolveError> {
        let artist = self.resolve_artist(&record.artist_name)?;
        let album = self.resolve_album(
            &record.artist_name,
            artist.id(),
            &record.album_title,
            record.year,
        )?;
        let track = self.resolve_track(
            &record.artist_name,
            &record.album_title,
            album.id(),
            &record.track_title,
        )?;
        Ok(ResolvedRecord { record, artist, album, track })
    }

    fn run(
        &self,
        entity: EntityType,
        keyword: &str,
        params: &SearchParams,
        in_scope: impl Fn(&CandidateItem) -> bool,
    ) -> Result<Resolution, ResolveError> {
        if keyword.trim().is_empty() {
            return Err(ResolveError::EmptyKeyword(entity));
        }

        match &self.backend {
            Backend::Offline(ids) => Ok(match ids.lookup(entity, keyword) {
                Some(id) => Resolution::Fallback { id: id.to_string() },
                None => {
                    log::debug!("No offline {entity} identifier for '{keyword}'");
                    Resolution::Unresolved
                }
            }),
            Backend::Live { query, matcher } => {
                let candidates = query.query_all(params, entity);
                let scoped: Vec<CandidateItem> =
                    candidates.iter().filter(|c| in_scope(c)).cloned().collect();
                let candidates = if scoped.is_empty() { candidates } else { scoped };

                let result = matcher.find_closest_match(keyword, entity, &candidates);
                let Some(id) = result.best_id.clone() else {
                    log::warn!("No {entity} candidates for '{keyword}'");
                    return Ok(Resolution::Unresolved);
                };

                let ambiguous = matcher.is_ambiguous(&result);
                let name = result.best_name().unwrap_or_default();
                if ambiguous {
                    log::warn!(
                        "Low-confidence {entity} match: '{keyword}' -> '{name}' ({:.1})",
                        result.confidence
                    );
                } else {
                    log::info!(
                        "Matched {entity} '{keyword}' -> '{name}' ({:.1})",
                        result.confidence
                    );
                }
                Ok(Resolution::Matched {
                    id,
                    confidence: result.confidence,
                    ambiguous,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::fake::FakeCatalog;

    fn live_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.catalog.rate_limit_ms = 0;
        config
    }

    fn fade() -> SourceRecord {
        SourceRecord::parse(
            r#"{"artist_name": "Mazzy Star", "album_title": "Debut",
                "track_title": "Fade Into You", "track_number": 4}"#,
            0,
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_resolution_ids() {
        let matched = Resolution::Matched { id: "abc".into(), confidence: 100.0, ambiguous: false };
        assert_eq!(matched.id(), "abc");
        assert_eq!(Resolution::Fallback { id: "def".into() }.id(), "def");
        assert_eq!(Resolution::Unresolved.id(), NOT_FOUND);
        assert!(!Resolution::Unresolved.is_resolved());
    }

    #[test]
    fn test_disconnected_falls_back_offline() {
        let api = FakeCatalog::default();
        let config = live_config();
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);
        assert!(!resolver.is_live());

        let record = fade();
        let resolved = resolver.resolve_record(&record).unwrap();
        assert_eq!(resolved.artist_id(), "37w38cCSGgKLdayTRjna4W");
        assert_eq!(resolved.album_id(), "3icT9XGrBfhlV8BKK4WEGX");
        assert_eq!(resolved.track_id(), "1LzNfuep1bnAUR9skqdHCK");
        assert!(matches!(resolved.artist, Resolution::Fallback { .. }));
        // no search issued
        assert_eq!(api.calls.get(), 0);
    }

    #[test]
    fn test_disabled_catalog_skips_live_even_when_connected() {
        let api = FakeCatalog::connected();
        let mut config = live_config();
        config.catalog.enabled = false;
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);
        assert!(!resolver.is_live());
        assert_eq!(resolver.resolve_artist("Nobody Known").unwrap(), Resolution::Unresolved);
    }

    #[test]
    fn test_live_resolution_picks_best() {
        let api = FakeCatalog::connected();
        api.push_items(
            EntityType::Artist,
            &[("Mazzy Stardust", "x"), ("Mazzy Star", "37w38cCSGgKLdayTRjna4W")],
            false,
        );
        let config = live_config();
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);
        assert!(resolver.is_live());

        let res = resolver.resolve_artist("Mazzy Star").unwrap();
        assert_eq!(
            res,
            Resolution::Matched {
                id: "37w38cCSGgKLdayTRjna4W".into(),
                confidence: 100.0,
                ambiguous: false,
            }
        );
        assert_eq!(api.queries.borrow()[0], "artist:Mazzy Star");
    }

    #[test]
    fn test_live_no_candidates_is_unresolved() {
        let api = FakeCatalog::connected();
        let config = live_config();
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);
        assert_eq!(resolver.resolve_artist("Nobody").unwrap(), Resolution::Unresolved);
    }

    #[test]
    fn test_live_low_confidence_is_flagged() {
        let api = FakeCatalog::connected();
        api.push_items(EntityType::Track, &[("Something Else", "t1")], false);
        let config = live_config();
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);
        let res = resolver.resolve("track".parse().unwrap(), "Halah").unwrap();
        assert!(matches!(res, Resolution::Matched { ambiguous: true, .. }));
        assert_eq!(res.id(), "t1");
    }

    #[test]
    fn test_album_scoped_by_artist_and_year() {
        let api = FakeCatalog::connected();
        api.push_raw(
            EntityType::Album,
            vec![
                json!({"name": "Debut", "id": "bjork-debut", "artists": [{"id": "bjork"}]}),
                json!({"name": "Debut", "id": "other-debut", "artists": [{"id": "someone"}]}),
            ],
        );
        let config = live_config();
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);

        let res = resolver.resolve_album("Björk", "someone", "Debut", Some(1993)).unwrap();
        assert_eq!(res.id(), "other-debut");
        assert_eq!(api.queries.borrow()[0], "artist:Bjork album:Debut year:1993");
    }

    #[test]
    fn test_scope_ignored_when_nothing_matches() {
        let api = FakeCatalog::connected();
        api.push_raw(
            EntityType::Track,
            vec![json!({"name": "Fade Into You", "id": "t1", "album": {"id": "elsewhere"}})],
        );
        let config = live_config();
        let sink = ArtifactSink::disabled();
        let resolver = Resolver::new(&api, &config, &sink);

        let res = resolver
            .resolve_track("Mazzy Star", "So Tonight That I Might See", NOT_FOUND, "Fade Into You")
            .unwrap();
        assert_eq!(res.id(), "t1");
        assert_eq!(
            api.queries.borrow()[0],
            "artist:Mazzy Star album:So Tonight That I Might See track:Fade Into You"
        );
    }

    #[test]
    fn test_empty_keyword_is_error() {
        let resolver = Resolver::offline(OfflineIds::builtin());
        assert!(matches!(
            resolver.resolve_artist("   "),
            Err(ResolveError::EmptyKeyword(EntityType::Artist))
        ));
    }
}
