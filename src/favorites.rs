use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;

use crate::artifacts::ArtifactSink;
use crate::catalog::{CatalogApi, EntityType};
use crate::config::CatalogConfig;
use crate::db::models::LikedSong;
use crate::db::{Database, DbError};

#[derive(Error, Debug)]
pub enum FavoriteError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid item type '{0}'")]
    InvalidType(String),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("album has no credited artist")]
    NoArtist,
}

/// Track length as a clock reading, `HH:MM:SS`. `None` for negative
/// lengths or a day or more.
pub fn convert_duration(duration_ms: i64) -> Option<String> {
    let secs = u32::try_from(duration_ms / 1000).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)?;
    Some(time.format("%H:%M:%S").to_string())
}

/// Normalize a release date of year, month or day precision to
/// `YYYY-MM-DD`, filling missing parts with the first month or day.
pub fn convert_release_date(date: &str) -> Option<String> {
    let full = match date.len() {
        4 => format!("{date}-01-01"),
        7 => format!("{date}-01"),
        10 => date.to_string(),
        _ => return None,
    };
    let parsed = NaiveDate::parse_from_str(&full, "%Y-%m-%d").ok()?;
    Some(parsed.format("%Y-%m-%d").to_string())
}

/// `2021-05-01T10:00:00Z` → `2021-05-01 10:00:00`, in UTC.
pub fn convert_added_at(timestamp: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(timestamp).ok()?;
    Some(parsed.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S").to_string())
}

#[derive(Debug, Deserialize)]
struct SavedItem {
    #[serde(default)]
    added_at: Option<String>,
    track: TrackPayload,
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    track_number: i64,
    #[serde(default)]
    duration_ms: Option<i64>,
    popularity: i64,
    album: AlbumPayload,
    external_urls: ExternalUrls,
    /// Present when the market served a relinked copy of the track.
    #[serde(default)]
    linked_from: Option<LinkedFrom>,
}

#[derive(Debug, Deserialize)]
struct AlbumPayload {
    name: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: String,
}

#[derive(Debug, Deserialize)]
struct LinkedFrom {
    id: String,
}

/// Convert one saved-track item into a typed row.
pub fn parse_favorite(
    value: serde_json::Value,
    extracted_at: &str,
) -> Result<LikedSong, FavoriteError> {
    let item: SavedItem = serde_json::from_value(value)?;
    let t = item.track;

    if t.kind.parse::<EntityType>().is_err() {
        return Err(FavoriteError::InvalidType(t.kind));
    }
    let popularity = u8::try_from(t.popularity)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(FavoriteError::OutOfRange { field: "popularity", value: t.popularity })?;
    let track_number = u32::try_from(t.track_number).map_err(|_| FavoriteError::OutOfRange {
        field: "track_number",
        value: t.track_number,
    })?;
    let artist_name = t.album.artists.into_iter().next().ok_or(FavoriteError::NoArtist)?.name;

    Ok(LikedSong {
        track_id: t.linked_from.map_or(t.id, |l| l.id),
        kind: t.kind,
        artist_name,
        album_name: t.album.name,
        track_name: t.name,
        track_number,
        duration: t.duration_ms.and_then(convert_duration),
        release_date: t.album.release_date.as_deref().and_then(convert_release_date),
        popularity,
        added_at: item.added_at.as_deref().and_then(convert_added_at),
        external_url: t.external_urls.spotify,
        extracted_at: extracted_at.to_string(),
    })
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FavoriteSummary {
    /// Items returned by the catalog.
    pub fetched: usize,
    pub stored: usize,
    /// Items whose track id was already seen in this run.
    pub duplicates: usize,
    pub skipped: usize,
    pub failed_pages: usize,
}

/// Pages through the user's saved tracks and stores them.
pub struct FavoriteSync<'a> {
    api: &'a dyn CatalogApi,
    db: &'a Database,
    config: &'a CatalogConfig,
    sink: &'a ArtifactSink,
}

impl<'a> FavoriteSync<'a> {
    pub fn new(
        api: &'a dyn CatalogApi,
        db: &'a Database,
        config: &'a CatalogConfig,
        sink: &'a ArtifactSink,
    ) -> Self {
        Self { api, db, config, sink }
    }

    /// Fetch up to `item_limit` saved tracks (all of them when `None`).
    /// A failed page ends paging and keeps what was already stored; only
    /// storage errors are returned.
    pub fn run(&self, item_limit: Option<usize>) -> Result<FavoriteSummary, DbError> {
        let page_size = self.config.page_limit.max(1);
        let extracted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut summary = FavoriteSummary::default();
        let mut seen = HashSet::new();
        let mut stored = Vec::new();
        let mut offset: u32 = 0;

        let pb = ProgressBar::new(item_limit.unwrap_or(0) as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} liked songs",
            )
            .unwrap()
            .progress_chars("##-"),
        );

        loop {
            let remaining = item_limit.map(|n| n.saturating_sub(summary.fetched));
            if remaining == Some(0) {
                break;
            }
            let limit = remaining.map_or(page_size, |r| {
                page_size.min(u32::try_from(r).unwrap_or(u32::MAX))
            });

            if offset > 0 && self.config.rate_limit_ms > 0 {
                thread::sleep(Duration::from_millis(self.config.rate_limit_ms));
            }
            let page = match self.api.saved_tracks(&self.config.market, limit, offset) {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("Saved tracks page at offset {offset} failed: {e}");
                    summary.failed_pages += 1;
                    break;
                }
            };
            if let Some(total) = page.total {
                let wanted = item_limit.map_or(total as usize, |n| n.min(total as usize));
                pb.set_length(wanted as u64);
            }
            if page.items.is_empty() {
                break;
            }

            let count = page.items.len();
            summary.fetched += count;
            for item in page.items {
                let song = match parse_favorite(item, &extracted_at) {
                    Ok(song) => song,
                    Err(e) => {
                        log::warn!("Skipping saved track: {e}");
                        summary.skipped += 1;
                        continue;
                    }
                };
                if !seen.insert(song.track_id.clone()) {
                    log::debug!("Duplicate saved track {}", song.track_id);
                    summary.duplicates += 1;
                    continue;
                }
                self.db.upsert_liked_song(&song)?;
                summary.stored += 1;
                stored.push(song);
            }
            pb.inc(count as u64);

            offset += count as u32;
            if page.total.is_some_and(|total| offset >= total) {
                break;
            }
            if page.total.is_none() && page.next.is_none() {
                break;
            }
        }

        pb.finish_and_clear();
        if self.sink.is_enabled() {
            self.sink.save("liked_songs", &stored);
        }
        log::info!(
            "Saved tracks: {} fetched, {} stored, {} duplicates, {} skipped",
            summary.fetched,
            summary.stored,
            summary.duplicates,
            summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::fake::FakeCatalog;

    fn item(id: &str, popularity: i64) -> serde_json::Value {
        json!({
            "added_at": "2021-05-01T10:00:00Z",
            "track": {
                "id": id,
                "type": "track",
                "name": "Fade Into You",
                "track_number": 1,
                "duration_ms": 295293,
                "popularity": popularity,
                "album": {
                    "name": "So Tonight That I Might See",
                    "release_date": "1993",
                    "artists": [{"name": "Mazzy Star"}, {"name": "Hope Sandoval"}]
                },
                "external_urls": {"spotify": format!("https://open.spotify.com/track/{id}")}
            }
        })
    }

    fn test_config() -> CatalogConfig {
        CatalogConfig { page_limit: 2, rate_limit_ms: 0, ..CatalogConfig::default() }
    }

    #[test]
    fn test_convert_duration() {
        assert_eq!(convert_duration(295_293).as_deref(), Some("00:04:55"));
        assert_eq!(convert_duration(3_723_000).as_deref(), Some("01:02:03"));
        assert_eq!(convert_duration(0).as_deref(), Some("00:00:00"));
        assert_eq!(convert_duration(-1000), None);
        assert_eq!(convert_duration(86_400_000), None);
    }

    #[test]
    fn test_convert_release_date_precisions() {
        assert_eq!(convert_release_date("1993").as_deref(), Some("1993-01-01"));
        assert_eq!(convert_release_date("1993-10").as_deref(), Some("1993-10-01"));
        assert_eq!(convert_release_date("1993-10-12").as_deref(), Some("1993-10-12"));
        assert_eq!(convert_release_date("93"), None);
        assert_eq!(convert_release_date("1993-13"), None);
        assert_eq!(convert_release_date(""), None);
    }

    #[test]
    fn test_convert_added_at() {
        assert_eq!(
            convert_added_at("2021-05-01T10:00:00Z").as_deref(),
            Some("2021-05-01 10:00:00")
        );
        assert_eq!(
            convert_added_at("2021-05-01T12:00:00+02:00").as_deref(),
            Some("2021-05-01 10:00:00")
        );
        assert_eq!(convert_added_at("yesterday"), None);
    }

    #[test]
    fn test_parse_favorite() {
        let song = parse_favorite(item("1LzNfuep1bnAUR9skqdHCK", 74), "ts").unwrap();
        assert_eq!(song.track_id, "1LzNfuep1bnAUR9skqdHCK");
        assert_eq!(song.kind, "track");
        assert_eq!(song.artist_name, "Mazzy Star");
        assert_eq!(song.album_name, "So Tonight That I Might See");
        assert_eq!(song.duration.as_deref(), Some("00:04:55"));
        assert_eq!(song.release_date.as_deref(), Some("1993-01-01"));
        assert_eq!(song.added_at.as_deref(), Some("2021-05-01 10:00:00"));
        assert_eq!(song.popularity, 74);
        assert_eq!(song.external_url, "https://open.spotify.com/track/1LzNfuep1bnAUR9skqdHCK");
        assert_eq!(song.extracted_at, "ts");
    }

    #[test]
    fn test_parse_favorite_prefers_linked_from() {
        let mut relinked = item("relinked", 50);
        relinked["track"]["linked_from"] = json!({"id": "original", "type": "track"});
        assert_eq!(parse_favorite(relinked, "ts").unwrap().track_id, "original");
    }

    #[test]
    fn test_parse_favorite_rejects_bad_items() {
        let too_popular = item("a", 101);
        assert!(matches!(
            parse_favorite(too_popular, "ts"),
            Err(FavoriteError::OutOfRange { field: "popularity", value: 101 })
        ));

        let mut podcast = item("a", 10);
        podcast["track"]["type"] = json!("podcast");
        assert!(matches!(
            parse_favorite(podcast, "ts"),
            Err(FavoriteError::InvalidType(t)) if t == "podcast"
        ));

        let mut negative = item("a", 10);
        negative["track"]["track_number"] = json!(-1);
        assert!(matches!(
            parse_favorite(negative, "ts"),
            Err(FavoriteError::OutOfRange { field: "track_number", .. })
        ));

        let mut orphan = item("a", 10);
        orphan["track"]["album"]["artists"] = json!([]);
        assert!(matches!(parse_favorite(orphan, "ts"), Err(FavoriteError::NoArtist)));

        let empty = json!({"track": {}});
        assert!(matches!(parse_favorite(empty, "ts"), Err(FavoriteError::Malformed(_))));
    }

    #[test]
    fn test_sync_pages_through_all_saved_tracks() {
        let db = Database::open_in_memory().unwrap();
        let api = FakeCatalog {
            saved: vec![
                item("a", 10),
                item("b", 20),
                item("a", 10),
                item("c", 300),
                item("d", 40),
            ],
            ..FakeCatalog::connected()
        };
        let sink = ArtifactSink::disabled();
        let summary = FavoriteSync::new(&api, &db, &test_config(), &sink).run(None).unwrap();

        assert_eq!(
            summary,
            FavoriteSummary { fetched: 5, stored: 3, duplicates: 1, skipped: 1, failed_pages: 0 }
        );
        // pages at offsets 0, 2, 4
        assert_eq!(api.calls.get(), 3);
        assert_eq!(db.liked_track_ids().unwrap(), vec!["a", "b", "d"]);
        assert_eq!(db.get_liked_song("b").unwrap().unwrap().popularity, 20);
    }

    #[test]
    fn test_sync_honors_item_limit() {
        let db = Database::open_in_memory().unwrap();
        let api = FakeCatalog {
            saved: (0..6).map(|i| item(&format!("t{i}"), 10)).collect(),
            ..FakeCatalog::connected()
        };
        let sink = ArtifactSink::disabled();
        let summary = FavoriteSync::new(&api, &db, &test_config(), &sink).run(Some(3)).unwrap();

        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.stored, 3);
        assert_eq!(api.calls.get(), 2);
        assert_eq!(db.liked_track_ids().unwrap(), vec!["t0", "t1", "t2"]);
    }

    #[test]
    fn test_failed_page_keeps_earlier_pages() {
        let db = Database::open_in_memory().unwrap();
        let api = FakeCatalog {
            saved: (0..5).map(|i| item(&format!("t{i}"), 10)).collect(),
            saved_failures: vec![2],
            ..FakeCatalog::connected()
        };
        let sink = ArtifactSink::disabled();
        let summary = FavoriteSync::new(&api, &db, &test_config(), &sink).run(None).unwrap();

        assert_eq!(summary.failed_pages, 1);
        assert_eq!(summary.stored, 2);
        assert_eq!(db.liked_track_ids().unwrap(), vec!["t0", "t1"]);
    }

    #[test]
    fn test_sync_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let api = FakeCatalog { saved: vec![item("a", 10)], ..FakeCatalog::connected() };
        let sink = ArtifactSink::new(dir.path());
        FavoriteSync::new(&api, &db, &test_config(), &sink).run(None).unwrap();

        let written: Vec<_> = walkdir::WalkDir::new(dir.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() == "liked_songs.json")
            .collect();
        assert_eq!(written.len(), 1);
        let text = std::fs::read_to_string(written[0].path()).unwrap();
        assert!(text.contains("\"track_id\": \"a\""));
    }
}
