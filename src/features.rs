use std::thread;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::CatalogApi;
use crate::config::CatalogConfig;
use crate::db::models::AudioFeature;
use crate::db::{Database, DbError};

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("unknown pitch class {0}")]
    Key(i64),
    #[error("unknown mode {0}")]
    Mode(i64),
}

/// Pitch class notation for the catalog's integer key; -1 means no key.
pub fn pitch_class(key: i64) -> Option<&'static str> {
    Some(match key {
        -1 => "",
        0 => "C",
        1 => "C#,D♭",
        2 => "D",
        3 => "D#,E♭",
        4 => "E,F♭",
        5 => "F,E#",
        6 => "F#,G♭",
        7 => "G",
        8 => "G#,A♭",
        9 => "A",
        10 => "A#,B♭",
        11 => "B,C♭",
        _ => return None,
    })
}

pub fn mode_name(mode: i64) -> Option<&'static str> {
    match mode {
        0 => Some("minor"),
        1 => Some("Major"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct FeaturePayload {
    id: String,
    acousticness: f64,
    danceability: f64,
    duration_ms: i64,
    energy: f64,
    instrumentalness: f64,
    key: i64,
    mode: i64,
    liveness: f64,
    loudness: f64,
    speechiness: f64,
    tempo: f64,
    time_signature: i64,
    valence: f64,
}

fn unit(field: &'static str, value: f64) -> Result<f64, FeatureError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(FeatureError::OutOfRange { field, value })
    }
}

/// Convert one audio-features payload into a typed row.
pub fn parse_feature(
    value: serde_json::Value,
    extracted_at: &str,
) -> Result<AudioFeature, FeatureError> {
    let p: FeaturePayload = serde_json::from_value(value)?;
    if p.duration_ms < 0 {
        let value = p.duration_ms as f64;
        return Err(FeatureError::OutOfRange { field: "duration_ms", value });
    }
    Ok(AudioFeature {
        track_id: p.id,
        acousticness: unit("acousticness", p.acousticness)?,
        danceability: unit("danceability", p.danceability)?,
        duration_ms: p.duration_ms,
        energy: unit("energy", p.energy)?,
        instrumentalness: unit("instrumentalness", p.instrumentalness)?,
        key: pitch_class(p.key).ok_or(FeatureError::Key(p.key))?.to_string(),
        mode: mode_name(p.mode).ok_or(FeatureError::Mode(p.mode))?.to_string(),
        liveness: unit("liveness", p.liveness)?,
        loudness: p.loudness,
        speechiness: unit("speechiness", p.speechiness)?,
        tempo: p.tempo,
        time_signature: p.time_signature,
        valence: unit("valence", p.valence)?,
        extracted_at: extracted_at.to_string(),
    })
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeatureSummary {
    pub requested: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed_batches: usize,
}

/// Fetches audio features for every resolved or saved track in the store.
pub struct FeatureSync<'a> {
    api: &'a dyn CatalogApi,
    db: &'a Database,
    config: &'a CatalogConfig,
}

impl<'a> FeatureSync<'a> {
    pub fn new(api: &'a dyn CatalogApi, db: &'a Database, config: &'a CatalogConfig) -> Self {
        Self { api, db, config }
    }

    /// Only reading the track ids can fail; batch and row errors are logged
    /// and counted.
    pub fn run(&self) -> Result<FeatureSummary, DbError> {
        let ids = self.db.feature_track_ids()?;
        let mut summary = FeatureSummary { requested: ids.len(), ..Default::default() };
        if ids.is_empty() {
            log::info!("No tracks to fetch audio features for");
            return Ok(summary);
        }

        let batch_size = self.config.page_limit.max(1) as usize;
        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tracks ({eta} remaining)",
            )
            .unwrap()
            .progress_chars("##-"),
        );

        for (i, batch) in ids.chunks(batch_size).enumerate() {
            if i > 0 && self.config.rate_limit_ms > 0 {
                thread::sleep(Duration::from_millis(self.config.rate_limit_ms));
            }

            let extracted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            match self.api.audio_features(batch) {
                Ok(payloads) => {
                    for payload in payloads {
                        match parse_feature(payload, &extracted_at) {
                            Ok(feature) => match self.db.upsert_audio_feature(&feature) {
                                Ok(()) => summary.stored += 1,
                                Err(e) => {
                                    let id = &feature.track_id;
                                    log::warn!("Failed to store features for {id}: {e}");
                                    summary.skipped += 1;
                                }
                            },
                            Err(e) => {
                                log::warn!("Skipping audio features: {e}");
                                summary.skipped += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Audio features batch {} failed: {e}", i + 1);
                    summary.failed_batches += 1;
                }
            }
            pb.inc(batch.len() as u64);
        }

        pb.finish_and_clear();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::types::Value;
    use serde_json::json;

    use super::*;
    use crate::catalog::fake::FakeCatalog;
    use crate::db::models::TRACK;
    use crate::fallback::NOT_FOUND;

    fn payload(id: &str) -> serde_json::Value {
        json!({
            "type": "audio_features",
            "id": id,
            "uri": format!("spotify:track:{id}"),
            "acousticness": 0.566,
            "danceability": 0.399,
            "duration_ms": 295293,
            "energy": 0.348,
            "instrumentalness": 0.0158,
            "key": 5,
            "mode": 1,
            "liveness": 0.105,
            "loudness": -10.382,
            "speechiness": 0.0286,
            "tempo": 75.474,
            "time_signature": 4,
            "valence": 0.215
        })
    }

    #[test]
    fn test_pitch_class_and_mode() {
        assert_eq!(pitch_class(0), Some("C"));
        assert_eq!(pitch_class(11), Some("B,C♭"));
        assert_eq!(pitch_class(-1), Some(""));
        assert_eq!(pitch_class(12), None);
        assert_eq!(mode_name(0), Some("minor"));
        assert_eq!(mode_name(1), Some("Major"));
        assert_eq!(mode_name(2), None);
    }

    #[test]
    fn test_parse_feature() {
        let f = parse_feature(payload("t1"), "ts").unwrap();
        assert_eq!(f.track_id, "t1");
        assert_eq!(f.key, "F,E#");
        assert_eq!(f.mode, "Major");
        assert_eq!(f.duration_ms, 295293);
        assert_eq!(f.extracted_at, "ts");
    }

    #[test]
    fn test_parse_feature_rejects_bad_values() {
        let mut p = payload("t1");
        p["energy"] = json!(1.2);
        assert!(matches!(
            parse_feature(p, "ts"),
            Err(FeatureError::OutOfRange { field: "energy", .. })
        ));

        let mut p = payload("t1");
        p["key"] = json!(14);
        assert!(matches!(parse_feature(p, "ts"), Err(FeatureError::Key(14))));

        let mut p = payload("t1");
        p["mode"] = json!(3);
        assert!(matches!(parse_feature(p, "ts"), Err(FeatureError::Mode(3))));

        let partial = json!({"id": "t1"});
        assert!(matches!(parse_feature(partial, "ts"), Err(FeatureError::Malformed(_))));
    }

    #[test]
    fn test_sync_stores_features_in_batches() {
        let db = Database::open_in_memory().unwrap();
        db.recreate_tables().unwrap();
        let cols = vec!["track_id".to_string()];
        for id in ["t1", "t2", "t3", NOT_FOUND] {
            db.insert_row(TRACK, &cols, vec![Value::Text(id.to_string())]).unwrap();
        }

        let mut bad = payload("t3");
        bad["valence"] = json!(-0.5);
        let api = FakeCatalog {
            features: vec![payload("t1"), payload("t2"), bad],
            ..FakeCatalog::connected()
        };
        let config = CatalogConfig { page_limit: 2, rate_limit_ms: 0, ..CatalogConfig::default() };

        let summary = FeatureSync::new(&api, &db, &config).run().unwrap();
        assert_eq!(
            summary,
            FeatureSummary { requested: 3, stored: 2, skipped: 1, failed_batches: 0 }
        );
        // two batches: [t1, t2], [t3]
        assert_eq!(api.calls.get(), 2);
        assert_eq!(db.get_audio_feature("t2").unwrap().unwrap().mode, "Major");
        assert!(db.get_audio_feature("t3").unwrap().is_none());
    }

    #[test]
    fn test_sync_includes_saved_tracks() {
        let db = Database::open_in_memory().unwrap();
        let saved = json!({
            "added_at": "2021-05-01T10:00:00Z",
            "track": {
                "id": "liked", "type": "track", "name": "Teardrop", "track_number": 3,
                "duration_ms": 330_773, "popularity": 70,
                "album": {"name": "Mezzanine", "release_date": "1998-04-20",
                          "artists": [{"name": "Massive Attack"}]},
                "external_urls": {"spotify": "https://open.spotify.com/track/liked"}
            }
        });
        let song = crate::favorites::parse_favorite(saved, "ts").unwrap();
        db.upsert_liked_song(&song).unwrap();

        let api = FakeCatalog { features: vec![payload("liked")], ..FakeCatalog::connected() };
        let config = CatalogConfig { rate_limit_ms: 0, ..CatalogConfig::default() };
        let summary = FeatureSync::new(&api, &db, &config).run().unwrap();
        assert_eq!(summary.requested, 1);
        assert_eq!(summary.stored, 1);
        assert!(db.get_audio_feature("liked").unwrap().is_some());
    }

    #[test]
    fn test_sync_with_no_tracks() {
        let db = Database::open_in_memory().unwrap();
        db.recreate_tables().unwrap();
        let api = FakeCatalog::connected();
        let config = CatalogConfig { rate_limit_ms: 0, ..CatalogConfig::default() };
        let summary = FeatureSync::new(&api, &db, &config).run().unwrap();
        assert_eq!(summary.requested, 0);
        assert_eq!(api.calls.get(), 0);
    }
}
