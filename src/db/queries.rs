use std::collections::BTreeSet;

use rusqlite::{OptionalExtension, params, params_from_iter};

use super::models::{
    ALBUM, ARTIST, AlbumRow, ArtistRow, ArtistTrack, AudioFeature, DESTINATION_TABLES, FileRow,
    GENRE, GainRow, GenreAlbum, GenreRow, LIKED_SONG, LikedSong, METADATA, TRACK, TableCount,
    TrackRow,
};
use super::{Database, Result};
use crate::fallback::NOT_FOUND;
impl Database {
    /// Insert or replace the audio features of one track.
    pub fn upsert_audio_feature(&self, f: &AudioFeature) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audio_feature (
                track_id, acousticness, danceability, duration_ms, energy,
                instrumentalness, key, mode, liveness, loudness,
                speechiness, tempo, time_signature, valence, extracted_at,
                loaded_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15,
                datetime('now')
            )
            ON CONFLICT(track_id) DO UPDATE SET
                acousticness = excluded.acousticness,
                danceability = excluded.danceability,
                duration_ms = excluded.duration_ms,
                energy = excluded.energy,
                instrumentalness = excluded.instrumentalness,
                key = excluded.key,
                mode = excluded.mode,
                liveness = excluded.liveness,
                loudness = excluded.loudness,
                speechiness = excluded.speechiness,
                tempo = excluded.tempo,
                time_signature = excluded.time_signature,
                valence = excluded.valence,
                extracted_at = excluded.extracted_at,
                loaded_at = datetime('now')
            ",
            params![
                f.track_id, f.acousticness, f.danceability, f.duration_ms, f.energy,
                f.instrumentalness, f.key, f.mode, f.liveness, f.loudness,
                f.speechiness, f.tempo, f.time_signature, f.valence, f.extracted_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_audio_feature(&self, track_id: &str) -> Result<Option<AudioFeature>> {
        let result = self.conn.query_row(
            "SELECT track_id, acousticness, danceability, duration_ms, energy,
                    instrumentalness, key, mode, liveness, loudness,
                    speechiness, tempo, time_signature, valence, extracted_at
             FROM audio_feature WHERE track_id = ?1",
            params![track_id],
            |row| {
                Ok(AudioFeature {
                    track_id: row.get(0)?,
                    acousticness: row.get(1)?,
                    danceability: row.get(2)?,
                    duration_ms: row.get(3)?,
                    energy: row.get(4)?,
                    instrumentalness: row.get(5)?,
                    key: row.get(6)?,
                    mode: row.get(7)?,
                    liveness: row.get(8)?,
                    loudness: row.get(9)?,
                    speechiness: row.get(10)?,
                    tempo: row.get(11)?,
                    time_signature: row.get(12)?,
                    valence: row.get(13)?,
                    extracted_at: row.get(14)?,
                })
            },
        );

        match result {
            Ok(f) => Ok(Some(f)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace one saved track. The first-seen `added_at` is kept.
    pub fn upsert_liked_song(&self, song: &LikedSong) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {LIKED_SONG} (
                    track_id, type, artist_name, album_name, track_name,
                    track_number, duration, release_date, popularity, added_at,
                    external_url, extracted_at, loaded_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, datetime('now')
                )
                ON CONFLICT(track_id) DO UPDATE SET
                    type = excluded.type,
                    artist_name = excluded.artist_name,
                    album_name = excluded.album_name,
                    track_name = excluded.track_name,
                    track_number = excluded.track_number,
                    duration = excluded.duration,
                    release_date = excluded.release_date,
                    popularity = excluded.popularity,
                    added_at = COALESCE({LIKED_SONG}.added_at, excluded.added_at),
                    external_url = excluded.external_url,
                    extracted_at = excluded.extracted_at,
                    loaded_at = datetime('now')
                "
            ),
            params![
                song.track_id, song.kind, song.artist_name, song.album_name, song.track_name,
                song.track_number, song.duration, song.release_date, song.popularity,
                song.added_at, song.external_url, song.extracted_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_liked_song(&self, track_id: &str) -> Result<Option<LikedSong>> {
        let song = self
            .conn
            .query_row(
                &format!(
                    "SELECT track_id, type, artist_name, album_name, track_name,
                            track_number, duration, release_date, popularity, added_at,
                            external_url, extracted_at
                     FROM {LIKED_SONG} WHERE track_id = ?1"
                ),
                params![track_id],
                |row| {
                    Ok(LikedSong {
                        track_id: row.get(0)?,
                        kind: row.get(1)?,
                        artist_name: row.get(2)?,
                        album_name: row.get(3)?,
                        track_name: row.get(4)?,
                        track_number: row.get(5)?,
                        duration: row.get(6)?,
                        release_date: row.get(7)?,
                        popularity: row.get(8)?,
                        added_at: row.get(9)?,
                        external_url: row.get(10)?,
                        extracted_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(song)
    }

    pub fn liked_track_ids(&self) -> Result<Vec<String>> {
        let mut stmt =
            self.conn.prepare(&format!("SELECT track_id FROM {LIKED_SONG} ORDER BY track_id"))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Distinct resolved track ids in the `track` table, sentinel excluded.
    pub fn resolved_track_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT track_id FROM {TRACK}
             WHERE track_id IS NOT NULL AND track_id != ?1
             ORDER BY track_id"
        ))?;
        let ids = stmt
            .query_map(params![NOT_FOUND], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Every track id that should have audio features: resolved ids from the
    /// last load plus saved tracks. Works before the first load.
    pub fn feature_track_ids(&self) -> Result<Vec<String>> {
        let mut ids: BTreeSet<String> = self.liked_track_ids()?.into_iter().collect();
        if self.table_exists(TRACK)? {
            ids.extend(self.resolved_track_ids()?);
        }
        Ok(ids.into_iter().collect())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Row counts for every destination table.
    pub fn table_counts(&self) -> Result<Vec<TableCount>> {
        let mut counts = Vec::with_capacity(DESTINATION_TABLES.len());
        for table in DESTINATION_TABLES {
            let rows: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            counts.push(TableCount { table: table.to_string(), rows });
        }
        Ok(counts)
    }

    /// Loaded tracks for an artist, matched on the name as it appeared in the
    /// source exports. Unresolved artists share the `not_found` id, so the
    /// name is the only reliable key.
    pub fn artist_tracks(&self, artist_name: &str) -> Result<Vec<ArtistTrack>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT artist_id, artist_name, album_title,
                    track_number, track_title, track_id
             FROM {TRACK}
             WHERE artist_name = ?1
             ORDER BY album_title, track_number"
        ))?;
        let rows = stmt
            .query_map(params![artist_name], |row| {
                Ok(ArtistTrack {
                    artist_id: row.get(0)?,
                    artist_name: row.get(1)?,
                    album_title: row.get(2)?,
                    track_number: row.get(3)?,
                    track_title: row.get(4)?,
                    track_id: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn artists_by_name(&self, names: &[&str]) -> Result<Vec<ArtistRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT artist_id, artist_name, composer
             FROM {ARTIST}
             WHERE artist_name IN ({})
             ORDER BY artist_name, composer",
            in_list(names.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(names), |row| {
                Ok(ArtistRow {
                    artist_id: row.get(0)?,
                    artist_name: row.get(1)?,
                    composer: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn albums_by_title(&self, titles: &[&str]) -> Result<Vec<AlbumRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT album_id, album_title, year, album_gain
             FROM {ALBUM}
             WHERE album_title IN ({})
             ORDER BY album_title, year",
            in_list(titles.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(titles), |row| {
                Ok(AlbumRow {
                    album_id: row.get(0)?,
                    album_title: row.get(1)?,
                    year: row.get(2)?,
                    album_gain: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn tracks_by_title(&self, titles: &[&str]) -> Result<Vec<TrackRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT artist_id, album_title, track_title, track_length, rating
             FROM {TRACK}
             WHERE track_title IN ({})
             ORDER BY track_title, album_title",
            in_list(titles.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(titles), |row| {
                Ok(TrackRow {
                    artist_id: row.get(0)?,
                    album_title: row.get(1)?,
                    track_title: row.get(2)?,
                    track_length: row.get(3)?,
                    rating: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Artists filed under any of `genres`.
    pub fn genres_in(&self, genres: &[&str]) -> Result<Vec<GenreRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT artist_name, music_genre
             FROM {GENRE}
             WHERE music_genre IN ({})
             ORDER BY music_genre, artist_name",
            in_list(genres.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(genres), |row| {
                Ok(GenreRow { artist_name: row.get(0)?, music_genre: row.get(1)? })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Files with extension `ext`, dot included (`.flac`).
    pub fn files_with_ext(&self, ext: &str) -> Result<Vec<FileRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT file_name, encoding, file_ext
             FROM {METADATA}
             WHERE file_ext = ?1
             ORDER BY file_name"
        ))?;
        let rows = stmt
            .query_map(params![ext], |row| {
                Ok(FileRow { file_name: row.get(0)?, encoding: row.get(1)?, file_ext: row.get(2)? })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Albums whose replay gain is strictly below `threshold`, loudest first.
    pub fn albums_with_gain_below(&self, threshold: f64) -> Result<Vec<GainRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT album_gain, artist_name, album_title
             FROM {ALBUM}
             WHERE album_gain < ?1
             ORDER BY album_gain DESC, artist_name, album_title"
        ))?;
        let rows = stmt
            .query_map(params![threshold], |row| {
                Ok(GainRow {
                    album_gain: row.get(0)?,
                    artist_name: row.get(1)?,
                    album_title: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Albums of every artist filed under any of `genres`.
    pub fn genre_albums(&self, genres: &[&str]) -> Result<Vec<GenreAlbum>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT g.artist_name, a.album_title
             FROM {GENRE} g
             JOIN {ALBUM} a ON a.artist_name = g.artist_name
             WHERE g.music_genre IN ({})
             ORDER BY g.artist_name, a.album_title",
            in_list(genres.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(genres), |row| {
                Ok(GenreAlbum { artist_name: row.get(0)?, album_title: row.get(1)? })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mean file size in bytes, `None` when no size was loaded.
    pub fn average_file_size(&self) -> Result<Option<f64>> {
        let avg = self
            .conn
            .query_row(&format!("SELECT AVG(file_size) FROM {METADATA}"), [], |row| row.get(0))?;
        Ok(avg)
    }
}

/// `?1, ?2, ...` for an `IN (...)` list of `n` values.
fn in_list(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
