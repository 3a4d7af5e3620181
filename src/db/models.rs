use serde::Serialize;

pub const ARTIST: &str = "artist";
pub const ALBUM: &str = "album";
pub const TRACK: &str = "track";
pub const GENRE: &str = "genre";
pub const METADATA: &str = "metadata";
pub const AUDIO_FEATURE: &str = "audio_feature";
pub const LIKED_SONG: &str = "liked_song";

/// Tables dropped and recreated on every reload, in load order.
pub const DESTINATION_TABLES: [&str; 5] = [ARTIST, ALBUM, TRACK, GENRE, METADATA];

/// `(table, CREATE statement)` for each destination table.
pub const DESTINATION_DDL: [(&str, &str); 5] = [
    (
        ARTIST,
        "CREATE TABLE artist (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_id       TEXT,
            artist_name     TEXT,
            composer        TEXT,
            conductor       TEXT,
            etl_ts          TEXT
        ) STRICT",
    ),
    (
        ALBUM,
        "CREATE TABLE album (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id        TEXT,
            artist_id       TEXT,
            artist_name     TEXT,
            album_title     TEXT,
            year            INTEGER,
            album_gain      REAL,
            album_art       TEXT,
            etl_ts          TEXT
        ) STRICT",
    ),
    (
        TRACK,
        "CREATE TABLE track (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id        TEXT,
            album_title     TEXT,
            track_title     TEXT,
            track_number    INTEGER,
            track_length    TEXT,
            artist_id       TEXT,
            rating          TEXT,
            comment         TEXT,
            track_gain      REAL,
            bitrate         INTEGER,
            sampling_rate   INTEGER,
            artist_name     TEXT,
            etl_ts          TEXT
        ) STRICT",
    ),
    (
        GENRE,
        "CREATE TABLE genre (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_id       TEXT,
            artist_name     TEXT,
            music_genre     TEXT,
            genre_in_dict   TEXT,
            etl_ts          TEXT
        ) STRICT",
    ),
    (
        METADATA,
        "CREATE TABLE metadata (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id        TEXT,
            file_size       INTEGER,
            readable_size   TEXT,
            file_ext        TEXT,
            encoder         TEXT,
            file_name       TEXT,
            path_len        INTEGER,
            last_modified   TEXT,
            encoding        TEXT,
            hash            TEXT,
            etl_ts          TEXT
        ) STRICT",
    ),
];

/// Audio features for one catalog track, keyed by its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFeature {
    pub track_id: String,
    pub acousticness: f64,
    pub danceability: f64,
    pub duration_ms: i64,
    pub energy: f64,
    pub instrumentalness: f64,
    /// Pitch class name, e.g. "C#,D♭"; empty when no key was detected.
    pub key: String,
    /// "Major" or "minor".
    pub mode: String,
    pub liveness: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub tempo: f64,
    pub time_signature: i64,
    pub valence: f64,
    pub extracted_at: String,
}

/// Row count for one destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// A loaded track, as shown by the artist report.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistTrack {
    pub artist_id: Option<String>,
    pub artist_name: String,
    pub album_title: Option<String>,
    pub track_number: Option<i64>,
    pub track_title: Option<String>,
    pub track_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: Option<String>,
    pub artist_name: String,
    pub composer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumRow {
    pub album_id: Option<String>,
    pub album_title: String,
    pub year: Option<i64>,
    pub album_gain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRow {
    pub artist_id: Option<String>,
    pub album_title: Option<String>,
    pub track_title: String,
    pub track_length: Option<String>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreRow {
    pub artist_name: Option<String>,
    pub music_genre: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub file_name: Option<String>,
    pub encoding: Option<String>,
    pub file_ext: String,
}

/// An album whose replay gain is under a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct GainRow {
    pub album_gain: f64,
    pub artist_name: Option<String>,
    pub album_title: Option<String>,
}

/// An album by an artist filed under a genre.
#[derive(Debug, Clone, PartialEq)]
pub struct GenreAlbum {
    pub artist_name: String,
    pub album_title: Option<String>,
}

/// One entry of the user's saved ("liked") tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikedSong {
    /// Original track id when the catalog relinked the track.
    pub track_id: String,
    pub kind: String,
    pub artist_name: String,
    pub album_name: String,
    pub track_name: String,
    pub track_number: u32,
    /// `HH:MM:SS`
    pub duration: Option<String>,
    /// `YYYY-MM-DD`; partial dates default to the first month or day.
    pub release_date: Option<String>,
    pub popularity: u8,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub added_at: Option<String>,
    pub external_url: String,
    pub extracted_at: String,
}
