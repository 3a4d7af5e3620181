use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: {message}")]
    Invalid { line: usize, message: String },
}

/// One track entry from a local JSON export. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// 0-based position of the record within its file.
    pub ordinal: usize,
    pub artist_name: String,
    pub album_title: String,
    pub track_title: String,
    pub track_number: u32,

    // Artist
    pub composer: Option<String>,
    pub conductor: Option<String>,

    // Album
    pub year: Option<i64>,
    pub album_gain: Option<f64>,
    pub album_art: Option<String>,

    // Track
    pub track_length: Option<String>,
    pub rating: Option<String>,
    pub comment: Option<String>,
    pub track_gain: Option<f64>,
    pub bitrate: Option<i64>,
    pub sampling_rate: Option<i64>,

    // Genre
    pub music_genre: Option<String>,
    pub genre_in_dict: Option<String>,

    // File metadata
    pub file_size: Option<i64>,
    pub readable_size: Option<String>,
    pub file_ext: Option<String>,
    pub encoder: Option<String>,
    pub file_name: Option<String>,
    pub path_len: Option<i64>,
    pub last_modified: Option<String>,
    pub encoding: Option<String>,
    pub hash: Option<String>,
}

/// Wire shape of one export line. Tag writers are sloppy about numbers vs
/// strings, so scalar fields accept either.
#[derive(Debug, Deserialize)]
struct RawRecord {
    artist_name: Option<String>,
    album_title: Option<String>,
    track_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    track_number: Option<i64>,

    #[serde(default, deserialize_with = "lenient_text")]
    composer: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    conductor: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    year: Option<i64>,
    #[serde(default, deserialize_with = "lenient_real")]
    album_gain: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    album_art: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    track_length: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    rating: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_real")]
    track_gain: Option<f64>,
    #[serde(default, deserialize_with = "lenient_int")]
    bitrate: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    sampling_rate: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    music_genre: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    genre_in_dict: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    file_size: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    readable_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    file_ext: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    encoder: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    file_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    path_len: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    last_modified: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    encoding: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    hash: Option<String>,

    /// Keys we don't map; reported, never fatal.
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected text, got {other}"))),
    }
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected integer, got {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected integer, got '{s}'"))),
        Some(other) => Err(D::Error::custom(format!("expected integer, got {other}"))),
    }
}

fn lenient_real<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected number, got '{s}'"))),
        Some(other) => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}

fn required(value: Option<String>, field: &str, line: usize) -> Result<String, SourceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SourceError::Invalid {
            line,
            message: format!("missing or empty '{field}'"),
        }),
    }
}

impl SourceRecord {
    /// Parse and validate one export line. `line` is 1-based, for messages.
    pub fn parse(text: &str, ordinal: usize, line: usize) -> Result<Self, SourceError> {
        let raw: RawRecord =
            serde_json::from_str(text).map_err(|source| SourceError::Json { line, source })?;

        if !raw.unknown.is_empty() {
            let keys: Vec<&str> = raw.unknown.keys().map(String::as_str).collect();
            log::debug!("line {line}: ignoring unknown fields {keys:?}");
        }

        let track_number = match raw.track_number {
            Some(n) if n > 0 && n <= i64::from(u32::MAX) => n as u32,
            Some(n) => {
                return Err(SourceError::Invalid {
                    line,
                    message: format!("track_number must be positive, got {n}"),
                });
            }
            None => {
                return Err(SourceError::Invalid {
                    line,
                    message: "missing 'track_number'".to_string(),
                });
            }
        };

        Ok(Self {
            ordinal,
            artist_name: required(raw.artist_name, "artist_name", line)?,
            album_title: required(raw.album_title, "album_title", line)?,
            track_title: required(raw.track_title, "track_title", line)?,
            track_number,
            composer: raw.composer,
            conductor: raw.conductor,
            year: raw.year,
            album_gain: raw.album_gain,
            album_art: raw.album_art,
            track_length: raw.track_length,
            rating: raw.rating,
            comment: raw.comment,
            track_gain: raw.track_gain,
            bitrate: raw.bitrate,
            sampling_rate: raw.sampling_rate,
            music_genre: raw.music_genre,
            genre_in_dict: raw.genre_in_dict,
            file_size: raw.file_size,
            readable_size: raw.readable_size,
            file_ext: raw.file_ext,
            encoder: raw.encoder,
            file_name: raw.file_name,
            path_len: raw.path_len,
            last_modified: raw.last_modified,
            encoding: raw.encoding,
            hash: raw.hash,
        })
    }
}

/// One source file, fully materialized.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub records: Vec<SourceRecord>,
    /// Lines that failed to parse or validate; skipped.
    pub rejected: Vec<SourceError>,
}

/// Parse newline-delimited JSON. Blank lines are ignored and do not take
/// an ordinal.
pub fn parse_records(text: &str) -> (Vec<SourceRecord>, Vec<SourceError>) {
    let mut records = Vec::new();
    let mut rejected = Vec::new();

    let lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    for (ordinal, (idx, line)) in lines.enumerate() {
        match SourceRecord::parse(line, ordinal, idx + 1) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(e),
        }
    }
    (records, rejected)
}

/// Read one export file.
pub fn read_file(path: &Path) -> Result<SourceFile, SourceError> {
    let text = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (records, rejected) = parse_records(&text);
    for e in &rejected {
        log::warn!("{}: skipping record, {e}", path.display());
    }
    Ok(SourceFile {
        path: path.to_path_buf(),
        records,
        rejected,
    })
}

/// Non-empty `*.json` files directly inside `dir`, sorted by path.
pub fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("json"))
        })
        .filter(|e| e.metadata().map(|m| m.len() > 0).unwrap_or(false))
        .map(|e| e.into_path())
        .collect();
    paths.sort();
    Ok(paths)
}
